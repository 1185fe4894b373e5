//! rill-play - demo mixer
//!
//! Builds a two-submix graph: a "music" bus carrying brownian noise and a
//! 220 Hz sine, and an "effects" bus playing an optional audio file
//! through a steep low-pass filter. Plays live on the default output
//! device, or renders to a WAV file with `--render`.
//!
//! Usage:
//!   rill-play [FILE]
//!   rill-play [FILE] --render out.wav [--seconds N]
//!
//! During live playback, type `v <volume>` + Enter to set the master
//! volume, or press Enter on an empty line to quit.

use std::io::BufRead;

use anyhow::{bail, Context, Result};

use rill_core::audio::{DeviceConfig, OutputDevice};
use rill_core::effect::{LowPassConfig, LowPassEffect};
use rill_core::engine::{command_channel, GraphCommand, GraphConfig, MixGraph};
use rill_core::source::{
    DecoderSource, NoiseColor, NoiseConfig, NoiseSource, Waveform, WaveformConfig, WaveformSource,
};
use rill_core::types::DEFAULT_SAMPLE_RATE;

struct Args {
    file: Option<String>,
    render: Option<String>,
    seconds: u32,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        file: None,
        render: None,
        seconds: 10,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--render" => {
                args.render = Some(iter.next().context("--render requires an output path")?);
            }
            "--seconds" => {
                args.seconds = iter
                    .next()
                    .context("--seconds requires a value")?
                    .parse()
                    .context("--seconds must be a positive integer")?;
            }
            "-h" | "--help" => {
                eprintln!("usage: rill-play [FILE] [--render OUT.wav] [--seconds N]");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if args.file.replace(other.to_string()).is_some() {
                    bail!("only one input file may be given");
                }
            }
        }
    }
    Ok(args)
}

/// Music submix + filtered effects submix under the root bus
fn build_graph(channels: u16, sample_rate: u32, file: Option<&str>) -> Result<MixGraph> {
    let mut graph = MixGraph::new(GraphConfig {
        channels,
        sample_rate,
        ..GraphConfig::default()
    })?;

    let music = graph.add_bus(MixGraph::ROOT, 1.0)?;
    let noise = NoiseSource::new(NoiseConfig {
        channels,
        color: NoiseColor::Brownian,
        amplitude: 0.2,
        seed: None,
    })?;
    graph.add_source(music, Box::new(noise), 1.0)?;
    let tone = WaveformSource::new(WaveformConfig {
        channels,
        sample_rate,
        shape: Waveform::Sine,
        amplitude: 0.2,
        frequency: 220.0,
    })?;
    graph.add_source(music, Box::new(tone), 1.0)?;

    let effects = graph.add_bus(MixGraph::ROOT, 1.0)?;
    let lowpass = LowPassEffect::new(LowPassConfig {
        channels,
        sample_rate,
        cutoff_hz: sample_rate as f32 / 16.0,
        order: 8,
    })?;
    graph.set_effect(effects, Box::new(lowpass))?;

    if let Some(path) = file {
        match DecoderSource::open(path, channels, sample_rate) {
            Ok(mut source) => {
                source.set_looping(true);
                graph.add_source(effects, Box::new(source), 1.0)?;
            }
            // Playable demo even without the file
            Err(e) => log::warn!("not playing {path}: {e}"),
        }
    }

    Ok(graph)
}

fn play_live(file: Option<&str>) -> Result<()> {
    let device = OutputDevice::open(&DeviceConfig::stereo_default())?;
    let sample_rate = device.sample_rate();
    let channels = device.channels();
    log::info!("mixing at {sample_rate} Hz, {channels} channels");

    let graph = build_graph(channels, sample_rate, file)?;
    let (mut tx, rx) = command_channel();
    let _playback = device.start(graph, rx)?;

    println!("playing - `v <volume>` sets master volume, empty line quits");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("v ") {
            match value.parse::<f32>() {
                Ok(volume) if volume >= 0.0 => {
                    if tx.push(GraphCommand::SetMasterVolume(volume)).is_err() {
                        log::warn!("command queue full, volume change dropped");
                    }
                }
                _ => eprintln!("volume must be a non-negative number"),
            }
        } else {
            eprintln!("unrecognized command: {line}");
        }
    }
    Ok(())
}

fn render_to_wav(file: Option<&str>, out_path: &str, seconds: u32) -> Result<()> {
    let sample_rate = DEFAULT_SAMPLE_RATE;
    let channels = 2u16;
    let mut graph = build_graph(channels, sample_rate, file)?;

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(out_path, spec)
        .with_context(|| format!("failed to create {out_path}"))?;

    let chunk_frames = graph.capacity_frames();
    let mut chunk = vec![0.0f32; chunk_frames * channels as usize];
    let mut remaining = seconds as u64 * sample_rate as u64;
    while remaining > 0 {
        let frames = chunk_frames.min(remaining as usize);
        let buf = &mut chunk[..frames * channels as usize];
        graph.render(buf)?;
        for &s in buf.iter() {
            writer.write_sample(s)?;
        }
        remaining -= frames as u64;
    }
    writer.finalize()?;

    log::info!("rendered {seconds}s to {out_path}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    match &args.render {
        Some(out_path) => render_to_wav(args.file.as_deref(), out_path, args.seconds),
        None => play_live(args.file.as_deref()),
    }
}
