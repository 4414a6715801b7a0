//! rtdsp - command-line front end for the real-time DSP engine.
//!
//! `inspect` prints a patch's control surface and metadata as JSON,
//! `render` runs it offline to a WAV file, `play` runs it on a sound device.

mod render;
mod wav;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rtdsp_audio::{AudioBackend, CpalBackend, Engine, OfflineBackend, Patch};
use rtdsp_comms::EngineEvent;
use rtdsp_core::EngineConfig;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Real-time DSP engine driven by RON patch files
#[derive(Parser, Debug)]
#[command(name = "rtdsp", version)]
#[command(about = "Inspect, render, and play rtdsp patches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the control surface and metadata as JSON
    Inspect(PatchArgs),

    /// Render offline to a 32-bit float WAV file
    Render {
        #[command(flatten)]
        patch: PatchArgs,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Input WAV file (its sample rate and channel count are used)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Length in seconds (default: input length, or 5 without input)
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Play on an output device
    Play {
        #[command(flatten)]
        patch: PatchArgs,

        /// Playback length in seconds
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        /// Output device (substring of its name)
        #[arg(long)]
        device: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Patch file (.ron)
    patch: PathBuf,

    /// Override the patch's sample rate (Hz)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Override the patch's block size (frames)
    #[arg(short, long)]
    block_size: Option<usize>,

    /// Set a parameter before starting, e.g. `--set /tone/out/gain=0.5`
    /// (a bare number addresses the parameter by index)
    #[arg(long = "set", value_name = "PARAM=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, f32)>,
}

fn parse_assignment(arg: &str) -> Result<(String, f32), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PARAM=VALUE, got '{arg}'"))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    Ok((key.trim().to_string(), value))
}

impl PatchArgs {
    /// Load the patch and apply command-line overrides to its config.
    fn load(&self) -> Result<(Patch, EngineConfig)> {
        let patch = Patch::load(&self.patch)
            .with_context(|| format!("Failed to load patch: {}", self.patch.display()))?;
        let mut config = patch.config;
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        Ok((patch, config))
    }

    /// Build the engine and apply `--set` values.
    fn engine(
        &self,
        patch: &Patch,
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Engine> {
        let compiled = patch.build().context("Failed to build patch")?;
        let engine = Engine::new(config, compiled, backend);

        for (key, value) in &self.set {
            let result = match key.parse::<usize>() {
                Ok(index) => engine.set_parameter(index, *value),
                Err(_) => engine.set_parameter(key.as_str(), *value),
            };
            result.with_context(|| format!("Failed to set {key}"))?;
            tracing::debug!("Set {} = {}", key, value);
        }
        Ok(engine)
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtdsp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Inspect(args) => inspect(&args),
        Command::Render {
            patch,
            output,
            input,
            seconds,
        } => render(&patch, &output, input.as_deref(), seconds),
        Command::Play {
            patch,
            seconds,
            device,
        } => play(&patch, seconds, device),
    }
}

fn inspect(args: &PatchArgs) -> Result<()> {
    let (patch, config) = args.load()?;
    let engine = args.engine(&patch, config, Box::new(OfflineBackend::default()))?;

    let parameters: Vec<serde_json::Value> = engine
        .parameters()
        .iter()
        .enumerate()
        .map(|(index, descriptor)| {
            serde_json::json!({
                "index": index,
                "address": descriptor.id,
                "value": engine.get_parameter(index).ok(),
            })
        })
        .collect();

    let report = serde_json::json!({
        "config": config,
        "ui": engine.ui(),
        "meta": engine.metadata(),
        "values": parameters,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to format report")?
    );
    Ok(())
}

fn render(
    args: &PatchArgs,
    output: &std::path::Path,
    input: Option<&std::path::Path>,
    seconds: Option<f64>,
) -> Result<()> {
    let (patch, mut config) = args.load()?;

    let input = input.map(wav::read_wav).transpose()?;
    if let Some(data) = &input {
        if args.sample_rate.is_none() {
            config.sample_rate = data.sample_rate;
        }
        config.input_channels = data.channels.len();
    }

    let frames = match (seconds, &input) {
        (Some(seconds), _) => render::frames_for_seconds(seconds, config.sample_rate)?,
        (None, Some(data)) => data.frames(),
        (None, None) => 5 * config.sample_rate as usize,
    };

    tracing::info!("Rendering '{}' to {}", patch.name, output.display());
    tracing::info!(
        "{} Hz, block size {}, {} frames",
        config.sample_rate,
        config.block_size,
        frames
    );

    let mut engine = args.engine(&patch, config, Box::new(OfflineBackend::default()))?;
    engine.start().context("Failed to start engine")?;

    let input_channels = input.map(|data| data.channels).unwrap_or_default();
    let rendered = render::render_offline(&mut engine, &input_channels, frames)?;
    engine.stop();

    wav::write_wav(output, config.sample_rate, &rendered)?;
    tracing::info!("Done! Output written to {}", output.display());
    Ok(())
}

fn play(args: &PatchArgs, seconds: f64, device: Option<String>) -> Result<()> {
    anyhow::ensure!(seconds.is_finite(), "--seconds must be a finite number");
    let (patch, config) = args.load()?;
    let backend = device.map_or_else(CpalBackend::new, CpalBackend::with_device);
    let mut engine = args.engine(&patch, config, Box::new(backend))?;

    engine.start().context("Failed to start audio")?;
    tracing::info!("Playing '{}' for {:.1}s", patch.name, seconds);

    let started = Instant::now();
    let length = Duration::from_secs_f64(seconds.max(0.0));
    while started.elapsed() < length {
        let remaining = length.saturating_sub(started.elapsed());
        std::thread::sleep(Duration::from_secs(1).min(remaining));

        let overruns = engine
            .poll_events()
            .iter()
            .filter(|event| matches!(event, EngineEvent::Overrun { .. }))
            .count();
        let meter = engine.meter();
        tracing::info!(
            "blocks={} peak={:.3} overruns={} (+{}) failures={} last={:?}",
            meter.blocks,
            meter.peak(),
            meter.overruns,
            overruns,
            meter.failures,
            meter.last_elapsed
        );
    }

    engine.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("/tone/out/gain=0.5"),
            Ok(("/tone/out/gain".to_string(), 0.5))
        );
        assert_eq!(parse_assignment(" 3 = -1 "), Ok(("3".to_string(), -1.0)));
        assert!(parse_assignment("gain").is_err());
        assert!(parse_assignment("gain=loud").is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from([
            "rtdsp",
            "render",
            "patches/tone.ron",
            "-o",
            "out.wav",
            "--set",
            "/tone/out/gain=0.5",
            "--block-size",
            "128",
        ])
        .unwrap();

        let Command::Render { patch, output, .. } = cli.command else {
            panic!("expected render");
        };
        assert_eq!(output, PathBuf::from("out.wav"));
        assert_eq!(patch.block_size, Some(128));
        assert_eq!(patch.set, vec![("/tone/out/gain".to_string(), 0.5)]);
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
