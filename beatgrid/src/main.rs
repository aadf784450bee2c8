use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beatgrid::audio::DeviceBackend;
use beatgrid::pipeline::persistence;
use beatgrid::render;
use beatgrid::{DrumMachine, Instrument, MachineConfig, Mode, config};

#[derive(Parser)]
#[command(name = "beatgrid")]
#[command(about = "Step-sequenced drum machine", long_about = None)]
struct Cli {
    /// Machine settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Saved pattern to load (JSON); a demo beat is used otherwise
    #[arg(short, long, global = true)]
    pattern: Option<PathBuf>,

    /// Tempo in BPM, overrides the pattern's
    #[arg(long, global = true)]
    bpm: Option<f64>,

    /// Steps per loop
    #[arg(long, global = true)]
    steps: Option<usize>,

    /// Write the pattern as loaded to this file
    #[arg(long, global = true)]
    save: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the pattern on the default output device
    Play {
        /// How long to play for
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,

        /// Poll as a hidden window would: rarely, with a wide lookahead
        #[arg(long)]
        background: bool,
    },

    /// Bounce the pattern to a WAV file
    Render {
        /// Output WAV file path
        #[arg(short, long)]
        out: PathBuf,

        /// Times through the pattern
        #[arg(short, long, default_value = "2")]
        loops: usize,

        /// Sample rate in Hz
        #[arg(long, default_value = "44100")]
        sample_rate: u32,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => MachineConfig::default(),
    };

    let mut machine = DrumMachine::new(config.clone(), Box::new(DeviceBackend::new()))?;
    if let Some(steps) = cli.steps {
        machine.set_step_count(steps)?;
    }
    match &cli.pattern {
        Some(path) => {
            let saved = persistence::load_pattern(path)?;
            let skipped = machine.import_pattern(&saved).len();
            tracing::info!(path = %path.display(), skipped, "pattern loaded");
        }
        None => demo_beat(&mut machine)?,
    }
    if let Some(bpm) = cli.bpm {
        machine.set_tempo(bpm)?;
    }
    if let Some(path) = &cli.save {
        persistence::save_pattern(path, &machine.export_pattern())?;
        tracing::info!(path = %path.display(), "pattern saved");
    }

    match cli.command {
        Commands::Play { seconds, background } => {
            if background {
                machine.set_mode(Mode::Background);
            }
            machine.on_step_advance(|step| tracing::trace!(step, "step"));
            machine.play()?;
            std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            machine.stop();
            // let the last hits ring out
            std::thread::sleep(Duration::from_secs(1));
            machine.destroy();
        }
        Commands::Render {
            out,
            loops,
            sample_rate,
        } => {
            let bounce = render::bounce(&machine.snapshot(), &config, sample_rate, loops);
            render::write_wav(&out, &bounce)?;
            tracing::info!(
                path = %out.display(),
                seconds = bounce.seconds(),
                triggers = bounce.triggers,
                skipped = bounce.skipped,
                "rendered"
            );
        }
    }
    Ok(())
}

// four on the floor, backbeat, eighth hats, open hat before the loop
fn demo_beat(machine: &mut DrumMachine) -> anyhow::Result<()> {
    for step in 0..machine.step_count() {
        let cells = [
            (Instrument::Kick, step % 4 == 0),
            (Instrument::Snare, step % 8 == 4),
            (Instrument::ClosedHihat, step % 2 == 0 && step % 16 != 14),
            (Instrument::OpenHihat, step % 16 == 14),
        ];
        for (instrument, on) in cells {
            if on {
                machine.set_cell(instrument, step, true)?;
            }
        }
    }
    Ok(())
}
