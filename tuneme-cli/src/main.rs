//! # TuneMe - Console Guitar Tuner
//!
//! Runs the tuning engine against the default microphone (or a synthetic
//! tone) and prints every state change.
//!
//! ## Architecture
//! - **Main Thread**: event loop printing tuner events and applying commands
//! - **Analysis Thread**: owned by [`Tuner`], turns audio frames into events
//! - **Input Thread**: reads commands from stdin
//! - **Communication**: crossbeam channels between all three

mod console;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tuneme_core::{
    AudioSource, CpalInput, SignalGenerator, Tuner, TunerConfig, TunerEvent, TuningProfile,
    config::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_SILENCE_THRESHOLD_DB},
    select_preset,
};

use console::{Command, parse_command, render, string_index};

/// Amplitude of the simulated tone.
const SIMULATED_AMPLITUDE: f32 = 0.5;

#[derive(Parser, Debug)]
#[command(name = "tuneme", version, about = "Real-time guitar tuner")]
struct Args {
    /// Tuning preset: Standard, Drop D, DADGAD or Open G
    #[arg(long, default_value = "Standard")]
    preset: String,

    /// Custom tuning as six comma-separated notes, lowest string first
    #[arg(long, value_delimiter = ',')]
    notes: Option<Vec<String>>,

    /// String to tune first (1 = lowest)
    #[arg(long, default_value_t = 1)]
    string: i32,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Samples per analysis frame (1024-2048)
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Silence gate in dBFS
    #[arg(long, default_value_t = DEFAULT_SILENCE_THRESHOLD_DB, allow_hyphen_values = true)]
    silence_db: f32,

    /// Analyse a synthetic tone at this frequency instead of the microphone
    #[arg(long, value_name = "HZ")]
    simulate: Option<f32>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    duration: Option<f64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn tuner_config(&self) -> TunerConfig {
        TunerConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            silence_threshold_db: self.silence_db,
            preset: self.preset.clone(),
            custom_notes: self.notes.clone(),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting TuneMe");

    let source: Box<dyn AudioSource> = match args.simulate {
        Some(freq) => {
            info!(frequency = freq, "Using simulated input");
            Box::new(SignalGenerator::new(freq, SIMULATED_AMPLITUDE))
        }
        None => Box::new(CpalInput::new()),
    };

    let mut tuner = Tuner::new(args.tuner_config(), source).context("Invalid tuner configuration")?;
    let session = tuner.session().clone();
    let events = session.subscribe();
    session
        .set_active_string(string_index(args.string))
        .context("Invalid --string")?;
    println!("Tuning: {}", session.profile());

    let deadline = deadline_channel(args.duration)?;
    tuner.start().context("Failed to start audio")?;
    let mut commands = spawn_input_thread();

    let outcome = loop {
        let mut stdin_closed = false;
        let done: Option<Result<()>> = select! {
            recv(events) -> msg => match msg {
                Ok(event) => {
                    print_event(&event, &args, &session.profile())?;
                    match event {
                        TunerEvent::SessionStopped { reason: Some(reason) } => {
                            Some(Err(anyhow!("Audio source failed: {reason}")))
                        }
                        _ => None,
                    }
                }
                Err(_) => Some(Ok(())),
            },
            recv(commands) -> msg => match msg {
                Ok(Command::Quit) => Some(Ok(())),
                Ok(Command::SelectString(index)) => {
                    if let Err(e) = session.set_active_string(index) {
                        warn!("{e}");
                    }
                    None
                }
                Ok(Command::Preset(name)) => {
                    session.set_profile(select_preset(&name));
                    None
                }
                Err(_) => {
                    stdin_closed = true;
                    None
                }
            },
            recv(deadline) -> _ => {
                debug!("Duration elapsed");
                Some(Ok(()))
            },
        };
        if let Some(result) = done {
            break result;
        }
        // Keep running on EOF; only `q`, the deadline or a failure end the loop.
        if stdin_closed {
            commands = crossbeam_channel::never();
        }
    };

    tuner.stop();
    // Report the final stop event, if any.
    for event in events.try_iter() {
        print_event(&event, &args, &session.profile())?;
    }
    info!("TuneMe finished");
    outcome
}

/// Fires once the requested run time has passed; never fires without one.
fn deadline_channel(duration: Option<f64>) -> Result<Receiver<Instant>> {
    Ok(match duration {
        Some(secs) => {
            let run_time = Duration::try_from_secs_f64(secs).context("Invalid --duration")?;
            crossbeam_channel::after(run_time)
        }
        None => crossbeam_channel::never(),
    })
}

fn print_event(event: &TunerEvent, args: &Args, profile: &TuningProfile) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{}", render(event, profile));
    }
    Ok(())
}

/// Reads stdin lines and forwards parsed commands. The channel closes on EOF.
fn spawn_input_thread() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("Commands: 1-6 select a string, p <preset>, q quits"),
            }
        }
    });
    rx
}
