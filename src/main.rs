//! Application entry point — Stream2Pod terminal front-end.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. Open the audio output ([`RodioOutput`]).
//! 5. Build the three HTTP service clients from config.
//! 6. Create the [`Session`] and register terminal bar sinks.
//! 7. Run a line-oriented command loop on stdin until `quit`.

use std::io::Write as _;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncBufReadExt;

use stream2pod::config::AppConfig;
use stream2pod::playback::{PlaybackDevice, RodioOutput};
use stream2pod::services::{HttpAnswerService, HttpScriptService, HttpSpeechSynthesizer};
use stream2pod::viz::{BAND_COUNT, MAGNITUDE_CEIL, MAGNITUDE_FLOOR};
use stream2pod::{BarSink, Session};

// ---------------------------------------------------------------------------
// TerminalBar — BarSink that remembers its latest magnitude
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TerminalBar {
    magnitude: Mutex<f32>,
}

impl BarSink for TerminalBar {
    fn set_magnitude(&self, magnitude: f32) {
        *self.magnitude.lock().unwrap() = magnitude;
    }
}

impl TerminalBar {
    /// Render the bar as a fixed-width run of block characters.
    fn render(&self) -> String {
        let magnitude = *self.magnitude.lock().unwrap();
        let span = MAGNITUDE_CEIL - MAGNITUDE_FLOOR;
        let filled = (((magnitude - MAGNITUDE_FLOOR) / span) * 20.0).round() as usize;
        format!("{:░<20}", "█".repeat(filled.min(20)))
    }
}

// ---------------------------------------------------------------------------
// Command loop
// ---------------------------------------------------------------------------

fn print_help() {
    println!("commands:");
    println!("  load <url>     generate a podcast from a media URL and play it");
    println!("  ask <text>     interrupt playback with a question");
    println!("  pause / resume control the podcast track");
    println!("  bars           show the current visualization");
    println!("  status         show playback state and position");
    println!("  quit           exit");
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let (device, device_events) = RodioOutput::open(config.playback.volume)
        .map_err(|e| anyhow::anyhow!("audio output unavailable: {e}"))?;
    let device: Arc<dyn PlaybackDevice> = Arc::new(device);

    let session = Session::new(
        device,
        device_events,
        Arc::new(HttpScriptService::from_config(&config.services)),
        Arc::new(HttpSpeechSynthesizer::from_config(&config.services)),
        Arc::new(HttpAnswerService::from_config(&config.services)),
    );
    log::info!("session {} ready (backend {})", session.id(), config.services.base_url);

    let bars: Vec<Arc<TerminalBar>> = (0..BAND_COUNT)
        .map(|_| Arc::new(TerminalBar::default()))
        .collect();
    session.set_bar_sinks(
        bars.iter()
            .map(|b| Arc::clone(b) as Arc<dyn BarSink>)
            .collect(),
    );

    print_help();
    prompt();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "load" => match session.submit_url(rest).await {
                Ok(()) => println!("playing {}", session.source_url()),
                Err(e) => println!("error: {e}"),
            },
            "ask" => match session.ask(rest).await {
                Ok(true) => println!("answer playing; the podcast resumes afterwards"),
                Ok(false) => println!("nothing to interrupt — load a URL first"),
                Err(e) => println!("error: {e}"),
            },
            "pause" => session.pause(),
            "resume" => session.resume(),
            "bars" => {
                for bar in &bars {
                    println!("{}", bar.render());
                }
            }
            "status" => {
                println!(
                    "state: {:?}  loading: {}  position: {:.1}s",
                    session.playback().state(),
                    session.is_loading(),
                    session.playback().position().as_secs_f32()
                );
            }
            "quit" | "exit" => break,
            "" | "help" => print_help(),
            other => println!("unknown command: {other} (try `help`)"),
        }
        prompt();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Stream2Pod starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 worker threads — pipelines + sampling)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    rt.block_on(run(config))
}
