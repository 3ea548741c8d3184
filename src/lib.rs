//! # Stream2Pod
//!
//! Turn a media URL into a synthesized spoken podcast, play it, and
//! interrupt playback with typed questions whose spoken answers play before
//! the podcast resumes — with a live 4-band amplitude visualization of
//! whatever is currently audible.
//!
//! # Architecture
//!
//! ```text
//! Session (façade)
//!   ├─ pipeline::PipelineOrchestrator   URL → script → audio  /  question → answer audio
//!   │     └─ services::{ScriptService, SpeechSynthesizer, AnswerService}
//!   ├─ playback::PlaybackController     Main/Answer channels, interrupt-resume protocol
//!   │     └─ playback::PlaybackDevice   injected capability (RodioOutput in production)
//!   └─ viz::SignalSampler               ~60 Hz SampleFrames → BarSinks
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stream2pod::config::AppConfig;
//! use stream2pod::playback::{PlaybackDevice, RodioOutput};
//! use stream2pod::services::{HttpAnswerService, HttpScriptService, HttpSpeechSynthesizer};
//! use stream2pod::Session;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!
//!     let (device, device_events) = RodioOutput::open(config.playback.volume)?;
//!     let device: Arc<dyn PlaybackDevice> = Arc::new(device);
//!
//!     let session = Session::new(
//!         device,
//!         device_events,
//!         Arc::new(HttpScriptService::from_config(&config.services)),
//!         Arc::new(HttpSpeechSynthesizer::from_config(&config.services)),
//!         Arc::new(HttpAnswerService::from_config(&config.services)),
//!     );
//!
//!     session.submit_url("https://youtu.be/example").await?;
//!     session.ask("what is this about?").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod pipeline;
pub mod playback;
pub mod services;
pub mod session;
pub mod viz;

// ---------------------------------------------------------------------------
// Top-level re-exports
// ---------------------------------------------------------------------------

pub use session::{BarSink, Session};
