//! Channel Player Core - playback session and presentation coordination
//!
//! This crate provides the playback layer behind the app's video surfaces:
//! - Playback sessions bound to one underlying media player
//! - A coordinator deciding which video is on the output and how it is shown
//! - Network classification and adaptive quality selection
//! - Resume positions, telemetry and now-playing integration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Channel Player Core                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Network    │  │     ABR      │  │   Session    │           │
//! │  │   Sampler    │──│  Controller  │──│ Coordinator  │           │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘           │
//! │                                             │                   │
//! │                                      ┌──────┴──────┐            │
//! │                                      │  Playback   │            │
//! │                                      │   Session   │            │
//! │                                      └──────┬──────┘            │
//! │                                             │                   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────┴──────┐            │
//! │  │    Resume    │  │  Telemetry / │  │    Media    │            │
//! │  │    Store     │  │ Now Playing  │  │   Backend   │            │
//! │  └──────────────┘  └──────────────┘  └─────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod backend;
pub mod sim;
pub mod resume;
pub mod telemetry;
pub mod network;
pub mod abr;
pub mod session;
pub mod coordinator;

pub use error::{Error, Result};
pub use types::*;
pub use config::PlaybackConfig;
pub use backend::{ItemStatus, MediaBackend, MediaPlayer, PlayerEvent, VariantSwitch};
pub use sim::{SimConfig, SimulatedBackend, SimulatedPlayer};
pub use resume::{JsonFileResumeStore, MemoryResumeStore, ResumeEntry, ResumeStore};
pub use telemetry::{NowPlayingLog, NowPlayingSink, TelemetryEmitter, TelemetryEvent, TelemetryRecord, TelemetrySink};
pub use network::{classify, NetworkQualitySampler};
pub use abr::{AbrDecision, AdaptiveBitrateController};
pub use session::{Collaborators, PlaybackSession};
pub use coordinator::SessionCoordinator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialization
pub fn init() {
    tracing::info!(version = VERSION, "Channel Player Core initialized");
}
