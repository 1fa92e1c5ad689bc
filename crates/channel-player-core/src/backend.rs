//! Media backend seam
//!
//! The OS media stack is consumed, never reimplemented. A `MediaBackend`
//! creates one `MediaPlayer` per bound video; the player reports what it is
//! doing through a broadcast stream of `PlayerEvent`s.

use crate::{QualityTier, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

/// Item status reported by the player
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    /// Asset is ready; duration in seconds (may be non-finite for live items)
    ReadyToPlay { duration: f64 },
    /// Asset failed to load or decode
    Failed { message: String },
}

/// Raw events emitted by an underlying player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Periodic playhead update, seconds
    TimeUpdate(f64),
    /// Item status change
    Status(ItemStatus),
    /// First loaded time range, seconds
    LoadedRange { start: f64, end: f64 },
    /// Size of the frames being rendered changed
    PresentationSize { width: f64, height: f64 },
    /// Playback stalled waiting for data
    Stalled,
    /// Item played to its end
    PlayedToEnd,
}

/// Result of a variant switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSwitch {
    /// Player switched to the requested variant
    Applied,
    /// Player has no variant for this tier; nothing changed
    Unsupported,
}

/// One underlying player instance bound to one source
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Load the asset duration in seconds
    async fn load_duration(&self) -> Result<f64>;

    /// Seek to `position` seconds; resolves with `true` once the seek finished
    async fn seek(&self, position: f64) -> bool;

    fn play(&self);

    fn pause(&self);

    fn set_rate(&self, rate: f32);

    fn set_muted(&self, muted: bool);

    /// Current playhead in seconds
    fn current_time(&self) -> f64;

    /// Request a switch to the variant matching `tier`
    fn select_variant(&self, tier: QualityTier) -> VariantSwitch;

    /// Subscribe to player events
    fn events(&self) -> broadcast::Receiver<PlayerEvent>;

    /// Release the player and its decoding resources
    fn release(&self);
}

/// Factory for underlying players
pub trait MediaBackend: Send + Sync {
    fn create_player(&self, source: &Url) -> Result<Arc<dyn MediaPlayer>>;
}
