//! Playback configuration
//!
//! Every timing constant the coordinator and sessions depend on lives here so
//! hosts can tune them without touching behavior.

use crate::{Error, QualityTier, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Playback and coordination tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between binding a new session and calling `play()` (milliseconds)
    pub start_delay_ms: u64,
    /// Duration of a mini-player/fullscreen transition (milliseconds)
    pub transition_ms: u64,
    /// Seconds buffered ahead that count as a full buffer
    pub healthy_buffer_secs: f64,
    /// Buffer health below which the session reports buffering
    pub buffering_threshold: f64,
    /// Minimum interval between periodic resume-position writes (milliseconds)
    pub resume_save_interval_ms: u64,
    /// Resume positions within this many seconds of either end are ignored
    pub resume_margin_secs: f64,
    /// Minimum time between two applied adaptive quality changes (milliseconds)
    pub min_quality_dwell_ms: u64,
    /// Default skip for seek forward/backward (seconds)
    pub seek_step_secs: f64,
    /// Allowed playhead drift across a quality switch (seconds)
    pub quality_switch_tolerance_secs: f64,
    /// Mini-player drag distance that dismisses the player (points)
    pub drag_dismiss_threshold: f64,
    /// Adaptive quality enabled at startup
    pub adaptive_enabled: bool,
    /// Highest adaptive tier while the device is in low-power mode
    pub low_power_max_quality: QualityTier,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 500,
            transition_ms: 400,
            healthy_buffer_secs: 10.0,
            buffering_threshold: 0.1,
            resume_save_interval_ms: 2_000,
            resume_margin_secs: 2.0,
            min_quality_dwell_ms: 10_000,
            seek_step_secs: 10.0,
            quality_switch_tolerance_secs: 0.5,
            drag_dismiss_threshold: 100.0,
            adaptive_enabled: true,
            low_power_max_quality: QualityTier::P480,
        }
    }
}

impl PlaybackConfig {
    /// Load and validate a JSON configuration file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: PlaybackConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.start_delay_ms == 0 {
            return Err(Error::InvalidConfig("start_delay_ms must be non-zero".into()));
        }
        if !self.healthy_buffer_secs.is_finite() || self.healthy_buffer_secs <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "healthy_buffer_secs must be positive, got {}",
                self.healthy_buffer_secs
            )));
        }
        if !(self.buffering_threshold > 0.0 && self.buffering_threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "buffering_threshold must be within (0, 1), got {}",
                self.buffering_threshold
            )));
        }
        if !self.resume_margin_secs.is_finite() || self.resume_margin_secs < 0.0 {
            return Err(Error::InvalidConfig("resume_margin_secs must be >= 0".into()));
        }
        if !self.seek_step_secs.is_finite() || self.seek_step_secs <= 0.0 {
            return Err(Error::InvalidConfig("seek_step_secs must be positive".into()));
        }
        if !self.quality_switch_tolerance_secs.is_finite() || self.quality_switch_tolerance_secs <= 0.0 {
            return Err(Error::InvalidConfig(
                "quality_switch_tolerance_secs must be positive".into(),
            ));
        }
        if self.low_power_max_quality == QualityTier::Auto {
            return Err(Error::InvalidConfig(
                "low_power_max_quality must be a concrete tier".into(),
            ));
        }
        Ok(())
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn resume_save_interval(&self) -> Duration {
        Duration::from_millis(self.resume_save_interval_ms)
    }

    pub fn min_quality_dwell(&self) -> Duration {
        Duration::from_millis(self.min_quality_dwell_ms)
    }

    /// Whether a stored position should be applied for an asset of `duration`
    pub fn is_valid_resume_position(&self, position: f64, duration: f64) -> bool {
        position.is_finite()
            && duration.is_finite()
            && position > self.resume_margin_secs
            && position < duration - self.resume_margin_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.healthy_buffer_secs, 10.0);
        assert_eq!(config.start_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_start_delay_rejected() {
        let config = PlaybackConfig {
            start_delay_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_resume_window() {
        let config = PlaybackConfig::default();
        assert!(config.is_valid_resume_position(45.0, 120.0));
        assert!(!config.is_valid_resume_position(45.0, 46.0));
        assert!(!config.is_valid_resume_position(1.5, 120.0));
        assert!(!config.is_valid_resume_position(118.0, 120.0));
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"start_delay_ms": 250, "min_quality_dwell_ms": 3000}}"#).unwrap();

        let config = PlaybackConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.start_delay_ms, 250);
        assert_eq!(config.min_quality_dwell_ms, 3000);
        assert_eq!(config.transition_ms, 400);
    }
}
