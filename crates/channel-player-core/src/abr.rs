//! Adaptive Bitrate (ABR) controller
//!
//! Maps network classification to a recommended quality tier and decides
//! when the active session should switch. Switches are rate limited by a
//! minimum dwell time so a flapping network signal cannot thrash quality.

use crate::network::classify;
use crate::types::*;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Outcome of evaluating one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbrDecision {
    /// Adaptive mode is off
    Disabled,
    /// Recommendation already applied
    Unchanged,
    /// A switch is wanted but the dwell time has not elapsed
    Deferred { tier: QualityTier, retry_in: Duration },
    /// Request this tier from the session
    Switch(QualityTier),
}

/// Network-driven quality controller
#[derive(Debug)]
pub struct AdaptiveBitrateController {
    /// Adaptive mode
    enabled: bool,
    /// Tier last applied to the session
    applied: QualityTier,
    /// Tier the network alone would pick
    network_tier: QualityTier,
    /// Upper bound while saving power
    ceiling: Option<QualityTier>,
    /// Latest recommendation, after the ceiling
    recommended: QualityTier,
    /// When the last switch was applied
    last_switch: Option<Instant>,
    /// Minimum time between applied switches
    min_dwell: Duration,
    /// Number of switches applied
    switch_count: u32,
}

impl AdaptiveBitrateController {
    pub fn new(min_dwell: Duration, enabled: bool) -> Self {
        Self {
            enabled,
            applied: QualityTier::Auto,
            network_tier: QualityTier::Auto,
            ceiling: None,
            recommended: QualityTier::Auto,
            last_switch: None,
            min_dwell,
            switch_count: 0,
        }
    }

    /// Evaluate a fresh network sample
    #[instrument(skip(self))]
    pub fn on_sample(&mut self, sample: &NetworkSample, now: Instant) -> AbrDecision {
        self.network_tier = classify(sample).recommended_tier();
        self.recommended = self.capped(self.network_tier);
        self.evaluate(now)
    }

    /// Cap recommendations at `ceiling`; `Auto` counts as above every tier.
    /// Changing the ceiling lifts the dwell so the next evaluation applies it.
    pub fn set_ceiling(&mut self, ceiling: Option<QualityTier>) {
        if ceiling == self.ceiling {
            return;
        }
        debug!(ceiling = ?ceiling, "Quality ceiling changed");
        self.ceiling = ceiling;
        self.recommended = self.capped(self.network_tier);
        self.last_switch = None;
    }

    pub fn ceiling(&self) -> Option<QualityTier> {
        self.ceiling
    }

    fn capped(&self, tier: QualityTier) -> QualityTier {
        match self.ceiling {
            Some(ceiling) if tier == QualityTier::Auto || tier > ceiling => ceiling,
            _ => tier,
        }
    }

    /// Re-evaluate the latest recommendation, e.g. after a deferral expired
    pub fn evaluate(&mut self, now: Instant) -> AbrDecision {
        if !self.enabled {
            return AbrDecision::Disabled;
        }
        if self.recommended == self.applied {
            return AbrDecision::Unchanged;
        }

        if let Some(last) = self.last_switch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_dwell {
                let retry_in = self.min_dwell - elapsed;
                debug!(
                    tier = %self.recommended,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Quality switch deferred"
                );
                return AbrDecision::Deferred {
                    tier: self.recommended,
                    retry_in,
                };
            }
        }

        AbrDecision::Switch(self.recommended)
    }

    /// Record that `tier` was handed to the session
    pub fn mark_applied(&mut self, tier: QualityTier, now: Instant) {
        if tier != self.applied {
            debug!(from = %self.applied, to = %tier, "Quality switch applied");
            self.applied = tier;
            self.last_switch = Some(now);
            self.switch_count += 1;
        }
    }

    /// Adopt the tier of a newly bound session without counting a switch
    pub fn sync_applied(&mut self, tier: QualityTier) {
        self.applied = tier;
        self.last_switch = None;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn applied(&self) -> QualityTier {
        self.applied
    }

    pub fn recommended(&self) -> QualityTier {
        self.recommended
    }

    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DWELL: Duration = Duration::from_secs(10);

    #[test]
    fn test_wifi_recommends_highest_mapped_tier() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        let decision = abr.on_sample(&NetworkSample::wifi(), Instant::now());
        assert_eq!(decision, AbrDecision::Switch(QualityTier::P1080));
    }

    #[test]
    fn test_disabled_never_switches() {
        let mut abr = AdaptiveBitrateController::new(DWELL, false);
        assert_eq!(abr.on_sample(&NetworkSample::wifi(), Instant::now()), AbrDecision::Disabled);
        assert_eq!(abr.recommended(), QualityTier::P1080);
    }

    #[test]
    fn test_unchanged_when_already_applied() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        let now = Instant::now();
        abr.mark_applied(QualityTier::P720, now);
        assert_eq!(abr.on_sample(&NetworkSample::cellular(), now), AbrDecision::Unchanged);
    }

    #[test]
    fn test_dwell_time_blocks_flapping() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        let start = Instant::now();

        assert_eq!(abr.on_sample(&NetworkSample::wifi(), start), AbrDecision::Switch(QualityTier::P1080));
        abr.mark_applied(QualityTier::P1080, start);

        let soon = start + Duration::from_secs(3);
        assert_eq!(
            abr.on_sample(&NetworkSample::cellular(), soon),
            AbrDecision::Deferred {
                tier: QualityTier::P720,
                retry_in: Duration::from_secs(7)
            }
        );

        // Network flaps back before the dwell expires: nothing to do
        assert_eq!(abr.on_sample(&NetworkSample::wifi(), soon), AbrDecision::Unchanged);

        let later = start + Duration::from_secs(11);
        assert_eq!(
            abr.on_sample(&NetworkSample::cellular(), later),
            AbrDecision::Switch(QualityTier::P720)
        );
        assert_eq!(abr.switch_count(), 1);
    }

    #[test]
    fn test_ceiling_caps_recommendation() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        let start = Instant::now();
        abr.on_sample(&NetworkSample::wifi(), start);
        abr.mark_applied(QualityTier::P1080, start);

        abr.set_ceiling(Some(QualityTier::P480));
        assert_eq!(abr.recommended(), QualityTier::P480);
        assert_eq!(abr.evaluate(start), AbrDecision::Switch(QualityTier::P480));
        abr.mark_applied(QualityTier::P480, start);

        // Below the ceiling the network still decides
        let later = start + DWELL;
        let low_data = NetworkSample {
            is_constrained: true,
            ..NetworkSample::cellular()
        };
        assert_eq!(abr.on_sample(&low_data, later), AbrDecision::Switch(QualityTier::P360));
        abr.mark_applied(QualityTier::P360, later);

        abr.set_ceiling(None);
        assert_eq!(abr.recommended(), QualityTier::P360);
        assert_eq!(abr.on_sample(&NetworkSample::wifi(), later), AbrDecision::Switch(QualityTier::P1080));
    }

    #[test]
    fn test_ceiling_applies_to_auto() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        abr.set_ceiling(Some(QualityTier::P480));
        assert_eq!(abr.evaluate(Instant::now()), AbrDecision::Switch(QualityTier::P480));
    }

    #[test]
    fn test_sync_applied_resets_dwell() {
        let mut abr = AdaptiveBitrateController::new(DWELL, true);
        let now = Instant::now();
        abr.mark_applied(QualityTier::P1080, now);
        abr.sync_applied(QualityTier::Auto);

        assert_eq!(abr.on_sample(&NetworkSample::wifi(), now), AbrDecision::Switch(QualityTier::P1080));
    }
}
