//! Network quality sampling
//!
//! Converts raw path samples from the OS network layer into a coarse
//! `NetworkSpeed` classification.

use crate::types::*;
use tokio::sync::watch;
use tracing::debug;

/// Classify one raw sample.
///
/// Satisfied paths are graded by cost and interface; anything not satisfied
/// is `Unknown`, which maps to automatic quality.
pub fn classify(sample: &NetworkSample) -> NetworkSpeed {
    if sample.status != PathStatus::Satisfied {
        return NetworkSpeed::Unknown;
    }
    if sample.is_constrained {
        NetworkSpeed::Slow
    } else if sample.is_expensive {
        NetworkSpeed::Moderate
    } else {
        match sample.interface {
            Some(InterfaceType::Wifi) | Some(InterfaceType::WiredEthernet) => NetworkSpeed::Excellent,
            // cellular and anything unrecognized
            _ => NetworkSpeed::Fast,
        }
    }
}

/// Holds the latest classification and publishes changes
pub struct NetworkQualitySampler {
    speed_tx: watch::Sender<NetworkSpeed>,
    last_sample: Option<NetworkSample>,
    samples_seen: u64,
}

impl NetworkQualitySampler {
    pub fn new() -> Self {
        let (speed_tx, _) = watch::channel(NetworkSpeed::Unknown);
        Self {
            speed_tx,
            last_sample: None,
            samples_seen: 0,
        }
    }

    /// Classify and record a sample
    pub fn ingest(&mut self, sample: NetworkSample) -> NetworkSpeed {
        let speed = classify(&sample);
        self.samples_seen += 1;
        self.last_sample = Some(sample);

        let changed = self.speed_tx.send_if_modified(|current| {
            if *current != speed {
                *current = speed;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(speed = %speed, interface = ?sample.interface, "Network classification changed");
        }
        speed
    }

    /// Latest classification
    pub fn current(&self) -> NetworkSpeed {
        *self.speed_tx.borrow()
    }

    pub fn last_sample(&self) -> Option<NetworkSample> {
        self.last_sample
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Subscribe to classification changes
    pub fn subscribe(&self) -> watch::Receiver<NetworkSpeed> {
        self.speed_tx.subscribe()
    }
}

impl Default for NetworkQualitySampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_policy() {
        assert_eq!(classify(&NetworkSample::wifi()), NetworkSpeed::Excellent);
        assert_eq!(classify(&NetworkSample::cellular()), NetworkSpeed::Fast);
        assert_eq!(classify(&NetworkSample::wifi().expensive()), NetworkSpeed::Moderate);
        assert_eq!(classify(&NetworkSample::cellular().expensive()), NetworkSpeed::Moderate);
        assert_eq!(classify(&NetworkSample::offline()), NetworkSpeed::Unknown);

        let pending = NetworkSample {
            status: PathStatus::RequiresConnection,
            ..NetworkSample::wifi()
        };
        assert_eq!(classify(&pending), NetworkSpeed::Unknown);

        let low_data = NetworkSample {
            is_constrained: true,
            ..NetworkSample::cellular()
        };
        assert_eq!(classify(&low_data), NetworkSpeed::Slow);
    }

    #[test]
    fn test_sampler_publishes_changes_only() {
        let mut sampler = NetworkQualitySampler::new();
        let mut rx = sampler.subscribe();
        assert_eq!(sampler.current(), NetworkSpeed::Unknown);

        sampler.ingest(NetworkSample::wifi());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), NetworkSpeed::Excellent);

        sampler.ingest(NetworkSample::wifi());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(sampler.samples_seen(), 2);
    }
}
