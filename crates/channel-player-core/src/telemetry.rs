//! Telemetry and now-playing side effects
//!
//! Sessions emit discrete events (play, pause, seek, quality change, end,
//! failure) to a `TelemetrySink` and keep the OS now-playing surface current
//! through a `NowPlayingSink`.

use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Telemetry event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Playback started or resumed
    Play {
        video_id: String,
        position: f64,
    },

    /// Playback paused
    Pause {
        video_id: String,
        position: f64,
    },

    /// Seek completed
    Seek {
        video_id: String,
        from: f64,
        to: f64,
    },

    /// Quality tier changed
    QualityChange {
        video_id: String,
        from: QualityTier,
        to: QualityTier,
    },

    /// Played to the end
    Ended {
        video_id: String,
        duration: f64,
    },

    /// Terminal failure
    Failed {
        video_id: String,
        code: String,
        message: String,
    },
}

/// Telemetry event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Emitting session
    pub session_id: SessionId,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

/// Receiver of discrete playback events
pub trait TelemetrySink: Send + Sync {
    fn record(&self, session_id: SessionId, event: TelemetryEvent);
}

/// Receiver of OS now-playing / remote-control updates
pub trait NowPlayingSink: Send + Sync {
    fn update(&self, info: &NowPlayingInfo);

    fn clear(&self);
}

/// Buffering telemetry emitter that forwards records to a background logger
pub struct TelemetryEmitter {
    /// Event sequence counter
    sequence: AtomicU64,
    /// Most recent records
    buffer: Mutex<VecDeque<TelemetryRecord>>,
    /// Maximum records retained
    max_buffer_size: usize,
    /// Channel to the background processor
    event_tx: mpsc::Sender<TelemetryRecord>,
}

impl TelemetryEmitter {
    /// Create an emitter. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        let (event_tx, mut event_rx) = mpsc::channel::<TelemetryRecord>(1000);

        // Spawn background processor
        tokio::spawn(async move {
            while let Some(record) = event_rx.recv().await {
                debug!(
                    event_id = %record.id,
                    session_id = %record.session_id,
                    sequence = record.sequence,
                    event = ?record.event,
                    "Telemetry event"
                );
            }
        });

        Self {
            sequence: AtomicU64::new(0),
            buffer: Mutex::new(VecDeque::with_capacity(max_buffer_size)),
            max_buffer_size: max_buffer_size.max(1),
            event_tx,
        }
    }

    /// Retained records, oldest first
    pub fn events(&self) -> Vec<TelemetryRecord> {
        lock(&self.buffer).iter().cloned().collect()
    }

    /// Retained events without metadata, oldest first
    pub fn event_kinds(&self) -> Vec<TelemetryEvent> {
        lock(&self.buffer).iter().map(|r| r.event.clone()).collect()
    }

    pub fn clear(&self) {
        lock(&self.buffer).clear();
    }
}

impl Default for TelemetryEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for TelemetryEmitter {
    fn record(&self, session_id: SessionId, event: TelemetryEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        let record = TelemetryRecord {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            sequence,
            event,
        };

        {
            let mut buffer = lock(&self.buffer);
            if buffer.len() >= self.max_buffer_size {
                buffer.pop_front();
            }
            buffer.push_back(record.clone());
        }

        if let Err(e) = self.event_tx.try_send(record) {
            warn!(error = %e, "Telemetry event dropped");
        }
    }
}

/// Now-playing sink that keeps the latest published info
#[derive(Debug, Default)]
pub struct NowPlayingLog {
    current: Mutex<Option<NowPlayingInfo>>,
    updates: AtomicU64,
}

impl NowPlayingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<NowPlayingInfo> {
        lock(&self.current).clone()
    }

    /// Number of updates received
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl NowPlayingSink for NowPlayingLog {
    fn update(&self, info: &NowPlayingInfo) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = Some(info.clone());
    }

    fn clear(&self) {
        *lock(&self.current) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_are_sequenced() {
        let emitter = TelemetryEmitter::new();
        let session = SessionId::new();

        emitter.record(session, TelemetryEvent::Play { video_id: "v".into(), position: 0.0 });
        emitter.record(session, TelemetryEvent::Pause { video_id: "v".into(), position: 3.0 });

        let events = emitter.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[1].session_id, session);
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let emitter = TelemetryEmitter::with_capacity(3);
        let session = SessionId::new();
        for i in 0..5 {
            emitter.record(
                session,
                TelemetryEvent::Seek { video_id: "v".into(), from: 0.0, to: i as f64 },
            );
        }

        let events = emitter.event_kinds();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            TelemetryEvent::Seek { video_id: "v".into(), from: 0.0, to: 2.0 }
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = TelemetryEvent::QualityChange {
            video_id: "v".into(),
            from: QualityTier::Auto,
            to: QualityTier::P1080,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"quality_change\""));
    }

    #[test]
    fn test_now_playing_log() {
        let log = NowPlayingLog::new();
        log.update(&NowPlayingInfo {
            title: "Intro".into(),
            artist: None,
            duration: Some(120.0),
            elapsed: 4.0,
            rate: 1.0,
        });
        assert_eq!(log.update_count(), 1);
        assert_eq!(log.current().unwrap().elapsed, 4.0);

        log.clear();
        assert!(log.current().is_none());
    }
}
