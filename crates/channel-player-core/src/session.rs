//! Playback Session - owns one underlying media player
//!
//! Coordinates:
//! - Player creation and observer subscriptions
//! - Asynchronous asset loading and resume positioning
//! - Seeks, quality switches and buffer health
//! - Idempotent teardown
//!
//! Every binding to a player carries an epoch. Background results (asset
//! load, seek completion, player events) re-check the `cleaned` flag and the
//! epoch under the session lock before touching any field, so work that
//! outlives a cleanup or a re-setup is dropped on arrival.

use crate::{
    backend::{ItemStatus, MediaBackend, MediaPlayer, PlayerEvent, VariantSwitch},
    config::PlaybackConfig,
    resume::{MemoryResumeStore, ResumeStore},
    telemetry::{NowPlayingLog, NowPlayingSink, TelemetryEmitter, TelemetryEvent, TelemetrySink},
    types::*,
    Error, Result,
};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// External collaborators shared by every session
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn MediaBackend>,
    pub resume: Arc<dyn ResumeStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub now_playing: Arc<dyn NowPlayingSink>,
}

impl Collaborators {
    /// Collaborators with in-memory resume store, logging telemetry and a
    /// recording now-playing sink. Must be called inside a tokio runtime.
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            resume: Arc::new(MemoryResumeStore::new()),
            telemetry: Arc::new(TelemetryEmitter::new()),
            now_playing: Arc::new(NowPlayingLog::new()),
        }
    }

    pub fn with_resume_store(mut self, resume: Arc<dyn ResumeStore>) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_now_playing(mut self, now_playing: Arc<dyn NowPlayingSink>) -> Self {
        self.now_playing = now_playing;
        self
    }
}

/// Why a seek was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekOrigin {
    /// User scrubbed or skipped
    User,
    /// Stored resume position applied after load
    Resume,
    /// Playhead restored after a variant switch moved it
    QualityRestore,
    /// Rewind after playing to the end
    Rewind,
}

/// A live binding to one underlying player.
///
/// Dropping the binding removes its observer, aborts its pending tasks and
/// releases the player exactly once.
struct Binding {
    epoch: u64,
    player: Arc<dyn MediaPlayer>,
    /// Applies player events one at a time, in emission order
    observer: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Binding {
    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        debug!(epoch = self.epoch, "Removing observer");
        self.observer.abort();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.player.pause();
        self.player.release();
    }
}

/// Mutable session state, only touched under the session lock
struct SessionInner {
    video: Option<VideoRef>,
    binding: Option<Binding>,
    /// Single source of truth for "torn down"
    cleaned: bool,
    epoch: u64,
    /// Machine state; stalls are tracked separately so intent survives them
    state: PlaybackState,
    stalled: bool,
    error_message: Option<String>,
    current_time: f64,
    duration: Option<f64>,
    buffered_end: f64,
    quality: QualityTier,
    rendered_quality: Option<QualityTier>,
    rate: f32,
    muted: bool,
    /// Playhead to hold while a resume or post-switch restore seek is in flight
    restoring_position: Option<f64>,
    last_resume_save: Option<Instant>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            video: None,
            binding: None,
            cleaned: true,
            epoch: 0,
            state: PlaybackState::Idle,
            stalled: false,
            error_message: None,
            current_time: 0.0,
            duration: None,
            buffered_end: 0.0,
            quality: QualityTier::Auto,
            rendered_quality: None,
            rate: 1.0,
            muted: false,
            restoring_position: None,
            last_resume_save: None,
        }
    }

    /// Reset every published field to its default
    fn reset_published(&mut self) {
        self.video = None;
        self.state = PlaybackState::Idle;
        self.stalled = false;
        self.error_message = None;
        self.current_time = 0.0;
        self.duration = None;
        self.buffered_end = 0.0;
        self.quality = QualityTier::Auto;
        self.rendered_quality = None;
        self.rate = 1.0;
        self.muted = false;
        self.restoring_position = None;
        self.last_resume_save = None;
    }

    /// True if a background result tagged with `epoch` may still be applied
    fn accepts(&self, epoch: u64) -> bool {
        !self.cleaned && self.epoch == epoch && self.binding.is_some()
    }

    fn player(&self) -> Result<Arc<dyn MediaPlayer>> {
        if self.cleaned {
            return Err(Error::NotBound);
        }
        self.binding
            .as_ref()
            .map(|b| b.player.clone())
            .ok_or(Error::NotBound)
    }

    fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Duration to seek within, if the session can seek at all
    fn seekable_duration(&self) -> Result<f64> {
        self.player()?;
        if self.state.is_failed() {
            return Err(Error::PlaybackFailed);
        }
        self.known_duration().ok_or(Error::DurationUnknown)
    }

    fn video_id(&self) -> String {
        self.video.as_ref().map(|v| v.id.clone()).unwrap_or_default()
    }

    /// State as seen by observers: a stall while playing reads as buffering
    fn published_state(&self) -> PlaybackState {
        if self.stalled && self.state == PlaybackState::Playing {
            PlaybackState::Buffering
        } else {
            self.state
        }
    }
}

struct SessionShared {
    id: SessionId,
    config: PlaybackConfig,
    collaborators: Collaborators,
    inner: Mutex<SessionInner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

/// Handle to a playback session. Clones share the same session; the player
/// is released when the session is cleaned up or the last handle is dropped.
#[derive(Clone)]
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
}

impl PlaybackSession {
    /// Create an idle session
    pub fn new(config: PlaybackConfig, collaborators: Collaborators) -> Self {
        let id = SessionId::new();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::idle(id));

        Self {
            shared: Arc::new(SessionShared {
                id,
                config,
                collaborators,
                inner: Mutex::new(SessionInner::new()),
                snapshot_tx,
            }),
        }
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// True if both handles refer to the same session
    pub fn ptr_eq(&self, other: &PlaybackSession) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribe to published state
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.snapshot_tx.borrow().state
    }

    pub fn current_time(&self) -> f64 {
        self.shared.snapshot_tx.borrow().current_time
    }

    pub fn progress(&self) -> f64 {
        self.shared.snapshot_tx.borrow().progress
    }

    pub fn quality(&self) -> QualityTier {
        self.shared.snapshot_tx.borrow().quality
    }

    pub fn video(&self) -> Option<VideoRef> {
        self.shared.snapshot_tx.borrow().video.clone()
    }

    /// True while a player is bound and the session has not been cleaned
    pub async fn is_bound(&self) -> bool {
        self.shared.lock().await.player().is_ok()
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    /// Bind a new player for `video`, replacing any previous binding
    #[instrument(skip(self, video), fields(session_id = %self.shared.id, video_id = %video.id))]
    pub async fn setup(&self, video: VideoRef) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        shared.cleanup_locked(&mut inner);
        inner.reset_published();
        inner.epoch += 1;
        inner.cleaned = false;
        inner.duration = video.duration_hint.filter(|d| d.is_finite() && *d > 0.0);
        inner.video = Some(video.clone());

        let url = match Url::parse(&video.source_url) {
            Ok(url) => url,
            Err(e) => {
                let message = format!("{}: {}", video.source_url, e);
                shared.fail(&mut inner, FailureReason::InvalidSource, message.clone());
                return Err(Error::InvalidSource(message));
            }
        };

        let player = match shared.collaborators.backend.create_player(&url) {
            Ok(player) => player,
            Err(e) => {
                shared.fail(&mut inner, FailureReason::AssetLoadFailed, e.to_string());
                return Err(e);
            }
        };

        inner.state = PlaybackState::Loading;
        let epoch = inner.epoch;
        let observer = shared.spawn_observer(player.events(), epoch);
        let load = shared.spawn_load(player.clone(), video.clone(), epoch);

        inner.binding = Some(Binding {
            epoch,
            player,
            observer,
            tasks: vec![load],
        });

        info!(url = %url, "Session bound");
        shared.publish(&inner);
        Ok(())
    }

    /// Start or resume playback
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn play(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let player = inner.player()?;

        if inner.state.is_failed() {
            return Err(Error::PlaybackFailed);
        }
        if inner.state == PlaybackState::Playing {
            return Ok(());
        }

        player.set_rate(inner.rate);
        player.play();
        shared.transition(&mut inner, PlaybackState::Playing)?;

        shared.collaborators.telemetry.record(
            shared.id,
            TelemetryEvent::Play {
                video_id: inner.video_id(),
                position: inner.current_time,
            },
        );
        shared.update_now_playing(&inner);
        shared.publish(&inner);
        Ok(())
    }

    /// Pause playback. Pausing anything but a playing session is a no-op.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn pause(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let player = inner.player()?;

        if inner.state != PlaybackState::Playing {
            return Ok(());
        }

        player.pause();
        shared.transition(&mut inner, PlaybackState::Paused)?;

        shared.collaborators.telemetry.record(
            shared.id,
            TelemetryEvent::Pause {
                video_id: inner.video_id(),
                position: inner.current_time,
            },
        );
        shared.update_now_playing(&inner);
        shared.publish(&inner);
        Ok(())
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        if self.shared.lock().await.state == PlaybackState::Playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Seek to a fraction of the duration. State updates when the seek completes.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn seek(&self, fraction: f64) -> Result<()> {
        let mut inner = self.shared.lock().await;
        self.shared.seek_to_fraction(&mut inner, fraction)
    }

    /// Skip ahead, clamped to the duration
    pub async fn seek_forward(&self, seconds: f64) -> Result<()> {
        self.seek_relative(seconds).await
    }

    /// Skip back, clamped to the start
    pub async fn seek_backward(&self, seconds: f64) -> Result<()> {
        self.seek_relative(-seconds).await
    }

    async fn seek_relative(&self, delta: f64) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let duration = inner.seekable_duration()?;
        if !delta.is_finite() {
            return Err(Error::InvalidSeek(delta));
        }

        let target = (inner.current_time + delta).clamp(0.0, duration);
        shared.start_seek(&mut inner, target, SeekOrigin::User);
        Ok(())
    }

    /// Switch to the variant for `tier` without moving the playhead
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn set_quality(&self, tier: QualityTier) -> Result<VariantSwitch> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let player = inner.player()?;

        if inner.quality == tier {
            return Ok(VariantSwitch::Applied);
        }

        let position = inner.restoring_position.unwrap_or(inner.current_time);
        match player.select_variant(tier) {
            VariantSwitch::Unsupported => {
                debug!(tier = %tier, "Variant switching unsupported, keeping current quality");
                Ok(VariantSwitch::Unsupported)
            }
            VariantSwitch::Applied => {
                let from = inner.quality;
                inner.quality = tier;

                let drift = (player.current_time() - position).abs();
                if drift > shared.config.quality_switch_tolerance_secs {
                    debug!(position, drift, "Variant switch moved playhead, restoring");
                    inner.restoring_position = Some(position);
                    shared.start_seek(&mut inner, position, SeekOrigin::QualityRestore);
                }

                info!(from = %from, to = %tier, "Quality changed");
                shared.collaborators.telemetry.record(
                    shared.id,
                    TelemetryEvent::QualityChange {
                        video_id: inner.video_id(),
                        from,
                        to: tier,
                    },
                );
                shared.publish(&inner);
                Ok(VariantSwitch::Applied)
            }
        }
    }

    /// Set the playback rate, clamped to 0.5x..2x. Returns the applied rate.
    pub async fn set_playback_rate(&self, rate: f32) -> Result<f32> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let player = inner.player()?;

        let rate = if rate.is_finite() { rate.clamp(0.5, 2.0) } else { 1.0 };
        inner.rate = rate;
        if inner.state == PlaybackState::Playing {
            player.set_rate(rate);
        }
        shared.update_now_playing(&inner);
        shared.publish(&inner);
        Ok(rate)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let player = inner.player()?;

        player.set_muted(muted);
        inner.muted = muted;
        shared.publish(&inner);
        Ok(())
    }

    /// Forget the resume position of the current video
    pub async fn mark_watched(&self) -> Result<()> {
        let inner = self.shared.lock().await;
        let video = inner.video.as_ref().ok_or(Error::NotBound)?;
        self.shared.collaborators.resume.clear(&video.id)
    }

    /// Tear down the binding. Safe to call any number of times.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn cleanup(&self) {
        let mut inner = self.shared.lock().await;
        self.shared.cleanup_locked(&mut inner);
    }
}

impl SessionShared {
    async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    fn cleanup_locked(&self, inner: &mut SessionInner) {
        if inner.cleaned {
            debug!(session_id = %self.id, "Session already cleaned");
            return;
        }
        inner.cleaned = true;
        inner.epoch += 1;

        // Dropping the binding removes the observer and releases the player
        if let Some(binding) = inner.binding.take() {
            debug!(session_id = %self.id, epoch = binding.epoch, "Releasing binding");
            drop(binding);
        }

        inner.reset_published();
        self.collaborators.now_playing.clear();
        self.publish(inner);
        info!(session_id = %self.id, "Session cleaned up");
    }

    fn transition(&self, inner: &mut SessionInner, to: PlaybackState) -> Result<()> {
        let from = inner.state;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        inner.state = to;
        info!(session_id = %self.id, from = %from, to = %to, "State transition");
        Ok(())
    }

    fn fail(&self, inner: &mut SessionInner, reason: FailureReason, message: String) {
        if inner.state.is_failed() {
            return;
        }
        warn!(session_id = %self.id, reason = %reason, message = %message, "Playback failed");

        if let Some(binding) = inner.binding.as_ref() {
            binding.player.pause();
        }
        inner.state = PlaybackState::Failed(reason);
        inner.stalled = false;
        inner.error_message = Some(message.clone());

        let code = match reason {
            FailureReason::InvalidSource => Error::InvalidSource(message.clone()).error_code(),
            FailureReason::AssetLoadFailed => Error::AssetLoadFailed(message.clone()).error_code(),
        };
        self.collaborators.telemetry.record(
            self.id,
            TelemetryEvent::Failed {
                video_id: inner.video_id(),
                code: code.to_string(),
                message,
            },
        );
        self.publish(inner);
    }

    fn seek_to_fraction(self: &Arc<Self>, inner: &mut SessionInner, fraction: f64) -> Result<()> {
        let duration = inner.seekable_duration()?;
        if !fraction.is_finite() {
            return Err(Error::InvalidSeek(fraction));
        }

        let target = fraction.clamp(0.0, 1.0) * duration;
        self.start_seek(inner, target, SeekOrigin::User);
        Ok(())
    }

    /// Issue an asynchronous seek; its effect is applied only on completion
    fn start_seek(self: &Arc<Self>, inner: &mut SessionInner, target: f64, origin: SeekOrigin) {
        let Some(binding) = inner.binding.as_mut() else {
            return;
        };
        let player = binding.player.clone();
        let epoch = inner.epoch;
        let from = inner.current_time;
        let weak = Arc::downgrade(self);

        debug!(session_id = %self.id, from, to = target, origin = ?origin, "Seeking");
        let task = tokio::spawn(async move {
            let finished = player.seek(target).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            shared.complete_seek(&mut inner, epoch, from, target, origin, finished);
        });
        binding.track(task);
    }

    fn complete_seek(
        &self,
        inner: &mut SessionInner,
        epoch: u64,
        from: f64,
        target: f64,
        origin: SeekOrigin,
        finished: bool,
    ) {
        if !inner.accepts(epoch) {
            debug!(session_id = %self.id, target, "Discarding seek completion for stale binding");
            return;
        }
        if matches!(origin, SeekOrigin::Resume | SeekOrigin::QualityRestore) {
            inner.restoring_position = None;
        }
        if !finished {
            debug!(session_id = %self.id, target, "Seek did not finish");
            return;
        }

        inner.current_time = target;
        match origin {
            SeekOrigin::User => {
                if inner.state == PlaybackState::Ended {
                    let _ = self.transition(inner, PlaybackState::Paused);
                }
                self.save_resume(inner, true);
                self.collaborators.telemetry.record(
                    self.id,
                    TelemetryEvent::Seek {
                        video_id: inner.video_id(),
                        from,
                        to: target,
                    },
                );
            }
            SeekOrigin::QualityRestore => self.save_resume(inner, true),
            SeekOrigin::Resume | SeekOrigin::Rewind => {}
        }

        self.update_now_playing(inner);
        self.publish(inner);
    }

    fn spawn_load(self: &Arc<Self>, player: Arc<dyn MediaPlayer>, video: VideoRef, epoch: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = player.load_duration().await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            if !inner.accepts(epoch) {
                debug!(session_id = %shared.id, video_id = %video.id, "Discarding asset load for stale binding");
                return;
            }

            match result {
                Ok(duration) if duration.is_finite() && duration > 0.0 => {
                    inner.duration = Some(duration);
                    if inner.state == PlaybackState::Loading {
                        let _ = shared.transition(&mut inner, PlaybackState::Ready);
                    }
                    info!(session_id = %shared.id, duration, "Asset loaded");

                    if let Some(entry) = shared.collaborators.resume.get(&video.id) {
                        if shared.config.is_valid_resume_position(entry.position_seconds, duration) {
                            info!(session_id = %shared.id, position = entry.position_seconds, "Resuming");
                            inner.restoring_position = Some(entry.position_seconds);
                            shared.start_seek(&mut inner, entry.position_seconds, SeekOrigin::Resume);
                        } else {
                            debug!(position = entry.position_seconds, duration, "Ignoring resume position");
                        }
                    }
                }
                Ok(duration) => {
                    // live or indefinite assets have no usable duration
                    debug!(session_id = %shared.id, duration, "Asset has no finite duration");
                    if inner.state == PlaybackState::Loading {
                        let _ = shared.transition(&mut inner, PlaybackState::Ready);
                    }
                }
                Err(e) => {
                    shared.fail(&mut inner, FailureReason::AssetLoadFailed, e.to_string());
                    return;
                }
            }

            shared.update_now_playing(&inner);
            shared.publish(&inner);
        })
    }

    fn spawn_observer(self: &Arc<Self>, mut events: broadcast::Receiver<PlayerEvent>, epoch: u64) -> JoinHandle<()> {
        let weak: Weak<SessionShared> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(epoch, skipped, "Observer lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let mut inner = shared.lock().await;
                shared.handle_event(&mut inner, epoch, event);
            }
        })
    }

    fn handle_event(self: &Arc<Self>, inner: &mut SessionInner, epoch: u64, event: PlayerEvent) {
        if !inner.accepts(epoch) {
            return;
        }

        match event {
            PlayerEvent::TimeUpdate(time) => {
                // late updates from before the rewind or a restore seek
                if !time.is_finite()
                    || inner.restoring_position.is_some()
                    || inner.state == PlaybackState::Ended
                {
                    return;
                }
                inner.current_time = time.max(0.0);
                if inner.stalled {
                    debug!(session_id = %self.id, time, "Stall cleared");
                    inner.stalled = false;
                }
                self.save_resume(inner, false);
            }
            PlayerEvent::Status(ItemStatus::ReadyToPlay { duration }) => {
                if inner.known_duration().is_none() && duration.is_finite() && duration > 0.0 {
                    inner.duration = Some(duration);
                }
                if inner.state == PlaybackState::Loading {
                    let _ = self.transition(inner, PlaybackState::Ready);
                }
            }
            PlayerEvent::Status(ItemStatus::Failed { message }) => {
                self.fail(inner, FailureReason::AssetLoadFailed, message);
                return;
            }
            PlayerEvent::PresentationSize { height, .. } => {
                let tier = QualityTier::from_height(height);
                if tier != QualityTier::Auto && inner.rendered_quality != Some(tier) {
                    debug!(session_id = %self.id, height, tier = %tier, "Rendered quality changed");
                    inner.rendered_quality = Some(tier);
                }
            }
            PlayerEvent::LoadedRange { end, .. } => {
                if end.is_finite() {
                    inner.buffered_end = end.max(0.0);
                }
            }
            PlayerEvent::Stalled => {
                if !inner.state.is_failed() {
                    debug!(session_id = %self.id, position = inner.current_time, "Playback stalled");
                    inner.stalled = true;
                }
            }
            PlayerEvent::PlayedToEnd => self.handle_end(inner),
        }

        self.publish(inner);
    }

    fn handle_end(self: &Arc<Self>, inner: &mut SessionInner) {
        if inner.state == PlaybackState::Ended || self.transition(inner, PlaybackState::Ended).is_err() {
            return;
        }
        let duration = inner.known_duration().unwrap_or(inner.current_time);
        let video_id = inner.video_id();

        inner.stalled = false;
        inner.current_time = 0.0;
        inner.last_resume_save = None;
        if let Some(binding) = inner.binding.as_ref() {
            binding.player.pause();
        }
        self.start_seek(inner, 0.0, SeekOrigin::Rewind);

        if let Err(e) = self.collaborators.resume.clear(&video_id) {
            warn!(session_id = %self.id, error = %e, "Failed to clear resume position");
        }
        self.collaborators
            .telemetry
            .record(self.id, TelemetryEvent::Ended { video_id, duration });
        self.update_now_playing(inner);
        info!(session_id = %self.id, "Playback ended");
    }

    /// Persist the playhead; periodic writes are throttled, forced ones are not
    fn save_resume(&self, inner: &mut SessionInner, force: bool) {
        let Some(video) = inner.video.as_ref() else {
            return;
        };
        if !force {
            if inner.state != PlaybackState::Playing {
                return;
            }
            let due = inner
                .last_resume_save
                .map_or(true, |last| last.elapsed() >= self.config.resume_save_interval());
            if !due {
                return;
            }
        }
        // the stored position stays authoritative until the held seek lands
        if inner.current_time <= 0.0 || inner.restoring_position.is_some() {
            return;
        }

        match self.collaborators.resume.set(&video.id, inner.current_time) {
            Ok(()) => inner.last_resume_save = Some(Instant::now()),
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to save resume position"),
        }
    }

    fn update_now_playing(&self, inner: &SessionInner) {
        let Some(video) = inner.video.as_ref() else {
            return;
        };
        let info = NowPlayingInfo {
            title: video.title.clone().unwrap_or_else(|| video.id.clone()),
            artist: video.creator.clone(),
            duration: inner.known_duration(),
            elapsed: inner.current_time,
            rate: if inner.state == PlaybackState::Playing { inner.rate } else { 0.0 },
        };
        self.collaborators.now_playing.update(&info);
    }

    fn publish(&self, inner: &SessionInner) {
        let duration = inner.known_duration();
        let bound = inner.binding.is_some() && !inner.cleaned;
        let health = match duration {
            Some(_) if bound => buffer_health(inner.buffered_end, inner.current_time, self.config.healthy_buffer_secs),
            _ => 0.0,
        };
        let fully_loaded = duration.is_some_and(|d| inner.buffered_end >= d);
        let is_buffering = bound
            && (inner.stalled
                || (duration.is_some() && !fully_loaded && health < self.config.buffering_threshold));

        let snapshot = SessionSnapshot {
            session_id: self.id,
            video: inner.video.clone(),
            state: inner.published_state(),
            current_time: inner.current_time,
            duration,
            progress: progress_fraction(inner.current_time, duration),
            buffered_progress: progress_fraction(inner.buffered_end, duration),
            buffer_health: health,
            is_buffering,
            quality: inner.quality,
            rendered_quality: inner.rendered_quality,
            rate: inner.rate,
            muted: inner.muted,
            error_message: inner.error_message.clone(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, SimulatedBackend};
    use std::time::Duration;

    fn session_with(backend: Arc<SimulatedBackend>) -> PlaybackSession {
        PlaybackSession::new(PlaybackConfig::default(), Collaborators::new(backend))
    }

    fn video() -> VideoRef {
        VideoRef::new("v1", "https://cdn.example.com/v1/master.m3u8").with_title("Intro")
    }

    #[tokio::test]
    async fn test_session_creation() {
        let session = session_with(Arc::new(SimulatedBackend::default()));

        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.current_time(), 0.0);
        assert!(!session.is_bound().await);
        assert!(matches!(session.play().await, Err(Error::NotBound)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_loads_asynchronously() {
        let session = session_with(Arc::new(SimulatedBackend::default()));

        session.setup(video()).await.unwrap();
        assert_eq!(session.state(), PlaybackState::Loading);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Ready);
        assert_eq!(snapshot.duration, Some(120.0));
    }

    #[tokio::test]
    async fn test_invalid_source_fails_synchronously() {
        let backend = Arc::new(SimulatedBackend::default());
        let session = session_with(backend.clone());

        let result = session.setup(VideoRef::new("bad", "not a url")).await;
        assert!(matches!(result, Err(Error::InvalidSource(_))));
        assert_eq!(session.state(), PlaybackState::Failed(FailureReason::InvalidSource));
        assert!(backend.players().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_asset_load_failure_is_reported() {
        let backend = Arc::new(SimulatedBackend::default());
        backend.fail_source("https://cdn.example.com/v1/master.m3u8");
        let session = session_with(backend);

        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Failed(FailureReason::AssetLoadFailed));
        assert!(snapshot.error_message.is_some());
        assert!(matches!(session.play().await, Err(Error::PlaybackFailed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pause_toggle() {
        let session = session_with(Arc::new(SimulatedBackend::default()));
        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.toggle_play_pause().await.unwrap();
        assert_eq!(session.state(), PlaybackState::Playing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(session.current_time() > 1.5);

        session.toggle_play_pause().await.unwrap();
        assert_eq!(session.state(), PlaybackState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_before_duration_known() {
        let session = session_with(Arc::new(SimulatedBackend::default()));
        session.setup(video()).await.unwrap();

        assert!(matches!(session.seek(0.5).await, Err(Error::DurationUnknown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_applies_on_completion() {
        let session = session_with(Arc::new(SimulatedBackend::default()));
        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.seek(0.5).await.unwrap();
        assert_eq!(session.current_time(), 0.0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.current_time(), 60.0);
        assert_eq!(session.progress(), 0.5);

        session.seek(7.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.progress(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_clears_on_time_update() {
        let backend = Arc::new(SimulatedBackend::default());
        let session = session_with(backend.clone());
        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1050)).await;

        let player = backend.last_player().unwrap();
        player.inject_stall();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let stalled = session.snapshot();
        assert_eq!(stalled.state, PlaybackState::Buffering);
        assert!(stalled.is_buffering);
        assert!(stalled.current_time > 0.5);

        player.recover();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_to_end_rewinds() {
        let backend = Arc::new(SimulatedBackend::new(SimConfig {
            duration: 3.0,
            ..Default::default()
        }));
        let session = session_with(backend);
        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.play().await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Ended);
        assert_eq!(snapshot.current_time, 0.0);

        session.play().await.unwrap();
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_after_end_pauses() {
        let backend = Arc::new(SimulatedBackend::new(SimConfig {
            duration: 3.0,
            ..Default::default()
        }));
        let session = session_with(backend);
        session.setup(video()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(session.state(), PlaybackState::Ended);

        session.seek(0.5).await.unwrap();
        assert_eq!(session.state(), PlaybackState::Ended);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert_eq!(snapshot.current_time, 1.5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stall_after_time_update_stays_buffering() {
        let backend = Arc::new(SimulatedBackend::new(SimConfig {
            load_latency: Duration::from_millis(1),
            ..Default::default()
        }));

        for _ in 0..50 {
            let session = session_with(backend.clone());
            session.setup(video()).await.unwrap();
            let mut updates = session.subscribe();
            tokio::time::timeout(
                Duration::from_secs(2),
                updates.wait_for(|s| s.state == PlaybackState::Ready),
            )
            .await
            .unwrap()
            .unwrap();

            let player = backend.last_player().unwrap();
            player.emit(PlayerEvent::TimeUpdate(1.0));
            player.emit(PlayerEvent::Stalled);
            tokio::time::sleep(Duration::from_millis(50)).await;

            let snapshot = session.snapshot();
            assert_eq!(snapshot.current_time, 1.0);
            assert!(snapshot.is_buffering);
            session.cleanup().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendered_quality_follows_presentation_size() {
        let backend = Arc::new(SimulatedBackend::new(SimConfig {
            native_height: 720,
            ..Default::default()
        }));
        let session = session_with(backend.clone());
        session.setup(video()).await.unwrap();
        assert_eq!(session.snapshot().rendered_quality, None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.snapshot().rendered_quality, Some(QualityTier::P720));

        session.set_quality(QualityTier::P360).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.quality, QualityTier::P360);
        assert_eq!(snapshot.rendered_quality, Some(QualityTier::P360));

        // 1080p requested but the asset tops out at 720p
        session.set_quality(QualityTier::P1080).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.quality, QualityTier::P1080);
        assert_eq!(snapshot.rendered_quality, Some(QualityTier::P720));

        backend.last_player().unwrap().emit(PlayerEvent::PresentationSize { width: 0.0, height: 0.0 });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.snapshot().rendered_quality, Some(QualityTier::P720));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_and_mute() {
        let backend = Arc::new(SimulatedBackend::default());
        let session = session_with(backend.clone());
        assert!(matches!(session.set_muted(true).await, Err(Error::NotBound)));

        session.setup(video()).await.unwrap();
        assert_eq!(session.set_playback_rate(4.0).await.unwrap(), 2.0);
        session.set_muted(true).await.unwrap();

        session.play().await.unwrap();
        let player = backend.last_player().unwrap();
        assert_eq!(player.rate(), 2.0);
        assert!(player.is_muted());
        assert!(session.snapshot().muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resetup_releases_previous_player() {
        let backend = Arc::new(SimulatedBackend::default());
        let session = session_with(backend.clone());

        session.setup(video()).await.unwrap();
        session
            .setup(VideoRef::new("v2", "https://cdn.example.com/v2/master.m3u8"))
            .await
            .unwrap();

        let players = backend.players();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].release_count(), 1);
        assert_eq!(players[1].release_count(), 0);
        assert_eq!(session.video().unwrap().id, "v2");
    }
}
