//! Session Coordinator
//!
//! Single authority over which video is on the output and how it is
//! presented. The coordinator routes commands to the bound
//! `PlaybackSession` and mirrors its state; it never holds playback truth
//! of its own.
//!
//! Lock order is always coordinator, then session.

use crate::{
    abr::{AbrDecision, AdaptiveBitrateController},
    backend::VariantSwitch,
    config::PlaybackConfig,
    network::NetworkQualitySampler,
    session::{Collaborators, PlaybackSession},
    types::*,
    Error, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Overlay pause bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct OverlayState {
    paused: bool,
    /// Captured on the first pause, consulted on resume
    was_playing: bool,
}

struct CoordinatorInner {
    session: Option<PlaybackSession>,
    video: Option<VideoRef>,
    mode: PresentationMode,
    transitioning: bool,
    transition_epoch: u64,
    overlay: OverlayState,
    /// Published offset of an in-progress mini-player drag
    drag_offset: f64,
    /// Bumped on every bind, adopt and close
    generation: u64,
    forwarder: Option<JoinHandle<()>>,
    pending_start: Option<JoinHandle<()>>,
    pending_transition: Option<JoinHandle<()>>,
    pending_abr: Option<JoinHandle<()>>,
    abr: AdaptiveBitrateController,
    sampler: NetworkQualitySampler,
}

impl CoordinatorInner {
    fn abort_pending(&mut self) {
        for task in [
            self.forwarder.take(),
            self.pending_start.take(),
            self.pending_abr.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }

    fn end_transition(&mut self) {
        if let Some(task) = self.pending_transition.take() {
            task.abort();
        }
        self.transitioning = false;
        self.transition_epoch += 1;
    }

    fn bound(&self) -> Result<PlaybackSession> {
        self.session.clone().ok_or(Error::NoActiveSession)
    }
}

struct CoordinatorShared {
    config: PlaybackConfig,
    low_power_cap: QualityTier,
    collaborators: Collaborators,
    inner: Mutex<CoordinatorInner>,
    snapshot_tx: watch::Sender<CoordinatorSnapshot>,
}

/// Handle to the coordinator. Construct one at startup and pass clones to
/// whoever issues playback commands.
#[derive(Clone)]
pub struct SessionCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl SessionCoordinator {
    /// Create a coordinator with nothing bound
    pub fn new(config: PlaybackConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let snapshot = CoordinatorSnapshot {
            adaptive_enabled: config.adaptive_enabled,
            ..Default::default()
        };
        let (snapshot_tx, _) = watch::channel(snapshot);
        let abr = AdaptiveBitrateController::new(config.min_quality_dwell(), config.adaptive_enabled);
        let low_power_cap = config.low_power_max_quality;

        Ok(Self {
            shared: Arc::new(CoordinatorShared {
                config,
                collaborators,
                inner: Mutex::new(CoordinatorInner {
                    session: None,
                    video: None,
                    mode: PresentationMode::None,
                    transitioning: false,
                    transition_epoch: 0,
                    overlay: OverlayState::default(),
                    drag_offset: 0.0,
                    generation: 0,
                    forwarder: None,
                    pending_start: None,
                    pending_transition: None,
                    pending_abr: None,
                    abr,
                    sampler: NetworkQualitySampler::new(),
                }),
                snapshot_tx,
                low_power_cap,
            }),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    /// Latest published state
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribe to published state
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Create an unbound session sharing this coordinator's collaborators,
    /// e.g. for an inline player that may later be adopted
    pub fn create_session(&self) -> PlaybackSession {
        PlaybackSession::new(self.shared.config.clone(), self.shared.collaborators.clone())
    }

    /// Currently bound session, if any
    pub async fn active_session(&self) -> Option<PlaybackSession> {
        self.shared.lock().await.session.clone()
    }

    /// Stop whatever is bound, bind `video` and start it after the start delay
    #[instrument(skip(self, video), fields(video_id = %video.id))]
    pub async fn play_video(&self, video: VideoRef, mode: PresentationMode) -> Result<()> {
        if mode == PresentationMode::None {
            return Err(Error::InvalidPresentationMode(
                "cannot play into presentation mode none".into(),
            ));
        }

        let shared = &self.shared;
        let mut inner = shared.lock().await;

        // Tear down the previous binding before anything new exists
        shared.unbind(&mut inner).await;
        inner.end_transition();
        inner.overlay = OverlayState::default();
        inner.drag_offset = 0.0;
        inner.generation += 1;
        let generation = inner.generation;

        let session = PlaybackSession::new(shared.config.clone(), shared.collaborators.clone());
        let setup = session.setup(video.clone()).await;

        inner.forwarder = Some(shared.spawn_forwarder(&session, generation));
        inner.session = Some(session.clone());
        inner.video = Some(video);
        inner.mode = mode;
        inner.abr.sync_applied(QualityTier::Auto);

        if let Err(e) = setup {
            warn!(error = %e, "Setup failed");
            shared.publish(&inner);
            return Err(e);
        }

        inner.pending_start = Some(shared.spawn_start(session));
        let decision = inner.abr.evaluate(Instant::now());
        shared.act_on(&mut inner, decision).await;

        info!(mode = %mode, generation, "Video bound");
        shared.publish(&inner);
        Ok(())
    }

    /// Bind an already running session without stopping or seeking it
    #[instrument(skip(self, session, video), fields(video_id = %video.id))]
    pub async fn adopt(&self, session: PlaybackSession, video: VideoRef, show_fullscreen: bool) -> Result<()> {
        if !session.is_bound().await {
            return Err(Error::NotBound);
        }
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        // Re-adopting the bound session keeps its scheduled start
        let rebinding = inner.session.as_ref().is_some_and(|bound| bound.ptr_eq(&session));
        let pending_start = if rebinding { inner.pending_start.take() } else { None };
        inner.abort_pending();
        inner.pending_start = pending_start;

        if let Some(previous) = inner.session.take() {
            if !rebinding {
                debug!(session_id = %previous.id(), "Releasing previously bound session");
                previous.cleanup().await;
            }
        }
        inner.end_transition();
        inner.overlay = OverlayState::default();
        inner.drag_offset = 0.0;
        inner.generation += 1;
        let generation = inner.generation;

        let mode = if show_fullscreen {
            PresentationMode::Fullscreen
        } else {
            PresentationMode::MiniPlayer
        };

        inner.abr.sync_applied(session.quality());
        inner.forwarder = Some(shared.spawn_forwarder(&session, generation));
        inner.session = Some(session);
        inner.video = Some(video);
        inner.mode = mode;

        info!(mode = %mode, generation, "Session adopted");
        shared.publish(&inner);
        Ok(())
    }

    /// Shrink the bound session into the mini-player
    pub async fn minimize(&self) -> Result<()> {
        self.present(PresentationMode::MiniPlayer).await
    }

    /// Grow the bound session to fullscreen
    pub async fn expand(&self) -> Result<()> {
        self.present(PresentationMode::Fullscreen).await
    }

    #[instrument(skip(self))]
    async fn present(&self, target: PresentationMode) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        if inner.session.is_none() {
            return Err(Error::NoActiveSession);
        }
        if inner.transitioning {
            return Err(Error::TransitionInProgress);
        }
        if inner.mode == target {
            return Ok(());
        }

        let from = inner.mode;
        inner.mode = target;
        inner.drag_offset = 0.0;
        inner.transitioning = true;
        inner.transition_epoch += 1;
        inner.pending_transition = Some(shared.spawn_transition_end(inner.transition_epoch));

        info!(from = %from, to = %target, "Presentation transition");
        shared.publish(&inner);
        Ok(())
    }

    /// Pause, unbind and hide. Safe with nothing bound.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        shared.unbind(&mut inner).await;
        inner.end_transition();
        inner.overlay = OverlayState::default();
        inner.drag_offset = 0.0;
        inner.mode = PresentationMode::None;
        inner.generation += 1;

        info!(generation = inner.generation, "Player closed");
        shared.publish(&inner);
    }

    /// Pause for a full-screen experience that takes over playback
    #[instrument(skip(self))]
    pub async fn pause_for_overlay(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        if inner.overlay.paused {
            debug!("Already paused by overlay");
            return Ok(());
        }
        let Some(session) = inner.session.clone() else {
            return Ok(());
        };

        let was_playing = session.state().is_playing();
        inner.overlay = OverlayState {
            paused: true,
            was_playing,
        };
        if was_playing {
            session.pause().await?;
        }

        debug!(was_playing, "Paused for overlay");
        shared.publish(&inner);
        Ok(())
    }

    /// Undo `pause_for_overlay`, resuming only if playback was running before it
    #[instrument(skip(self))]
    pub async fn resume_after_overlay(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        if !inner.overlay.paused {
            return Ok(());
        }
        let overlay = std::mem::take(&mut inner.overlay);
        shared.publish(&inner);

        if overlay.was_playing {
            if let Some(session) = inner.session.clone() {
                session.play().await?;
                shared.publish(&inner);
            }
        }
        debug!(resumed = overlay.was_playing, "Overlay dismissed");
        Ok(())
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        let mut inner = self.shared.lock().await;
        let session = inner.bound()?;

        // An explicit toggle supersedes the scheduled start
        if let Some(task) = inner.pending_start.take() {
            task.abort();
        }
        session.toggle_play_pause().await?;
        self.shared.publish(&inner);
        Ok(())
    }

    pub async fn seek(&self, fraction: f64) -> Result<()> {
        let inner = self.shared.lock().await;
        inner.bound()?.seek(fraction).await
    }

    /// Skip ahead by the configured step
    pub async fn seek_forward(&self) -> Result<()> {
        let inner = self.shared.lock().await;
        inner.bound()?.seek_forward(self.shared.config.seek_step_secs).await
    }

    /// Skip back by the configured step
    pub async fn seek_backward(&self) -> Result<()> {
        let inner = self.shared.lock().await;
        inner.bound()?.seek_backward(self.shared.config.seek_step_secs).await
    }

    /// Turn adaptive quality on or off. Enabling re-evaluates immediately.
    #[instrument(skip(self))]
    pub async fn set_adaptive_enabled(&self, enabled: bool) {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        inner.abr.set_enabled(enabled);
        if let Some(task) = inner.pending_abr.take() {
            task.abort();
        }
        if enabled {
            let decision = inner.abr.evaluate(Instant::now());
            shared.act_on(&mut inner, decision).await;
        }

        info!(enabled, "Adaptive quality toggled");
        shared.publish(&inner);
    }

    /// Pick a tier manually. Disables adaptive quality.
    #[instrument(skip(self))]
    pub async fn select_quality(&self, tier: QualityTier) -> Result<VariantSwitch> {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        let session = inner.bound()?;

        inner.abr.set_enabled(false);
        if let Some(task) = inner.pending_abr.take() {
            task.abort();
        }

        let switch = session.set_quality(tier).await?;
        inner.abr.mark_applied(tier, Instant::now());
        shared.publish(&inner);
        Ok(switch)
    }

    /// Cap adaptive quality while the device is saving power. Entering or
    /// leaving low-power mode re-evaluates without waiting out the dwell time.
    #[instrument(skip(self))]
    pub async fn set_low_power_mode(&self, enabled: bool) -> AbrDecision {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        inner.abr.set_ceiling(enabled.then_some(shared.low_power_cap));
        if let Some(task) = inner.pending_abr.take() {
            task.abort();
        }
        let decision = inner.abr.evaluate(Instant::now());
        shared.act_on(&mut inner, decision).await;

        info!(enabled, cap = %shared.low_power_cap, decision = ?decision, "Low power mode toggled");
        shared.publish(&inner);
        decision
    }

    /// Feed one connectivity sample to the sampler and the controller
    #[instrument(skip(self))]
    pub async fn ingest_network_sample(&self, sample: NetworkSample) -> AbrDecision {
        let shared = &self.shared;
        let mut inner = shared.lock().await;

        let speed = inner.sampler.ingest(sample);
        let decision = inner.abr.on_sample(&sample, Instant::now());
        debug!(speed = %speed, decision = ?decision, "Network sample evaluated");

        shared.act_on(&mut inner, decision).await;
        shared.publish(&inner);
        decision
    }

    /// Consume a stream of connectivity samples until the sender side closes
    pub fn spawn_network_listener(&self, mut samples: mpsc::Receiver<NetworkSample>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while let Some(sample) = samples.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                SessionCoordinator { shared }.ingest_network_sample(sample).await;
            }
            debug!("Network listener stopped");
        })
    }

    /// Track a vertical drag on the mini-player. Returns the published offset.
    pub async fn update_drag(&self, translation_y: f64) -> f64 {
        let shared = &self.shared;
        let mut inner = shared.lock().await;
        if inner.mode != PresentationMode::MiniPlayer {
            return 0.0;
        }

        let offset = if translation_y.is_finite() { translation_y.max(0.0) } else { 0.0 };
        if offset != inner.drag_offset {
            inner.drag_offset = offset;
            shared.publish(&inner);
        }
        offset
    }

    /// End a vertical drag on the mini-player. Returns true if it dismissed
    /// the player; otherwise the drag offset springs back to 0.
    pub async fn finish_drag(&self, translation_y: f64) -> bool {
        {
            let shared = &self.shared;
            let mut inner = shared.lock().await;
            let dismiss =
                inner.mode == PresentationMode::MiniPlayer && translation_y > shared.config.drag_dismiss_threshold;
            if !dismiss {
                if inner.drag_offset != 0.0 {
                    inner.drag_offset = 0.0;
                    shared.publish(&inner);
                }
                return false;
            }
        }
        self.close().await;
        true
    }
}

impl CoordinatorShared {
    async fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().await
    }

    /// Pause and tear down the bound session, releasing its player
    async fn unbind(&self, inner: &mut CoordinatorInner) {
        inner.abort_pending();
        inner.video = None;

        let Some(session) = inner.session.take() else {
            return;
        };
        if let Err(e) = session.pause().await {
            debug!(session_id = %session.id(), error = %e, "Pause on unbind skipped");
        }
        session.cleanup().await;
        debug!(session_id = %session.id(), "Session unbound");
    }

    async fn act_on(self: &Arc<Self>, inner: &mut CoordinatorInner, decision: AbrDecision) {
        match decision {
            AbrDecision::Switch(tier) => {
                if let Some(task) = inner.pending_abr.take() {
                    task.abort();
                }
                let Some(session) = inner.session.clone() else {
                    return;
                };
                match session.set_quality(tier).await {
                    Ok(switch) => {
                        if switch == VariantSwitch::Unsupported {
                            debug!(tier = %tier, "Adaptive tier unsupported by player");
                        }
                        inner.abr.mark_applied(tier, Instant::now());
                    }
                    Err(e) => warn!(tier = %tier, error = %e, "Adaptive quality switch failed"),
                }
            }
            AbrDecision::Deferred { retry_in, .. } => {
                if inner.pending_abr.as_ref().map_or(true, |t| t.is_finished()) {
                    inner.pending_abr = Some(self.schedule_reevaluation(inner.generation, retry_in));
                }
            }
            AbrDecision::Disabled | AbrDecision::Unchanged => {}
        }
    }

    fn schedule_reevaluation(self: &Arc<Self>, generation: u64, retry_in: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(retry_in).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            if inner.generation != generation {
                return;
            }
            inner.pending_abr = None;

            let decision = inner.abr.evaluate(Instant::now());
            debug!(decision = ?decision, "Deferred quality re-evaluated");
            shared.act_on(&mut inner, decision).await;
            shared.publish(&inner);
        })
    }

    /// Start `session` after the start delay if it is still the bound one
    fn spawn_start(self: &Arc<Self>, session: PlaybackSession) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let delay = self.config.start_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            inner.pending_start = None;
            if !inner.session.as_ref().is_some_and(|bound| bound.ptr_eq(&session)) {
                debug!(session_id = %session.id(), "Discarding start for replaced binding");
                return;
            }
            if inner.overlay.paused {
                // Start once the overlay goes away
                inner.overlay.was_playing = true;
                shared.publish(&inner);
                return;
            }
            if let Err(e) = session.play().await {
                warn!(session_id = %session.id(), error = %e, "Delayed start failed");
            }
            shared.publish(&inner);
        })
    }

    fn spawn_transition_end(self: &Arc<Self>, epoch: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let duration = self.config.transition_duration();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            if inner.transition_epoch == epoch {
                inner.transitioning = false;
                inner.pending_transition = None;
                shared.publish(&inner);
            }
        })
    }

    /// Mirror session snapshots for as long as `generation` is current
    fn spawn_forwarder(self: &Arc<Self>, session: &PlaybackSession, generation: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut updates = session.subscribe();
        tokio::spawn(async move {
            loop {
                let latest = updates.borrow_and_update().clone();
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.snapshot_tx.send_if_modified(|snapshot| {
                    if snapshot.generation != generation {
                        return false;
                    }
                    snapshot.mirror(&latest);
                    true
                });
                drop(shared);

                if updates.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn publish(&self, inner: &CoordinatorInner) {
        let session = inner.session.as_ref().map(|s| s.snapshot());
        let adaptive_enabled = inner.abr.is_enabled();
        let low_power_mode = inner.abr.ceiling().is_some();
        let network_speed = inner.sampler.current();

        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.generation = inner.generation;
            match &session {
                Some(latest) => snapshot.mirror(latest),
                None => snapshot.clear_session_fields(),
            }
            snapshot.video = inner.video.clone();
            snapshot.presentation_mode = inner.mode;
            snapshot.is_transitioning = inner.transitioning;
            snapshot.adaptive_enabled = adaptive_enabled;
            snapshot.low_power_mode = low_power_mode;
            snapshot.network_speed = network_speed;
            snapshot.paused_by_overlay = inner.overlay.paused;
            snapshot.drag_offset = inner.drag_offset;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBackend;

    fn coordinator() -> (SessionCoordinator, Arc<SimulatedBackend>) {
        let backend = Arc::new(SimulatedBackend::default());
        let coordinator =
            SessionCoordinator::new(PlaybackConfig::default(), Collaborators::new(backend.clone())).unwrap();
        (coordinator, backend)
    }

    fn video(id: &str) -> VideoRef {
        VideoRef::new(id, format!("https://cdn.example.com/{}/master.m3u8", id))
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let backend = Arc::new(SimulatedBackend::default());
        let config = PlaybackConfig {
            start_delay_ms: 0,
            ..Default::default()
        };
        assert!(SessionCoordinator::new(config, Collaborators::new(backend)).is_err());
    }

    #[tokio::test]
    async fn test_play_into_none_rejected() {
        let (coordinator, backend) = coordinator();
        let result = coordinator.play_video(video("a"), PresentationMode::None).await;

        assert!(matches!(result, Err(Error::InvalidPresentationMode(_))));
        assert!(backend.players().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_delay() {
        let (coordinator, backend) = coordinator();
        coordinator.play_video(video("a"), PresentationMode::Fullscreen).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!backend.last_player().unwrap().is_playing());
        assert_eq!(coordinator.snapshot().state, PlaybackState::Ready);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(backend.last_player().unwrap().is_playing());
        assert_eq!(coordinator.snapshot().state, PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_guard() {
        let (coordinator, _backend) = coordinator();
        assert!(matches!(coordinator.minimize().await, Err(Error::NoActiveSession)));

        coordinator.play_video(video("a"), PresentationMode::Fullscreen).await.unwrap();
        coordinator.minimize().await.unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.presentation_mode, PresentationMode::MiniPlayer);
        assert!(snapshot.is_transitioning);

        assert!(matches!(coordinator.expand().await, Err(Error::TransitionInProgress)));

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(!coordinator.snapshot().is_transitioning);
        coordinator.expand().await.unwrap();
        assert_eq!(coordinator.snapshot().presentation_mode, PresentationMode::Fullscreen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_always_safe() {
        let (coordinator, backend) = coordinator();
        coordinator.close().await;

        coordinator.play_video(video("a"), PresentationMode::Embedded).await.unwrap();
        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(backend.audible_players(), 1);
        coordinator.close().await;
        coordinator.close().await;

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.presentation_mode, PresentationMode::None);
        assert!(snapshot.video.is_none());
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(backend.audible_players(), 0);
        assert_eq!(backend.last_player().unwrap().release_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_drag() {
        let (coordinator, _backend) = coordinator();
        coordinator.play_video(video("a"), PresentationMode::MiniPlayer).await.unwrap();

        assert!(!coordinator.finish_drag(60.0).await);
        assert_eq!(coordinator.snapshot().presentation_mode, PresentationMode::MiniPlayer);

        assert!(coordinator.finish_drag(140.0).await);
        assert_eq!(coordinator.snapshot().presentation_mode, PresentationMode::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_offset_springs_back() {
        let (coordinator, _backend) = coordinator();
        coordinator.play_video(video("a"), PresentationMode::MiniPlayer).await.unwrap();

        assert_eq!(coordinator.update_drag(60.0).await, 60.0);
        assert_eq!(coordinator.snapshot().drag_offset, 60.0);
        assert_eq!(coordinator.update_drag(-20.0).await, 0.0);

        coordinator.update_drag(80.0).await;
        assert!(!coordinator.finish_drag(80.0).await);
        assert_eq!(coordinator.snapshot().drag_offset, 0.0);
        assert_eq!(coordinator.snapshot().presentation_mode, PresentationMode::MiniPlayer);

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.expand().await.unwrap();
        assert_eq!(coordinator.update_drag(60.0).await, 0.0);
        assert_eq!(coordinator.snapshot().drag_offset, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_power_caps_adaptive_quality() {
        let (coordinator, backend) = coordinator();
        coordinator.play_video(video("a"), PresentationMode::Fullscreen).await.unwrap();
        coordinator.ingest_network_sample(NetworkSample::wifi()).await;
        assert_eq!(coordinator.snapshot().quality, QualityTier::P1080);

        let decision = coordinator.set_low_power_mode(true).await;
        assert_eq!(decision, AbrDecision::Switch(QualityTier::P480));
        let snapshot = coordinator.snapshot();
        assert!(snapshot.low_power_mode);
        assert_eq!(snapshot.quality, QualityTier::P480);

        let decision = coordinator.ingest_network_sample(NetworkSample::wifi()).await;
        assert_eq!(decision, AbrDecision::Unchanged);

        assert_eq!(
            coordinator.set_low_power_mode(false).await,
            AbrDecision::Switch(QualityTier::P1080)
        );
        assert!(!coordinator.snapshot().low_power_mode);
        assert_eq!(
            backend.last_player().unwrap().variants(),
            vec![QualityTier::P1080, QualityTier::P480, QualityTier::P1080]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_quality_disables_adaptive() {
        let (coordinator, backend) = coordinator();
        coordinator.play_video(video("a"), PresentationMode::Fullscreen).await.unwrap();

        coordinator.select_quality(QualityTier::P480).await.unwrap();
        assert!(!coordinator.snapshot().adaptive_enabled);

        let decision = coordinator.ingest_network_sample(NetworkSample::wifi()).await;
        assert_eq!(decision, AbrDecision::Disabled);
        assert_eq!(backend.last_player().unwrap().variants(), vec![QualityTier::P480]);
        assert_eq!(coordinator.snapshot().quality, QualityTier::P480);
    }
}
