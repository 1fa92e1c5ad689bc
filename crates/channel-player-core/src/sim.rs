//! Simulated media backend
//!
//! Deterministic in-process stand-in for the OS player. Time advances in
//! fixed ticks while playing, a loaded range is reported a fixed distance
//! ahead of the playhead, and failures, stalls and latencies can be
//! injected. Works under tokio's paused clock.

use crate::{
    backend::{ItemStatus, MediaBackend, MediaPlayer, PlayerEvent, VariantSwitch},
    Error, QualityTier, Result,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Behavior knobs for simulated players
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Asset duration in seconds
    pub duration: f64,
    /// Time taken by `load_duration`
    pub load_latency: Duration,
    /// Time taken by `seek`
    pub seek_latency: Duration,
    /// Playhead tick
    pub tick: Duration,
    /// Seconds loaded ahead of the playhead
    pub buffer_ahead_secs: f64,
    /// Whether variants can be selected
    pub supports_variants: bool,
    /// A variant switch rewinds the playhead to 0 (naive backends do this)
    pub variant_switch_rewinds: bool,
    /// Highest rendition the asset carries (lines)
    pub native_height: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration: 120.0,
            load_latency: Duration::from_millis(50),
            seek_latency: Duration::from_millis(20),
            tick: Duration::from_millis(100),
            buffer_ahead_secs: 15.0,
            supports_variants: true,
            variant_switch_rewinds: false,
            native_height: 1080,
        }
    }
}

/// Backend producing `SimulatedPlayer`s
pub struct SimulatedBackend {
    config: SimConfig,
    durations: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    players: Mutex<Vec<Arc<SimulatedPlayer>>>,
}

impl SimulatedBackend {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            durations: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            players: Mutex::new(Vec::new()),
        }
    }

    /// Override the duration for one source URL
    pub fn set_duration(&self, source: &str, seconds: f64) {
        lock(&self.durations).insert(normalize(source), seconds);
    }

    /// Make asset loading fail for one source URL
    pub fn fail_source(&self, source: &str) {
        lock(&self.failing).insert(normalize(source));
    }

    /// Every player created so far, oldest first
    pub fn players(&self) -> Vec<Arc<SimulatedPlayer>> {
        lock(&self.players).clone()
    }

    /// Most recently created player
    pub fn last_player(&self) -> Option<Arc<SimulatedPlayer>> {
        lock(&self.players).last().cloned()
    }

    /// Number of created players not yet released and currently playing
    pub fn audible_players(&self) -> usize {
        lock(&self.players)
            .iter()
            .filter(|p| !p.is_released() && p.is_playing())
            .count()
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl MediaBackend for SimulatedBackend {
    fn create_player(&self, source: &Url) -> Result<Arc<dyn MediaPlayer>> {
        let key = normalize(source.as_str());
        let mut config = self.config.clone();
        if let Some(duration) = lock(&self.durations).get(&key) {
            config.duration = *duration;
        }
        let fail_load = lock(&self.failing).contains(&key);

        let player = SimulatedPlayer::spawn(source.clone(), config, fail_load);
        lock(&self.players).push(player.clone());
        debug!(source = %source, "Simulated player created");
        Ok(player)
    }
}

#[derive(Debug)]
struct SimState {
    loaded: bool,
    playing: bool,
    stalled: bool,
    released: bool,
    muted: bool,
    rate: f32,
    position: f64,
    variants: Vec<QualityTier>,
    rendition: QualityTier,
}

/// Simulated player with inspection helpers for tests
pub struct SimulatedPlayer {
    source: Url,
    config: SimConfig,
    fail_load: bool,
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<PlayerEvent>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    seeks: AtomicUsize,
    releases: AtomicUsize,
}

impl SimulatedPlayer {
    fn spawn(source: Url, config: SimConfig, fail_load: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let state = Arc::new(Mutex::new(SimState {
            loaded: false,
            playing: false,
            stalled: false,
            released: false,
            muted: false,
            rate: 1.0,
            position: 0.0,
            variants: Vec::new(),
            rendition: QualityTier::Auto,
        }));

        let ticker = tokio::spawn(run_ticker(state.clone(), events.clone(), config.clone()));

        Arc::new(Self {
            source,
            config,
            fail_load,
            state,
            events,
            ticker: Mutex::new(Some(ticker)),
            seeks: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    pub fn rate(&self) -> f32 {
        lock(&self.state).rate
    }

    /// Number of seeks issued against this player
    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }

    /// Number of times `release` was invoked
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Variants selected so far
    pub fn variants(&self) -> Vec<QualityTier> {
        lock(&self.state).variants.clone()
    }

    /// Stop producing time updates and report a stall
    pub fn inject_stall(&self) {
        lock(&self.state).stalled = true;
        let _ = self.events.send(PlayerEvent::Stalled);
    }

    /// Resume producing time updates after a stall
    pub fn recover(&self) {
        lock(&self.state).stalled = false;
    }

    /// Emit an arbitrary event, as a misbehaving or late OS callback would
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Rendered frame size for a selected tier, capped at the native rendition
    fn presentation_size(&self, tier: QualityTier) -> PlayerEvent {
        let height = tier
            .height()
            .map_or(self.config.native_height, |h| h.min(self.config.native_height));
        let height = f64::from(height);
        PlayerEvent::PresentationSize {
            width: (height * 16.0 / 9.0).round(),
            height,
        }
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
    }
}

#[async_trait]
impl MediaPlayer for SimulatedPlayer {
    async fn load_duration(&self) -> Result<f64> {
        tokio::time::sleep(self.config.load_latency).await;

        if self.fail_load {
            let message = format!("cannot open {}", self.source);
            let _ = self.events.send(PlayerEvent::Status(ItemStatus::Failed {
                message: message.clone(),
            }));
            return Err(Error::AssetLoadFailed(message));
        }

        let (position, rendition) = {
            let mut state = lock(&self.state);
            state.loaded = true;
            (state.position, state.rendition)
        };
        let _ = self.events.send(PlayerEvent::Status(ItemStatus::ReadyToPlay {
            duration: self.config.duration,
        }));
        let _ = self.events.send(self.presentation_size(rendition));
        let _ = self.events.send(PlayerEvent::LoadedRange {
            start: 0.0,
            end: (position + self.config.buffer_ahead_secs).min(self.config.duration),
        });
        Ok(self.config.duration)
    }

    async fn seek(&self, position: f64) -> bool {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.config.seek_latency).await;

        let mut state = lock(&self.state);
        if state.released {
            return false;
        }
        state.position = position.clamp(0.0, self.config.duration);
        true
    }

    fn play(&self) {
        lock(&self.state).playing = true;
    }

    fn pause(&self) {
        lock(&self.state).playing = false;
    }

    fn set_rate(&self, rate: f32) {
        lock(&self.state).rate = rate;
    }

    fn set_muted(&self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).position
    }

    fn select_variant(&self, tier: QualityTier) -> VariantSwitch {
        if !self.config.supports_variants {
            return VariantSwitch::Unsupported;
        }
        let loaded = {
            let mut state = lock(&self.state);
            state.variants.push(tier);
            state.rendition = tier;
            if self.config.variant_switch_rewinds {
                state.position = 0.0;
            }
            state.loaded
        };
        if loaded {
            let _ = self.events.send(self.presentation_size(tier));
        }
        VariantSwitch::Applied
    }

    fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = lock(&self.state);
            state.released = true;
            state.playing = false;
        }
        self.stop_ticker();
    }
}

impl Drop for SimulatedPlayer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

async fn run_ticker(state: Arc<Mutex<SimState>>, events: broadcast::Sender<PlayerEvent>, config: SimConfig) {
    let mut interval = tokio::time::interval(config.tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let (position, ended) = {
            let mut state = lock(&state);
            if state.released {
                return;
            }
            if !state.loaded || !state.playing || state.stalled {
                continue;
            }
            let step = config.tick.as_secs_f64() * f64::from(state.rate);
            state.position = (state.position + step).min(config.duration);
            let ended = state.position >= config.duration;
            if ended {
                state.playing = false;
            }
            (state.position, ended)
        };

        let _ = events.send(PlayerEvent::TimeUpdate(position));
        let _ = events.send(PlayerEvent::LoadedRange {
            start: 0.0,
            end: (position + config.buffer_ahead_secs).min(config.duration),
        });
        if ended {
            let _ = events.send(PlayerEvent::PlayedToEnd);
        }
    }
}

fn normalize(source: &str) -> String {
    Url::parse(source)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| source.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_advances_only_while_playing() {
        let backend = SimulatedBackend::default();
        let player = backend.create_player(&url("https://cdn.example.com/a.m3u8")).unwrap();

        assert_eq!(player.load_duration().await.unwrap(), 120.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(player.current_time(), 0.0);

        player.play();
        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(player.current_time() >= 0.9 && player.current_time() <= 1.1);

        player.pause();
        let paused_at = player.current_time();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(player.current_time(), paused_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source() {
        let backend = SimulatedBackend::default();
        backend.fail_source("https://cdn.example.com/broken.mp4");
        let player = backend
            .create_player(&url("https://cdn.example.com/broken.mp4"))
            .unwrap();

        assert!(matches!(player.load_duration().await, Err(Error::AssetLoadFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_stops_playback() {
        let backend = SimulatedBackend::default();
        let player = backend.create_player(&url("https://cdn.example.com/a.m3u8")).unwrap();
        player.load_duration().await.unwrap();
        player.play();
        assert_eq!(backend.audible_players(), 1);

        player.release();
        assert_eq!(backend.audible_players(), 0);
        assert_eq!(backend.last_player().unwrap().release_count(), 1);
    }
}
