//! Core types for Channel Player

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A playable video as supplied by the content catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    /// Catalog identifier, also the resume-position key
    pub id: String,
    /// Source URL handed to the media backend
    pub source_url: String,
    /// Duration advertised by the catalog, in seconds
    pub duration_hint: Option<f64>,
    /// Title for now-playing integration
    pub title: Option<String>,
    /// Creator/channel name for now-playing integration
    pub creator: Option<String>,
}

impl VideoRef {
    /// Create a video reference with only the required fields
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            duration_hint: None,
            title: None,
            creator: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }
}

/// Why a setup attempt ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Source URL could not be parsed
    InvalidSource,
    /// Asset could not be loaded or decoded
    AssetLoadFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidSource => write!(f, "invalid source"),
            FailureReason::AssetLoadFailed => write!(f, "asset load failed"),
        }
    }
}

/// Playback state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PlaybackState {
    /// No content bound
    Idle,
    /// Asset duration is loading
    Loading,
    /// Asset loaded, not yet started
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Playing intent, but the player is stalled waiting for data
    Buffering,
    /// Reached the end, rewound and not playing
    Ended,
    /// Terminal failure for this setup attempt
    Failed(FailureReason),
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) | (Idle, Failed(_)) |
            // From Loading (play/pause intent may arrive before the asset is ready)
            (Loading, Ready) | (Loading, Playing) | (Loading, Paused) | (Loading, Failed(_)) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Ended) | (Ready, Failed(_)) |
            // From Playing
            (Playing, Paused) | (Playing, Buffering) | (Playing, Ended) | (Playing, Failed(_)) |
            // From Paused
            (Paused, Playing) | (Paused, Buffering) | (Paused, Ended) | (Paused, Failed(_)) |
            // From Buffering
            (Buffering, Playing) | (Buffering, Paused) | (Buffering, Ended) | (Buffering, Failed(_)) |
            // From Ended
            (Ended, Playing) | (Ended, Paused)
        )
    }

    /// True while the user intends playback to run
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }

    /// True for `Failed`
    pub fn is_failed(&self) -> bool {
        matches!(self, PlaybackState::Failed(_))
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Where the bound session is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationMode {
    /// Nothing presented
    #[default]
    None,
    /// Inline, inside a detail view
    Embedded,
    /// Floating mini-player
    MiniPlayer,
    /// Fullscreen player
    Fullscreen,
}

impl PresentationMode {
    pub fn is_visible(&self) -> bool {
        !matches!(self, PresentationMode::None)
    }
}

impl std::fmt::Display for PresentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresentationMode::None => write!(f, "none"),
            PresentationMode::Embedded => write!(f, "embedded"),
            PresentationMode::MiniPlayer => write!(f, "mini-player"),
            PresentationMode::Fullscreen => write!(f, "fullscreen"),
        }
    }
}

/// Discrete quality class, ordered from `Auto` to the highest resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum QualityTier {
    /// Let the player pick
    #[default]
    Auto,
    P144,
    P240,
    P360,
    P480,
    P720,
    P1080,
    P1440,
    P2160,
}

impl QualityTier {
    /// All tiers in ascending order
    pub const ALL: [QualityTier; 9] = [
        QualityTier::Auto,
        QualityTier::P144,
        QualityTier::P240,
        QualityTier::P360,
        QualityTier::P480,
        QualityTier::P720,
        QualityTier::P1080,
        QualityTier::P1440,
        QualityTier::P2160,
    ];

    /// Nominal bitrate in bits per second (0 for `Auto`)
    pub fn bitrate(&self) -> u64 {
        match self {
            QualityTier::Auto => 0,
            QualityTier::P144 => 200_000,
            QualityTier::P240 => 400_000,
            QualityTier::P360 => 800_000,
            QualityTier::P480 => 1_200_000,
            QualityTier::P720 => 2_500_000,
            QualityTier::P1080 => 5_000_000,
            QualityTier::P1440 => 8_000_000,
            QualityTier::P2160 => 15_000_000,
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Auto => "Auto",
            QualityTier::P144 => "144p",
            QualityTier::P240 => "240p",
            QualityTier::P360 => "360p",
            QualityTier::P480 => "480p",
            QualityTier::P720 => "720p",
            QualityTier::P1080 => "1080p",
            QualityTier::P1440 => "1440p",
            QualityTier::P2160 => "4K",
        }
    }

    /// Vertical resolution in lines (`None` for `Auto`)
    pub fn height(&self) -> Option<u32> {
        match self {
            QualityTier::Auto => None,
            QualityTier::P144 => Some(144),
            QualityTier::P240 => Some(240),
            QualityTier::P360 => Some(360),
            QualityTier::P480 => Some(480),
            QualityTier::P720 => Some(720),
            QualityTier::P1080 => Some(1080),
            QualityTier::P1440 => Some(1440),
            QualityTier::P2160 => Some(2160),
        }
    }

    /// Tier of a rendered frame `height` lines tall
    pub fn from_height(height: f64) -> Self {
        if !height.is_finite() || height <= 0.0 {
            return QualityTier::Auto;
        }
        match height {
            h if h < 240.0 => QualityTier::P144,
            h if h < 360.0 => QualityTier::P240,
            h if h < 480.0 => QualityTier::P360,
            h if h < 720.0 => QualityTier::P480,
            h if h < 1080.0 => QualityTier::P720,
            h if h < 1440.0 => QualityTier::P1080,
            h if h < 2160.0 => QualityTier::P1440,
            _ => QualityTier::P2160,
        }
    }

    /// Parse a display label (case-insensitive)
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tier| tier.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse network classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSpeed {
    Slow,
    Moderate,
    Fast,
    Excellent,
    #[default]
    Unknown,
}

impl NetworkSpeed {
    /// Quality tier recommended for this classification
    pub fn recommended_tier(&self) -> QualityTier {
        match self {
            NetworkSpeed::Slow => QualityTier::P360,
            NetworkSpeed::Moderate => QualityTier::P480,
            NetworkSpeed::Fast => QualityTier::P720,
            NetworkSpeed::Excellent => QualityTier::P1080,
            NetworkSpeed::Unknown => QualityTier::Auto,
        }
    }
}

impl std::fmt::Display for NetworkSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkSpeed::Slow => write!(f, "slow"),
            NetworkSpeed::Moderate => write!(f, "moderate"),
            NetworkSpeed::Fast => write!(f, "fast"),
            NetworkSpeed::Excellent => write!(f, "excellent"),
            NetworkSpeed::Unknown => write!(f, "unknown"),
        }
    }
}

/// Path status as reported by the OS network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Satisfied,
    Unsatisfied,
    RequiresConnection,
}

/// Interface carrying the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Wifi,
    Cellular,
    WiredEthernet,
    Loopback,
    Other,
}

/// One raw connectivity sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub status: PathStatus,
    /// Metered path (personal hotspot, roaming)
    pub is_expensive: bool,
    /// Low data mode requested by the user
    #[serde(default)]
    pub is_constrained: bool,
    pub interface: Option<InterfaceType>,
}

impl NetworkSample {
    pub fn wifi() -> Self {
        Self {
            status: PathStatus::Satisfied,
            is_expensive: false,
            is_constrained: false,
            interface: Some(InterfaceType::Wifi),
        }
    }

    pub fn cellular() -> Self {
        Self {
            status: PathStatus::Satisfied,
            is_expensive: false,
            is_constrained: false,
            interface: Some(InterfaceType::Cellular),
        }
    }

    pub fn offline() -> Self {
        Self {
            status: PathStatus::Unsatisfied,
            is_expensive: false,
            is_constrained: false,
            interface: None,
        }
    }

    pub fn expensive(mut self) -> Self {
        self.is_expensive = true;
        self
    }
}

/// Fraction of `duration` covered by `position`, always within [0, 1].
///
/// Unknown, non-finite or non-positive durations yield 0.
pub fn progress_fraction(position: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d.is_finite() && d > 0.0 && position.is_finite() => (position / d).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Normalized buffer health: seconds buffered ahead of the playhead over
/// the healthy target, clamped to [0, 1].
pub fn buffer_health(buffered_end: f64, current_time: f64, healthy_buffer_secs: f64) -> f64 {
    if !buffered_end.is_finite() || !current_time.is_finite() || healthy_buffer_secs <= 0.0 {
        return 0.0;
    }
    ((buffered_end - current_time) / healthy_buffer_secs).clamp(0.0, 1.0)
}

/// Render seconds as `m:ss` or `h:mm:ss`
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Observable state of one playback session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub video: Option<VideoRef>,
    pub state: PlaybackState,
    /// Seconds
    pub current_time: f64,
    /// Seconds, once known
    pub duration: Option<f64>,
    /// Playhead position in [0, 1]
    pub progress: f64,
    /// Loaded range end in [0, 1]
    pub buffered_progress: f64,
    /// Seconds buffered ahead over the healthy target, in [0, 1]
    pub buffer_health: f64,
    pub is_buffering: bool,
    /// Tier last requested from the player
    pub quality: QualityTier,
    /// Tier of the frames actually being rendered, once reported
    pub rendered_quality: Option<QualityTier>,
    pub rate: f32,
    pub muted: bool,
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    /// Default published state for a session with nothing bound
    pub fn idle(session_id: SessionId) -> Self {
        Self {
            session_id,
            video: None,
            state: PlaybackState::Idle,
            current_time: 0.0,
            duration: None,
            progress: 0.0,
            buffered_progress: 0.0,
            buffer_health: 0.0,
            is_buffering: false,
            quality: QualityTier::Auto,
            rendered_quality: None,
            rate: 1.0,
            muted: false,
            error_message: None,
        }
    }

    pub fn current_time_label(&self) -> String {
        format_timestamp(self.current_time)
    }

    pub fn duration_label(&self) -> String {
        format_timestamp(self.duration.unwrap_or(0.0))
    }
}

/// Observable state of the coordinator, mirrored from the bound session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Binding generation the session fields belong to
    pub generation: u64,
    pub video: Option<VideoRef>,
    pub state: PlaybackState,
    pub current_time: f64,
    pub progress: f64,
    pub buffer_health: f64,
    pub is_buffering: bool,
    pub quality: QualityTier,
    pub rendered_quality: Option<QualityTier>,
    pub presentation_mode: PresentationMode,
    pub is_transitioning: bool,
    pub adaptive_enabled: bool,
    /// Adaptive quality is capped for battery saving
    pub low_power_mode: bool,
    pub network_speed: NetworkSpeed,
    pub paused_by_overlay: bool,
    /// Vertical offset of an in-progress mini-player drag (points, >= 0)
    pub drag_offset: f64,
    pub error_message: Option<String>,
}

impl Default for CoordinatorSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            video: None,
            state: PlaybackState::Idle,
            current_time: 0.0,
            progress: 0.0,
            buffer_health: 0.0,
            is_buffering: false,
            quality: QualityTier::Auto,
            rendered_quality: None,
            presentation_mode: PresentationMode::None,
            is_transitioning: false,
            adaptive_enabled: true,
            low_power_mode: false,
            network_speed: NetworkSpeed::Unknown,
            paused_by_overlay: false,
            drag_offset: 0.0,
            error_message: None,
        }
    }
}

impl CoordinatorSnapshot {
    /// Copy session-owned fields from a session snapshot
    pub fn mirror(&mut self, session: &SessionSnapshot) {
        self.state = session.state;
        self.current_time = session.current_time;
        self.progress = session.progress;
        self.buffer_health = session.buffer_health;
        self.is_buffering = session.is_buffering;
        self.quality = session.quality;
        self.rendered_quality = session.rendered_quality;
        self.error_message = session.error_message.clone();
    }

    /// Reset session-owned fields after the binding is cleared
    pub fn clear_session_fields(&mut self) {
        self.video = None;
        self.state = PlaybackState::Idle;
        self.current_time = 0.0;
        self.progress = 0.0;
        self.buffer_health = 0.0;
        self.is_buffering = false;
        self.quality = QualityTier::Auto;
        self.rendered_quality = None;
        self.error_message = None;
    }
}

/// Payload for OS now-playing / remote-control integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<f64>,
    pub elapsed: f64,
    /// 0.0 while paused
    pub rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction_guards_duration() {
        assert_eq!(progress_fraction(30.0, Some(120.0)), 0.25);
        assert_eq!(progress_fraction(30.0, None), 0.0);
        assert_eq!(progress_fraction(30.0, Some(0.0)), 0.0);
        assert_eq!(progress_fraction(30.0, Some(f64::NAN)), 0.0);
        assert_eq!(progress_fraction(30.0, Some(f64::INFINITY)), 0.0);
        assert_eq!(progress_fraction(500.0, Some(120.0)), 1.0);
        assert_eq!(progress_fraction(-3.0, Some(120.0)), 0.0);
    }

    #[test]
    fn test_buffer_health() {
        assert_eq!(buffer_health(15.0, 10.0, 10.0), 0.5);
        assert_eq!(buffer_health(40.0, 10.0, 10.0), 1.0);
        assert_eq!(buffer_health(5.0, 10.0, 10.0), 0.0);
        assert_eq!(buffer_health(f64::NAN, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_tier_from_rendered_height() {
        assert_eq!(QualityTier::from_height(1080.0), QualityTier::P1080);
        assert_eq!(QualityTier::from_height(720.0), QualityTier::P720);
        assert_eq!(QualityTier::from_height(719.0), QualityTier::P480);
        assert_eq!(QualityTier::from_height(100.0), QualityTier::P144);
        assert_eq!(QualityTier::from_height(0.0), QualityTier::Auto);
        assert_eq!(QualityTier::from_height(f64::NAN), QualityTier::Auto);
        assert_eq!(QualityTier::from_height(4320.0), QualityTier::P2160);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.4), "1:05");
        assert_eq!(format_timestamp(3723.0), "1:02:03");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
    }

    #[test]
    fn test_quality_tier_ordering() {
        assert!(QualityTier::Auto < QualityTier::P240);
        assert!(QualityTier::P720 < QualityTier::P1080);
        assert_eq!(QualityTier::P2160.bitrate(), 15_000_000);
        assert_eq!(QualityTier::from_label("1080P"), Some(QualityTier::P1080));
        assert_eq!(QualityTier::from_label("8k"), None);
    }

    #[test]
    fn test_playback_state_transitions() {
        use PlaybackState::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Buffering));
        assert!(Buffering.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Ended));
        assert!(Ended.can_transition_to(Playing));
        assert!(Loading.can_transition_to(Failed(FailureReason::AssetLoadFailed)));

        assert!(!Idle.can_transition_to(Playing));
        assert!(!Failed(FailureReason::InvalidSource).can_transition_to(Playing));
        assert!(!Ended.can_transition_to(Failed(FailureReason::AssetLoadFailed)));
    }
}
