//! CLI command implementations

use crate::output::{self, OutputFormat, TierRow};
use anyhow::{bail, Context};
use channel_player_core::{
    Collaborators, InterfaceType, JsonFileResumeStore, NetworkSample, NetworkSpeed, PathStatus,
    PlaybackConfig, PresentationMode, QualityTier, SessionCoordinator, SimConfig, SimulatedBackend,
    TelemetryEmitter, VideoRef,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Load the playback configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PlaybackConfig> {
    match path {
        Some(path) => PlaybackConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PlaybackConfig::default()),
    }
}

/// Scripted walkthrough of the coordinator
pub async fn demo(config: PlaybackConfig, format: &str) -> anyhow::Result<()> {
    let backend = Arc::new(SimulatedBackend::default());
    let coordinator = SessionCoordinator::new(config.clone(), Collaborators::new(backend.clone()))?;
    let settle = config.start_delay() + Duration::from_millis(200);
    let transition = config.transition_duration() + Duration::from_millis(50);

    let trailer = VideoRef::new("trailer", "https://cdn.mychannel.example/trailer/master.m3u8")
        .with_title("Channel Trailer")
        .with_creator("MyChannel");
    let episode = VideoRef::new("episode-1", "https://cdn.mychannel.example/episode-1/master.m3u8")
        .with_title("Episode 1")
        .with_creator("MyChannel");

    coordinator.play_video(trailer, PresentationMode::Fullscreen).await?;
    output::print_snapshot("play_video", &coordinator.snapshot(), format)?;
    sleep(settle).await;
    output::print_snapshot("started", &coordinator.snapshot(), format)?;

    coordinator.ingest_network_sample(NetworkSample::wifi()).await;
    output::print_snapshot("network: wifi", &coordinator.snapshot(), format)?;
    sleep(Duration::from_secs(1)).await;

    coordinator.minimize().await?;
    output::print_snapshot("minimize", &coordinator.snapshot(), format)?;
    sleep(transition).await;
    coordinator.expand().await?;
    sleep(transition).await;
    output::print_snapshot("expand", &coordinator.snapshot(), format)?;

    coordinator.pause_for_overlay().await?;
    coordinator.pause_for_overlay().await?;
    output::print_snapshot("overlay shown", &coordinator.snapshot(), format)?;
    sleep(Duration::from_millis(500)).await;
    coordinator.resume_after_overlay().await?;
    output::print_snapshot("overlay dismissed", &coordinator.snapshot(), format)?;

    coordinator.seek_forward().await?;
    sleep(Duration::from_millis(100)).await;
    output::print_snapshot("seek forward", &coordinator.snapshot(), format)?;

    let decision = coordinator
        .ingest_network_sample(NetworkSample::cellular().expensive())
        .await;
    tracing::info!(decision = ?decision, "Metered network sample");
    output::print_snapshot("network: metered", &coordinator.snapshot(), format)?;

    coordinator.set_low_power_mode(true).await;
    output::print_snapshot("low power", &coordinator.snapshot(), format)?;
    coordinator.set_low_power_mode(false).await;

    coordinator.close().await;
    output::print_snapshot("close", &coordinator.snapshot(), format)?;

    // Inline player handed off to the mini-player
    let inline = coordinator.create_session();
    inline.setup(episode.clone()).await?;
    sleep(Duration::from_millis(200)).await;
    inline.play().await?;
    sleep(Duration::from_secs(1)).await;
    coordinator.adopt(inline, episode, false).await?;
    output::print_snapshot("adopt", &coordinator.snapshot(), format)?;

    sleep(Duration::from_secs(1)).await;
    let drag = config.drag_dismiss_threshold / 2.0;
    coordinator.update_drag(drag).await;
    output::print_snapshot("dragging", &coordinator.snapshot(), format)?;
    coordinator.finish_drag(drag).await;
    output::print_snapshot("drag cancelled", &coordinator.snapshot(), format)?;

    let dismissed = coordinator.finish_drag(config.drag_dismiss_threshold + 40.0).await;
    output::print_snapshot(
        if dismissed { "drag dismissed" } else { "drag cancelled" },
        &coordinator.snapshot(),
        format,
    )?;

    tracing::info!(
        players = backend.players().len(),
        audible = backend.audible_players(),
        "Demo finished"
    );
    Ok(())
}

/// Play a simulated video for a number of seconds
#[allow(clippy::too_many_arguments)]
pub async fn play(
    config: PlaybackConfig,
    url: &str,
    duration: f64,
    seconds: u64,
    mode: &str,
    resume_file: Option<PathBuf>,
    low_power: bool,
    format: &str,
) -> anyhow::Result<()> {
    let mode = parse_mode(mode)?;
    if !duration.is_finite() || duration <= 0.0 {
        bail!("duration must be positive, got {}", duration);
    }

    let backend = Arc::new(SimulatedBackend::new(SimConfig {
        duration,
        ..Default::default()
    }));
    let telemetry = Arc::new(TelemetryEmitter::new());
    let mut collaborators = Collaborators::new(backend).with_telemetry(telemetry.clone());
    if let Some(path) = resume_file {
        let store = JsonFileResumeStore::open(&path)
            .with_context(|| format!("opening resume store {}", path.display()))?;
        collaborators = collaborators.with_resume_store(Arc::new(store));
    }

    let coordinator = SessionCoordinator::new(config, collaborators)?;
    let video = VideoRef::new(video_id(url), url).with_duration_hint(duration);
    if low_power {
        coordinator.set_low_power_mode(true).await;
    }
    coordinator.play_video(video, mode).await?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            while Instant::now() < deadline {
                ticker.tick().await;
                let snapshot = coordinator.snapshot();
                output::print_snapshot("tick", &snapshot, format)?;
                if snapshot.state.is_failed() {
                    break;
                }
            }
        }
        OutputFormat::Text | OutputFormat::Table => {
            let bar = ProgressBar::new(1000);
            bar.set_style(ProgressStyle::with_template("{spinner} [{bar:40}] {msg}")?.progress_chars("=> "));

            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            while Instant::now() < deadline {
                ticker.tick().await;
                let snapshot = coordinator.snapshot();
                bar.set_position((snapshot.progress * 1000.0) as u64);
                bar.set_message(output::describe(&snapshot));
                if snapshot.state.is_failed() {
                    break;
                }
            }
            bar.finish_with_message(output::describe(&coordinator.snapshot()));
        }
    }

    let last = coordinator.snapshot();
    coordinator.close().await;
    // Let the telemetry logger drain
    sleep(Duration::from_millis(10)).await;

    if last.state.is_failed() {
        bail!(
            "playback failed: {}",
            last.error_message.unwrap_or_else(|| last.state.to_string())
        );
    }

    if matches!(OutputFormat::from(format), OutputFormat::Json) {
        println!("{}", output::to_json(&telemetry.events())?);
    } else {
        println!("{} telemetry events recorded", telemetry.events().len());
    }
    Ok(())
}

/// Classify one network sample
pub fn classify(
    status: &str,
    interface: Option<&str>,
    expensive: bool,
    constrained: bool,
    format: &str,
) -> anyhow::Result<()> {
    let sample = NetworkSample {
        status: parse_status(status)?,
        is_expensive: expensive,
        is_constrained: constrained,
        interface: interface.map(parse_interface).transpose()?,
    };
    let speed = channel_player_core::classify(&sample);
    let tier = speed.recommended_tier();

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "sample": sample,
                "speed": speed,
                "recommended_tier": tier.label(),
                "bitrate": tier.bitrate(),
            });
            println!("{}", output::to_json(&report)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("Network classification:");
            println!("  Speed: {}", speed);
            println!("  Recommended tier: {} ({} bps)", tier, tier.bitrate());
        }
    }
    Ok(())
}

/// Print the tier ladder
pub fn tiers(format: &str) -> anyhow::Result<()> {
    const SPEEDS: [NetworkSpeed; 5] = [
        NetworkSpeed::Slow,
        NetworkSpeed::Moderate,
        NetworkSpeed::Fast,
        NetworkSpeed::Excellent,
        NetworkSpeed::Unknown,
    ];

    let rows: Vec<TierRow> = QualityTier::ALL
        .iter()
        .map(|tier| TierRow {
            tier: tier.label().to_string(),
            bitrate: tier.bitrate(),
            recommended_for: SPEEDS
                .iter()
                .filter(|speed| speed.recommended_tier() == *tier)
                .map(|speed| speed.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    println!("{}", output::format_rows(&rows, format)?);
    Ok(())
}

fn parse_mode(mode: &str) -> anyhow::Result<PresentationMode> {
    match mode.to_lowercase().as_str() {
        "embedded" => Ok(PresentationMode::Embedded),
        "mini-player" | "mini" | "miniplayer" => Ok(PresentationMode::MiniPlayer),
        "fullscreen" => Ok(PresentationMode::Fullscreen),
        other => bail!("unknown presentation mode '{}'", other),
    }
}

fn parse_status(status: &str) -> anyhow::Result<PathStatus> {
    match status.to_lowercase().as_str() {
        "satisfied" => Ok(PathStatus::Satisfied),
        "unsatisfied" => Ok(PathStatus::Unsatisfied),
        "requires-connection" => Ok(PathStatus::RequiresConnection),
        other => bail!("unknown path status '{}'", other),
    }
}

fn parse_interface(interface: &str) -> anyhow::Result<InterfaceType> {
    match interface.to_lowercase().as_str() {
        "wifi" => Ok(InterfaceType::Wifi),
        "cellular" => Ok(InterfaceType::Cellular),
        "wired" | "ethernet" => Ok(InterfaceType::WiredEthernet),
        "loopback" => Ok(InterfaceType::Loopback),
        "other" => Ok(InterfaceType::Other),
        other => bail!("unknown interface '{}'", other),
    }
}

/// Last non-empty path segment of a URL, or the URL itself
fn video_id(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("Fullscreen").unwrap(), PresentationMode::Fullscreen);
        assert_eq!(parse_mode("mini").unwrap(), PresentationMode::MiniPlayer);
        assert!(parse_mode("none").is_err());
    }

    #[test]
    fn test_parse_network_flags() {
        assert_eq!(parse_status("requires-connection").unwrap(), PathStatus::RequiresConnection);
        assert_eq!(parse_interface("ethernet").unwrap(), InterfaceType::WiredEthernet);
        assert!(parse_interface("bluetooth").is_err());
    }

    #[test]
    fn test_video_id() {
        assert_eq!(video_id("https://cdn.example.com/v1/master.m3u8"), "master.m3u8");
        assert_eq!(video_id("https://cdn.example.com/v1/"), "v1");
    }
}
