//! Output formatting for CLI

use channel_player_core::{format_timestamp, CoordinatorSnapshot, PlaybackState};
use console::style;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// One row of the tier ladder
#[derive(Tabled, Serialize)]
pub struct TierRow {
    #[tabled(rename = "Tier")]
    pub tier: String,
    #[tabled(rename = "Bitrate (bps)")]
    pub bitrate: u64,
    #[tabled(rename = "Recommended for")]
    pub recommended_for: String,
}

/// Render rows as JSON or a table
pub fn format_rows<T: Tabled + Serialize>(rows: &[T], format: &str) -> anyhow::Result<String> {
    match OutputFormat::from(format) {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
        OutputFormat::Table | OutputFormat::Text => Ok(Table::new(rows).to_string()),
    }
}

/// Render a value as pretty JSON
pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Print a coordinator snapshot after `step`
pub fn print_snapshot(step: &str, snapshot: &CoordinatorSnapshot, format: &str) -> anyhow::Result<()> {
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Step<'a> {
                step: &'a str,
                #[serde(flatten)]
                snapshot: &'a CoordinatorSnapshot,
            }
            println!("{}", serde_json::to_string(&Step { step, snapshot })?);
        }
        OutputFormat::Table | OutputFormat::Text => {
            println!("{:<22} {}", style(step).bold(), describe(snapshot));
        }
    }
    Ok(())
}

/// One-line human readable summary
pub fn describe(snapshot: &CoordinatorSnapshot) -> String {
    let video = snapshot
        .video
        .as_ref()
        .map(|v| v.title.clone().unwrap_or_else(|| v.id.clone()))
        .unwrap_or_else(|| "-".to_string());

    let mut flags = Vec::new();
    if snapshot.is_buffering {
        flags.push("buffering");
    }
    if snapshot.is_transitioning {
        flags.push("transitioning");
    }
    if snapshot.paused_by_overlay {
        flags.push("overlay");
    }
    if !snapshot.adaptive_enabled {
        flags.push("manual-quality");
    }
    if snapshot.low_power_mode {
        flags.push("low-power");
    }
    let rendered = snapshot
        .rendered_quality
        .map(|tier| format!(" rendering={}", tier))
        .unwrap_or_default();
    let drag = if snapshot.drag_offset > 0.0 {
        format!(" drag={:.0}", snapshot.drag_offset)
    } else {
        String::new()
    };

    format!(
        "{} {} {} ({:.0}%) mode={} quality={}{} network={} buffer={:.0}%{}{}",
        video,
        state_label(snapshot.state),
        format_timestamp(snapshot.current_time),
        snapshot.progress * 100.0,
        snapshot.presentation_mode,
        snapshot.quality,
        rendered,
        snapshot.network_speed,
        snapshot.buffer_health * 100.0,
        drag,
        if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        }
    )
}

fn state_label(state: PlaybackState) -> String {
    let label = state.to_string();
    match state {
        PlaybackState::Playing => style(label).green().to_string(),
        PlaybackState::Buffering | PlaybackState::Loading => style(label).yellow().to_string(),
        PlaybackState::Failed(_) => style(label).red().to_string(),
        _ => style(label).dim().to_string(),
    }
}
