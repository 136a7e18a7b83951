//! Plain-text rendering of backend entities for terminal output.

use client_core::{ApiClient, EmbedId, SyncEvent};
use shared::{
    media::{format_timecode, watch_link_at},
    protocol::{
        AlertChannel, AutoPost, ChannelSubscription, Clip, HealthReport, Job, LeaderboardItem,
        Moment, Video,
    },
};

pub fn video_line(video: &Video) -> String {
    let created = video
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<10} {:<12} {created}  {}",
        video.id.short(),
        display_status(&video.status),
        video.youtube_url
    )
}

pub fn embed_line(embed: Option<&EmbedId>) -> String {
    match embed {
        Some(embed) => format!("player: {}", embed.player_url()),
        None => "player: no embed available".to_string(),
    }
}

/// One moment with its time range, score and a deep link into the source.
pub fn moment_line(moment: &Moment, source_url: Option<&str>) -> String {
    let mut line = format!(
        "{}  {} - {}  score={:.2}",
        moment.id,
        format_timecode(moment.start),
        format_timecode(moment.end),
        moment.score
    );
    if !moment.reason.is_empty() {
        let signals: Vec<String> = moment
            .reason
            .iter()
            .map(|(signal, weight)| format!("{signal}={weight:.2}"))
            .collect();
        line.push_str(&format!("  [{}]", signals.join(" ")));
    }
    if let Some(source_url) = source_url {
        line.push_str(&format!("  {}", watch_link_at(source_url, moment.start)));
    }
    line
}

pub fn clip_line(clip: &Clip, api: &ApiClient) -> String {
    let mut line = format!("{}  {}", clip.id, display_status(&clip.status));
    if let Some(views) = clip.latest_views() {
        line.push_str(&format!("  views={views}"));
    }
    if let Some(path) = &clip.storage_url {
        line.push_str(&format!("  {}", api.asset_url(path)));
    }
    if let Some(thumbnail) = &clip.thumbnail_url {
        line.push_str(&format!("  thumb={}", api.asset_url(thumbnail)));
    }
    for variant in &clip.style_variants {
        line.push_str(&format!("\n    style {}: {}", variant.key, api.asset_url(&variant.url)));
    }
    line
}

pub fn job_line(job: &Job) -> String {
    format!(
        "{}  {:<10} status={} attempts={}  {}",
        job.id,
        job.job_type,
        job.status.as_deref().unwrap_or("-"),
        job.attempts,
        job.error.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

pub fn health_lines(report: &HealthReport) -> Vec<String> {
    let checks = &report.checks;
    let mut lines = vec![format!("status={} uptime={}s", report.status, report.uptime_sec)];
    for (name, check) in [("db", &checks.db), ("redis", &checks.redis), ("storage", &checks.storage)] {
        let mut line = format!("  {name:<8} {}", if check.ok { "ok" } else { "FAIL" });
        if let Some(queue_len) = check.queue_len {
            line.push_str(&format!(" queue_len={queue_len}"));
        }
        if let Some(error) = &check.error {
            line.push_str(&format!(" error={error}"));
        }
        lines.push(line);
    }
    lines
}

pub fn leaderboard_line(rank: usize, item: &LeaderboardItem) -> String {
    let ctr = item
        .ctr_proxy
        .map(|ctr| format!("{:.1}%", ctr * 100.0))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{rank:<3} {}  views_24h={} impressions_24h={} ctr={ctr}  {}",
        item.clip_id, item.views_24h, item.impressions_24h, item.title
    )
}

pub fn alert_channel_line(channel: &AlertChannel) -> String {
    format!(
        "{}  {:?}  {}  {}",
        channel.id,
        channel.kind,
        channel.endpoint,
        if channel.enabled { "enabled" } else { "disabled" }
    )
}

pub fn subscription_line(subscription: &ChannelSubscription) -> String {
    format!(
        "{}  {}  top_k={} daily={} keywords={}",
        subscription.channel_id,
        subscription.title.as_deref().unwrap_or("-"),
        subscription.auto_render_top_k,
        subscription.daily_post_time.as_deref().unwrap_or("-"),
        subscription.keywords.join(",")
    )
}

pub fn autopost_line(autopost: &AutoPost) -> String {
    format!(
        "{}  {:?}  daily={} {}  {}",
        autopost.id,
        autopost.platform,
        autopost.daily_time.as_deref().unwrap_or("-"),
        if autopost.enabled { "enabled" } else { "disabled" },
        autopost.endpoint.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

pub fn event_line(event: &SyncEvent) -> String {
    match event {
        SyncEvent::VideosUpdated { count } => format!("videos: {count} listed"),
        SyncEvent::SelectionChanged(Some(video_id)) => format!("selected: {video_id}"),
        SyncEvent::SelectionChanged(None) => "selected: none".to_string(),
        SyncEvent::VideoDetailUpdated { video_id, embed } => {
            format!("detail: {video_id}  {}", embed_line(embed.as_ref()))
        }
        SyncEvent::MomentsUpdated { video_id, count } => {
            format!("moments: {count} for {video_id}")
        }
        SyncEvent::ClipsUpdated { video_id, count } => format!("clips: {count} for {video_id}"),
        SyncEvent::RenderQueued { video_id, clip_ids } => {
            format!("render: queued {} clip(s) for {video_id}", clip_ids.len())
        }
        SyncEvent::OperationFailed { operation, message } => {
            format!("error: {operation:?} failed: {message}")
        }
    }
}

fn display_status(status: &str) -> &str {
    if status.is_empty() {
        "unknown"
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use client_core::Operation;
    use shared::domain::{JobId, MomentId, VideoId};

    use super::*;

    #[test]
    fn moment_line_includes_timecodes_and_deep_link() {
        let moment = Moment {
            id: MomentId::new("seg-1"),
            start: 75.4,
            end: 3_725.0,
            score: 0.9,
            reason: BTreeMap::from([("laughter".to_string(), 0.5)]),
        };
        assert_eq!(
            moment_line(&moment, Some("https://www.youtube.com/watch?v=abc")),
            "seg-1  01:15 - 01:02:05  score=0.90  [laughter=0.50]  https://www.youtube.com/watch?v=abc&t=75s"
        );
    }

    #[test]
    fn job_line_omits_missing_fields() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "job-9",
            "type": "render",
            "status": "error",
            "attempts": 3
        }))
        .expect("job");
        assert_eq!(job.id, JobId::new("job-9"));
        assert_eq!(job_line(&job), "job-9  render     status=error attempts=3");
    }

    #[test]
    fn events_render_as_single_lines() {
        assert_eq!(
            event_line(&SyncEvent::SelectionChanged(Some(VideoId::new("v1")))),
            "selected: v1"
        );
        assert_eq!(
            event_line(&SyncEvent::VideoDetailUpdated {
                video_id: VideoId::new("v1"),
                embed: None,
            }),
            "detail: v1  player: no embed available"
        );
        assert_eq!(
            event_line(&SyncEvent::OperationFailed {
                operation: Operation::RefreshMoments,
                message: "HTTP 503: down".to_string(),
            }),
            "error: RefreshMoments failed: HTTP 503: down"
        );
    }

    #[test]
    fn health_lines_flag_failing_dependencies() {
        let report: HealthReport = serde_json::from_value(serde_json::json!({
            "status": "degraded",
            "uptime_sec": 42,
            "checks": {
                "db": {"ok": true},
                "redis": {"ok": false, "error": "connection refused"},
                "storage": {"ok": true, "media_root": "/data"}
            }
        }))
        .expect("health");
        assert_eq!(
            health_lines(&report),
            vec![
                "status=degraded uptime=42s".to_string(),
                "  db       ok".to_string(),
                "  redis    FAIL error=connection refused".to_string(),
                "  storage  ok".to_string(),
            ]
        );
    }
}
