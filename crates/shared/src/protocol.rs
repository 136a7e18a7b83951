use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    AlertChannelId, AlertChannelKind, AutoPostId, AutoPostPlatform, ClipId, JobId, MomentId,
    PrivacyStatus, SubscriptionId, VideoId,
};

pub const DEFAULT_ASPECT_RATIO: &str = "9:16";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Reason maps occasionally carry non-numeric annotations; only the numeric
// signal contributions are kept.
fn numeric_signals<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(alias = "video_id")]
    pub id: VideoId,
    pub youtube_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    #[serde(rename = "segment_id")]
    pub id: MomentId,
    pub start: f64,
    pub end: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default, deserialize_with = "numeric_signals")]
    pub reason: BTreeMap<String, f64>,
}

impl Moment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleVariant {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricPoint {
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipMetrics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub youtube_timeseries: Vec<MetricPoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    #[serde(rename = "clip_id")]
    pub id: ClipId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub storage_url: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub metrics: Option<ClipMetrics>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style_variants: Vec<StyleVariant>,
}

impl Clip {
    /// A clip is ready once the renderer has stored its output file.
    pub fn is_ready(&self) -> bool {
        self.storage_url.is_some()
    }

    /// View count of the most recent metrics sample, if any.
    pub fn latest_views(&self) -> Option<u64> {
        self.metrics
            .as_ref()?
            .youtube_timeseries
            .last()
            .and_then(|point| point.views)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attempts: u32,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DependencyCheck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub queue_len: Option<u64>,
    #[serde(default)]
    pub media_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthChecks {
    #[serde(default)]
    pub db: DependencyCheck,
    #[serde(default)]
    pub redis: DependencyCheck,
    #[serde(default)]
    pub storage: DependencyCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub uptime_sec: u64,
    #[serde(default)]
    pub checks: HealthChecks,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardItem {
    pub clip_id: ClipId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub views_24h: u64,
    #[serde(default)]
    pub impressions_24h: u64,
    #[serde(default)]
    pub ctr_proxy: Option<f64>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub storage_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChannel {
    pub id: AlertChannelId,
    pub kind: AlertChannelKind,
    pub endpoint: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    pub queue_threshold: u32,
    pub debounce_min: u32,
    pub health_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            queue_threshold: 100,
            debounce_min: 10,
            health_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoPost {
    pub id: AutoPostId,
    pub platform: AutoPostPlatform,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub template: String,
    #[serde(default)]
    pub daily_time: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub id: SubscriptionId,
    pub channel_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_published_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_render_top_k: u32,
    #[serde(default)]
    pub daily_post_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
}

/// Generic acknowledgement returned by fire-and-forget endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ack(pub Map<String, Value>);

impl Ack {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

// Request bodies.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVideoRequest {
    pub youtube_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub segment_ids: Vec<MomentId>,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishYouTubeRequest {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTikTokRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    pub title: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbThumbnailsRequest {
    pub title_a: String,
    pub title_b: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestToggleRequest {
    pub start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStyleVariantRequest {
    pub key: String,
    pub set_on_youtube: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeChannelRequest {
    pub channel_id: String,
    pub auto_render_top_k: u32,
    pub daily_post_time: String,
    pub keywords: Vec<String>,
}

impl SubscribeChannelRequest {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            auto_render_top_k: 3,
            daily_post_time: "08:00".to_string(),
            keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJobRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannelRequest {
    pub kind: AlertChannelKind,
    pub endpoint: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoPostRequest {
    pub platform: AutoPostPlatform,
    pub endpoint: Option<String>,
    pub template: String,
    pub daily_time: String,
    pub enabled: bool,
}

// Response envelopes.

#[derive(Debug, Clone, Deserialize)]
pub struct VideoList {
    #[serde(default)]
    pub videos: Vec<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVideoResponse {
    pub video_id: VideoId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MomentList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub moments: Vec<Moment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleSuggestions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderResponse {
    #[serde(default)]
    pub clip_ids: Vec<ClipId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlResponse {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertChannelList {
    #[serde(default)]
    pub channels: Vec<AlertChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Leaderboard {
    #[serde(default)]
    pub items: Vec<LeaderboardItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoPostList {
    #[serde(default)]
    pub autoposts: Vec<AutoPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSubscriptionList {
    #[serde(default)]
    pub channels: Vec<ChannelSubscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncAllResponse {
    #[serde(default)]
    pub queued: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse<I> {
    pub id: I,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_detail_decodes_video_id_alias() {
        let video: Video = serde_json::from_str(
            r#"{"video_id":"v1","youtube_url":"https://youtu.be/x","status":"queued","created_at":"2024-05-01T12:30:00.123456"}"#,
        )
        .expect("decode");
        assert_eq!(video.id, VideoId::new("v1"));
        assert!(video.created_at.is_some());
    }

    #[test]
    fn moment_tolerates_null_score_and_reason() {
        let moment: Moment = serde_json::from_str(
            r#"{"segment_id":"s1","start":1.5,"end":9.0,"score":null,"reason":null}"#,
        )
        .expect("decode");
        assert_eq!(moment.score, 0.0);
        assert!(moment.reason.is_empty());
        assert_eq!(moment.duration(), 7.5);
    }

    #[test]
    fn moment_reason_keeps_numeric_signals_only() {
        let moment: Moment = serde_json::from_str(
            r#"{"segment_id":"s1","start":0,"end":1,"score":0.8,"reason":{"hook":0.4,"note":"loud","energy":1}}"#,
        )
        .expect("decode");
        assert_eq!(moment.reason.len(), 2);
        assert_eq!(moment.reason.get("energy"), Some(&1.0));
    }

    #[test]
    fn clip_latest_views_reads_last_sample() {
        let clip: Clip = serde_json::from_str(
            r#"{"clip_id":"c1","status":"done","storage_url":"/media/c1.mp4",
                "metrics":{"youtube_timeseries":[{"views":3,"ts":"a"},{"views":11,"ts":"b"}],"youtube":{"videoId":"y"}},
                "style_variants":null}"#,
        )
        .expect("decode");
        assert!(clip.is_ready());
        assert_eq!(clip.latest_views(), Some(11));
        assert!(clip.style_variants.is_empty());
    }

    #[test]
    fn publish_request_uses_camel_case_privacy_field() {
        let body = serde_json::to_value(PublishYouTubeRequest {
            title: "t".into(),
            description: String::new(),
            tags: vec!["a".into()],
            privacy_status: PrivacyStatus::default(),
        })
        .expect("encode");
        assert_eq!(body["privacyStatus"], "unlisted");
    }
}
