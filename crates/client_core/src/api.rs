use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{AlertChannelId, AutoPostId, ClipId, JobId, MomentId, SubscriptionId, VideoId},
    protocol::{
        AbTestToggleRequest, AbThumbnailsRequest, Ack, AlertChannel, AlertChannelList,
        AlertChannelRequest, AlertSettings, AutoPost, AutoPostList, AutoPostRequest, Clip,
        ClipList, ChannelSubscription, ChannelSubscriptionList, CreateVideoRequest,
        CreateVideoResponse, CreatedResponse, HealthReport, Job, JobList, Leaderboard,
        LeaderboardItem, Moment, MomentList, PublishTikTokRequest, PublishYouTubeRequest,
        RenderRequest, RenderResponse, RetryJobRequest, SetStyleVariantRequest,
        SignedUrlResponse, SubscribeChannelRequest, SyncAllResponse, ThumbnailRequest,
        TitleSuggestions, Video, VideoList,
    },
};

use crate::{
    config::ClientSettings,
    error::{ClientError, ClientResult},
    transport::Transport,
};

/// Endpoints the view controller depends on.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn list_videos(&self) -> ClientResult<Vec<Video>>;
    async fn create_video(&self, youtube_url: &str) -> ClientResult<VideoId>;
    async fn get_video(&self, video_id: &VideoId) -> ClientResult<Video>;
    async fn list_moments(&self, video_id: &VideoId, limit: u32) -> ClientResult<Vec<Moment>>;
    async fn suggest_titles(&self, video_id: &VideoId, use_llm: bool) -> ClientResult<Vec<String>>;
    async fn render_clips(
        &self,
        video_id: &VideoId,
        segment_ids: &[MomentId],
        aspect_ratio: &str,
    ) -> ClientResult<Vec<ClipId>>;
    async fn list_clips_for_video(&self, video_id: &VideoId) -> ClientResult<Vec<Clip>>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    aspect_ratio: String,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings) -> ClientResult<Self> {
        Ok(Self {
            transport: Transport::new(settings)?,
            aspect_ratio: settings.aspect_ratio.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url().as_str()
    }

    /// Resolves a server-relative asset path (clip file, thumbnail, style
    /// variant) against the API base url. Absolute urls pass through.
    pub fn asset_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub async fn get_clip(&self, clip_id: &ClipId) -> ClientResult<Clip> {
        self.transport.get(&["clips", clip_id.as_str()]).await
    }

    pub async fn signed_url(&self, clip_id: &ClipId) -> ClientResult<String> {
        let response: SignedUrlResponse = self
            .transport
            .get(&["clips", clip_id.as_str(), "signed_url"])
            .await?;
        response
            .url
            .map(|url| self.asset_url(&url))
            .ok_or_else(|| ClientError::Decode(format!("clip {clip_id} has no downloadable file yet")))
    }

    pub async fn publish_to_youtube(
        &self,
        clip_id: &ClipId,
        request: &PublishYouTubeRequest,
    ) -> ClientResult<Ack> {
        self.transport
            .post(&["clips", clip_id.as_str(), "publish", "youtube"], request)
            .await
    }

    pub async fn publish_to_tiktok(&self, clip_id: &ClipId, title: &str) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "publish", "tiktok"],
                &PublishTikTokRequest {
                    title: title.to_string(),
                },
            )
            .await
    }

    pub async fn make_thumbnail(&self, clip_id: &ClipId, title: &str) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "thumbnail"],
                &ThumbnailRequest {
                    title: title.to_string(),
                    aspect_ratio: self.aspect_ratio.clone(),
                },
            )
            .await
    }

    pub async fn make_ab_thumbnails(
        &self,
        clip_id: &ClipId,
        title_a: &str,
        title_b: &str,
    ) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "thumbnails", "ab"],
                &AbThumbnailsRequest {
                    title_a: title_a.to_string(),
                    title_b: title_b.to_string(),
                    aspect_ratio: self.aspect_ratio.clone(),
                },
            )
            .await
    }

    pub async fn set_ab_test(&self, clip_id: &ClipId, start: bool) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "thumbnails", "ab", "start"],
                &AbTestToggleRequest { start },
            )
            .await
    }

    pub async fn make_style_pack(&self, clip_id: &ClipId, title: &str) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "thumbnails", "styles"],
                &ThumbnailRequest {
                    title: title.to_string(),
                    aspect_ratio: self.aspect_ratio.clone(),
                },
            )
            .await
    }

    pub async fn set_style_variant(
        &self,
        clip_id: &ClipId,
        key: &str,
        set_on_youtube: bool,
    ) -> ClientResult<Ack> {
        self.transport
            .post(
                &["clips", clip_id.as_str(), "thumbnails", "set"],
                &SetStyleVariantRequest {
                    key: key.to_string(),
                    set_on_youtube,
                },
            )
            .await
    }

    pub async fn subscribe_channel(
        &self,
        request: &SubscribeChannelRequest,
    ) -> ClientResult<SubscriptionId> {
        if request.channel_id.trim().is_empty() {
            return Err(ClientError::validation("channel id is required"));
        }
        let created: CreatedResponse<SubscriptionId> =
            self.transport.post(&["channels", "subscribe"], request).await?;
        Ok(created.id)
    }

    pub async fn list_channels(&self) -> ClientResult<Vec<ChannelSubscription>> {
        let list: ChannelSubscriptionList = self.transport.get(&["channels"]).await?;
        Ok(list.channels)
    }

    /// Queues a sync for every subscribed channel; returns how many were queued.
    pub async fn sync_all_channels(&self) -> ClientResult<u64> {
        let response: SyncAllResponse = self.transport.post_empty(&["channels", "sync_all"]).await?;
        Ok(response.queued)
    }

    pub async fn list_failed_jobs(&self, limit: u32) -> ClientResult<Vec<Job>> {
        let list: JobList = self
            .transport
            .get_with_query(&["admin", "jobs"], &[("status", "error".to_string()), ("limit", limit.to_string())])
            .await?;
        Ok(list.jobs)
    }

    pub async fn retry_job(&self, job_id: &JobId) -> ClientResult<Ack> {
        self.transport
            .post(
                &["admin", "jobs", job_id.as_str(), "retry"],
                &RetryJobRequest {
                    overwrite_type: None,
                },
            )
            .await
    }

    pub async fn delete_job(&self, job_id: &JobId) -> ClientResult<Ack> {
        self.transport.delete(&["admin", "jobs", job_id.as_str()]).await
    }

    pub async fn health(&self) -> ClientResult<HealthReport> {
        self.transport.get(&["health"]).await
    }

    pub async fn add_alert_channel(&self, request: &AlertChannelRequest) -> ClientResult<AlertChannelId> {
        if request.endpoint.trim().is_empty() {
            return Err(ClientError::validation("alert endpoint is required"));
        }
        let created: CreatedResponse<AlertChannelId> =
            self.transport.post(&["alerts", "channels"], request).await?;
        Ok(created.id)
    }

    pub async fn list_alert_channels(&self) -> ClientResult<Vec<AlertChannel>> {
        let list: AlertChannelList = self.transport.get(&["alerts", "channels"]).await?;
        Ok(list.channels)
    }

    pub async fn alert_settings(&self) -> ClientResult<AlertSettings> {
        self.transport.get(&["alerts", "settings"]).await
    }

    pub async fn set_alert_settings(&self, settings: &AlertSettings) -> ClientResult<Ack> {
        self.transport.post(&["alerts", "settings"], settings).await
    }

    pub async fn send_alert_test(&self) -> ClientResult<Ack> {
        self.transport.post_empty(&["alerts", "test"]).await
    }

    pub async fn leaderboard(&self, limit: u32) -> ClientResult<Vec<LeaderboardItem>> {
        let board: Leaderboard = self
            .transport
            .get_with_query(&["analytics", "leaderboard"], &[("limit", limit)])
            .await?;
        Ok(board.items)
    }

    pub async fn create_autopost(&self, request: &AutoPostRequest) -> ClientResult<AutoPostId> {
        let missing_endpoint = request
            .endpoint
            .as_deref()
            .map(|endpoint| endpoint.trim().is_empty())
            .unwrap_or(true);
        if missing_endpoint {
            return Err(ClientError::validation("autopost destination is required"));
        }
        let created: CreatedResponse<AutoPostId> = self.transport.post(&["autoposts"], request).await?;
        Ok(created.id)
    }

    pub async fn list_autoposts(&self) -> ClientResult<Vec<AutoPost>> {
        let list: AutoPostList = self.transport.get(&["autoposts"]).await?;
        Ok(list.autoposts)
    }

    pub async fn run_autopost_now(&self, autopost_id: &AutoPostId) -> ClientResult<Ack> {
        self.transport
            .post_empty(&["autoposts", autopost_id.as_str(), "run_now"])
            .await
    }
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn list_videos(&self) -> ClientResult<Vec<Video>> {
        let list: VideoList = self.transport.get(&["videos"]).await?;
        Ok(list.videos)
    }

    async fn create_video(&self, youtube_url: &str) -> ClientResult<VideoId> {
        let created: CreateVideoResponse = self
            .transport
            .post(
                &["videos"],
                &CreateVideoRequest {
                    youtube_url: youtube_url.to_string(),
                },
            )
            .await?;
        Ok(created.video_id)
    }

    async fn get_video(&self, video_id: &VideoId) -> ClientResult<Video> {
        self.transport.get(&["videos", video_id.as_str()]).await
    }

    async fn list_moments(&self, video_id: &VideoId, limit: u32) -> ClientResult<Vec<Moment>> {
        let list: MomentList = self
            .transport
            .get_with_query(&["videos", video_id.as_str(), "moments"], &[("limit", limit)])
            .await?;
        Ok(list.moments)
    }

    async fn suggest_titles(&self, video_id: &VideoId, use_llm: bool) -> ClientResult<Vec<String>> {
        let response: TitleSuggestions = self
            .transport
            .post(&["videos", video_id.as_str(), "titles"], &json!(use_llm))
            .await?;
        Ok(response.suggestions)
    }

    async fn render_clips(
        &self,
        video_id: &VideoId,
        segment_ids: &[MomentId],
        aspect_ratio: &str,
    ) -> ClientResult<Vec<ClipId>> {
        let response: RenderResponse = self
            .transport
            .post(
                &["clips", video_id.as_str(), "render"],
                &RenderRequest {
                    segment_ids: segment_ids.to_vec(),
                    aspect_ratio: aspect_ratio.to_string(),
                },
            )
            .await?;
        Ok(response.clip_ids)
    }

    async fn list_clips_for_video(&self, video_id: &VideoId) -> ClientResult<Vec<Clip>> {
        let list: ClipList = self
            .transport
            .get(&["clips", "video", video_id.as_str()])
            .await?;
        Ok(list.clips)
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
