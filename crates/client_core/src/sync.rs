//! Keeps the selected video's moments, clips and detail consistent with a
//! backend whose pipeline advances on its own schedule.
//!
//! Every fetch is issued under a [`RequestTicket`]. A ticket is only allowed
//! to write state while it is both the newest request for its resource and
//! belongs to the current selection generation; anything else is dropped.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex as StdMutex, PoisonError, Weak},
    time::Duration,
};

use shared::{
    domain::{ClipId, MomentId, VideoId},
    protocol::{Clip, Moment, Video, DEFAULT_ASPECT_RATIO},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::DashboardApi,
    config::ClientSettings,
    embed::{derive_embed_id, EmbedId},
    error::{ClientError, ClientResult},
};

const EVENT_CAPACITY: usize = 256;
const MAX_BACKOFF_SHIFT: u32 = 16;
const CREATE_SCOPE: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Videos,
    VideoDetail,
    Moments,
    Clips,
}

impl Resource {
    /// Scoped resources belong to the selected video and die with it.
    fn is_scoped(self) -> bool {
        !matches!(self, Resource::Videos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestTicket {
    resource: Resource,
    generation: u64,
    sequence: u64,
}

/// Whether a completed fetch was written into the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RefreshVideos,
    CreateVideo,
    SelectVideo,
    RefreshMoments,
    RefreshClips,
    Render,
    SuggestTitles,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    VideosUpdated {
        count: usize,
    },
    SelectionChanged(Option<VideoId>),
    VideoDetailUpdated {
        video_id: VideoId,
        embed: Option<EmbedId>,
    },
    MomentsUpdated {
        video_id: VideoId,
        count: usize,
    },
    ClipsUpdated {
        video_id: VideoId,
        count: usize,
    },
    RenderQueued {
        video_id: VideoId,
        clip_ids: Vec<ClipId>,
    },
    OperationFailed {
        operation: Operation,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub poll_backoff_max: Duration,
    pub moments_limit: u32,
    pub aspect_ratio: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for SyncOptions {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            poll_backoff_max: settings.poll_backoff_max,
            moments_limit: settings.moments_limit,
            aspect_ratio: if settings.aspect_ratio.is_empty() {
                DEFAULT_ASPECT_RATIO.to_string()
            } else {
                settings.aspect_ratio.clone()
            },
        }
    }
}

/// Read-only copy of everything a view renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub selected: Option<VideoId>,
    pub videos: Vec<Video>,
    pub video: Option<Video>,
    pub embed: Option<EmbedId>,
    pub moments: Vec<Moment>,
    pub clips: Vec<Clip>,
    pub selection: BTreeSet<MomentId>,
    pub loading_moments: bool,
    pub rendering: bool,
    pub creating: bool,
}

#[derive(Default)]
struct SyncState {
    generation: u64,
    next_sequence: u64,
    latest: HashMap<Resource, u64>,
    in_flight: HashMap<Resource, u64>,
    closed: bool,
    selected: Option<VideoId>,
    videos: Vec<Video>,
    video: Option<Video>,
    embed: Option<EmbedId>,
    moments: Vec<Moment>,
    clips: Vec<Clip>,
    selection: BTreeSet<MomentId>,
}

impl SyncState {
    fn begin(&mut self, resource: Resource) -> RequestTicket {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.latest.insert(resource, sequence);
        self.in_flight.insert(resource, sequence);
        RequestTicket {
            resource,
            generation: self.generation,
            sequence,
        }
    }

    fn is_current(&self, ticket: RequestTicket) -> bool {
        if ticket.resource.is_scoped() && ticket.generation != self.generation {
            return false;
        }
        self.latest.get(&ticket.resource) == Some(&ticket.sequence)
    }

    /// Marks the request finished; true when its result may be applied.
    fn settle(&mut self, ticket: RequestTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.in_flight.remove(&ticket.resource);
        true
    }

    fn is_pending(&self, resource: Resource) -> bool {
        self.in_flight.contains_key(&resource)
    }

    /// Starts a new selection scope: outstanding scoped tickets become stale
    /// and every collection derived from the old selection is dropped.
    fn reset_scope(&mut self, selected: Option<VideoId>) -> u64 {
        self.generation += 1;
        self.latest.retain(|resource, _| !resource.is_scoped());
        self.in_flight.retain(|resource, _| !resource.is_scoped());
        self.selected = selected;
        self.video = None;
        self.embed = None;
        self.moments.clear();
        self.clips.clear();
        self.selection.clear();
        self.generation
    }

    fn require_selected(&self, video_id: &VideoId) -> ClientResult<u64> {
        if self.closed {
            return Err(ClientError::validation("view controller has been shut down"));
        }
        match &self.selected {
            Some(selected) if selected == video_id => Ok(self.generation),
            _ => Err(ClientError::validation(format!(
                "video {video_id} is not the selected video"
            ))),
        }
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            selected: self.selected.clone(),
            videos: self.videos.clone(),
            video: self.video.clone(),
            embed: self.embed.clone(),
            moments: self.moments.clone(),
            clips: self.clips.clone(),
            selection: self.selection.clone(),
            loading_moments: self.is_pending(Resource::Moments),
            rendering: false,
            creating: false,
        }
    }
}

/// Single-flight marker for a user action, tagged with the scope that took it.
///
/// The marker is owned by a [`PendingClaim`] and released when the claim
/// drops, so a caller that abandons the future never leaves the action
/// blocked.
#[derive(Default)]
struct PendingSlot {
    held: StdMutex<Option<u64>>,
}

impl PendingSlot {
    /// Fails while another claim for the same scope is alive. A claim left
    /// over from an older scope is taken over.
    fn claim(&self, scope: u64) -> Option<PendingClaim<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held == Some(scope) {
            return None;
        }
        *held = Some(scope);
        Some(PendingClaim { slot: self, scope })
    }

    fn is_held_for(&self, scope: u64) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) == Some(scope)
    }
}

struct PendingClaim<'a> {
    slot: &'a PendingSlot,
    scope: u64,
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        let mut held = self.slot.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held == Some(self.scope) {
            *held = None;
        }
    }
}

struct ClipPoller {
    video_id: VideoId,
    generation: u64,
    task: JoinHandle<()>,
}

pub struct ViewSyncController {
    api: Arc<dyn DashboardApi>,
    options: SyncOptions,
    state: Mutex<SyncState>,
    poller: Mutex<Option<ClipPoller>>,
    creating: PendingSlot,
    rendering: PendingSlot,
    events: broadcast::Sender<SyncEvent>,
}

impl ViewSyncController {
    pub fn new(api: Arc<dyn DashboardApi>, options: SyncOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            api,
            options,
            state: Mutex::new(SyncState::default()),
            poller: Mutex::new(None),
            creating: PendingSlot::default(),
            rendering: PendingSlot::default(),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let state = self.state.lock().await;
        let mut snapshot = state.snapshot();
        snapshot.rendering = self.rendering.is_held_for(state.generation);
        snapshot.creating = self.creating.is_held_for(CREATE_SCOPE);
        snapshot
    }

    pub async fn selected(&self) -> Option<VideoId> {
        self.state.lock().await.selected.clone()
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .map(|poller| !poller.task.is_finished())
            .unwrap_or(false)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    fn report<T>(&self, operation: Operation, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(err) = &result {
            warn!("sync: {operation:?} failed: {err}");
            self.emit(SyncEvent::OperationFailed {
                operation,
                message: err.to_string(),
            });
        }
        result
    }

    /// Reloads the video list. With nothing selected yet, the newest video
    /// becomes the selection.
    pub async fn refresh_videos(self: &Arc<Self>) -> ClientResult<Vec<Video>> {
        self.load_videos(true).await
    }

    /// A response overtaken by a newer list request yields the list that is
    /// currently applied, whether it succeeded or not.
    async fn load_videos(self: &Arc<Self>, auto_select: bool) -> ClientResult<Vec<Video>> {
        let ticket = self.state.lock().await.begin(Resource::Videos);
        let result = self.api.list_videos().await;

        let auto_select = {
            let mut state = self.state.lock().await;
            if !state.settle(ticket) {
                debug!("sync: dropped superseded video list response");
                return Ok(state.videos.clone());
            }
            match &result {
                Ok(videos) => {
                    state.videos = videos.clone();
                    if auto_select && state.selected.is_none() && !state.closed {
                        videos.first().map(|video| video.id.clone())
                    } else {
                        None
                    }
                }
                Err(_) => None,
            }
        };

        let videos = self.report(Operation::RefreshVideos, result)?;
        self.emit(SyncEvent::VideosUpdated {
            count: videos.len(),
        });

        if let Some(first) = auto_select {
            // Failures are already reported by select_video itself.
            let _ = self.select_video(first).await;
        }
        Ok(videos)
    }

    /// Queues ingest for a source url, reloads the list and selects the new
    /// video.
    pub async fn create_video(self: &Arc<Self>, youtube_url: &str) -> ClientResult<VideoId> {
        let youtube_url = youtube_url.trim();
        if youtube_url.is_empty() {
            return self.report(
                Operation::CreateVideo,
                Err(ClientError::validation("a source video url is required")),
            );
        }

        let Some(claim) = self.creating.claim(CREATE_SCOPE) else {
            return self.report(
                Operation::CreateVideo,
                Err(ClientError::validation("a video is already being queued")),
            );
        };
        let created = self.api.create_video(youtube_url).await;
        drop(claim);
        let video_id = self.report(Operation::CreateVideo, created)?;
        info!("sync: queued ingest video={video_id}");

        // The new video is selected explicitly below; auto-selecting from the
        // refreshed list would select it twice.
        if let Err(err) = self.load_videos(false).await {
            debug!("sync: video list refresh after create failed: {err}");
        }
        let _ = self.select_video(video_id.clone()).await;
        Ok(video_id)
    }

    /// Makes `video_id` the active selection, drops everything scoped to the
    /// previous one, fetches moments and detail, and restarts clip polling.
    pub async fn select_video(self: &Arc<Self>, video_id: VideoId) -> ClientResult<()> {
        let (generation, moments_ticket, detail_ticket) = {
            let mut state = self.state.lock().await;
            if state.closed {
                return self.report(
                    Operation::SelectVideo,
                    Err(ClientError::validation("view controller has been shut down")),
                );
            }
            let generation = state.reset_scope(Some(video_id.clone()));
            let moments_ticket = state.begin(Resource::Moments);
            let detail_ticket = state.begin(Resource::VideoDetail);
            (generation, moments_ticket, detail_ticket)
        };
        info!("sync: selected video={video_id} generation={generation}");
        self.emit(SyncEvent::SelectionChanged(Some(video_id.clone())));

        self.spawn_clip_poller(video_id.clone(), generation).await;

        let limit = self.options.moments_limit;
        let (moments, detail) = tokio::join!(
            self.api.list_moments(&video_id, limit),
            self.api.get_video(&video_id)
        );

        let moments = self.apply_moments(moments_ticket, &video_id, moments).await;
        let detail = self.apply_detail(detail_ticket, &video_id, detail).await;
        let moments = self.report(Operation::SelectVideo, moments);
        let detail = self.report(Operation::SelectVideo, detail);
        moments?;
        detail?;
        Ok(())
    }

    /// Clears the selection, stopping the poll and invalidating every
    /// outstanding scoped request.
    pub async fn deselect(&self) {
        self.stop_polling().await;
        let changed = {
            let mut state = self.state.lock().await;
            let changed = state.selected.is_some();
            state.reset_scope(None);
            changed
        };
        if changed {
            self.emit(SyncEvent::SelectionChanged(None));
        }
    }

    /// Tears the controller down. No state changes after this returns.
    pub async fn shutdown(&self) {
        self.state.lock().await.closed = true;
        self.deselect().await;
        info!("sync: controller shut down");
    }

    /// Fetches moments again for the selected video, replacing the whole
    /// collection with the newest response.
    pub async fn refresh_moments(
        &self,
        video_id: &VideoId,
        limit: u32,
    ) -> ClientResult<FetchOutcome> {
        let ticket = {
            let mut state = self.state.lock().await;
            match state.require_selected(video_id) {
                Ok(_) => state.begin(Resource::Moments),
                Err(err) => return self.report(Operation::RefreshMoments, Err(err)),
            }
        };
        let result = self.api.list_moments(video_id, limit).await;
        let outcome = self.apply_moments(ticket, video_id, result).await;
        self.report(Operation::RefreshMoments, outcome)
    }

    /// On-demand clip refetch for the selected video, ordered with the poll.
    pub async fn refresh_clips(&self) -> ClientResult<FetchOutcome> {
        let scope = {
            let state = self.state.lock().await;
            state
                .selected
                .clone()
                .map(|video_id| (video_id, state.generation))
        };
        let Some((video_id, generation)) = scope else {
            return self.report(
                Operation::RefreshClips,
                Err(ClientError::validation("no video selected")),
            );
        };
        let outcome = self.fetch_clips(&video_id, generation).await;
        self.report(Operation::RefreshClips, outcome)
    }

    /// Starts (or restarts) the fixed-interval clip poll for the selected
    /// video. The first fetch happens immediately.
    pub async fn start_clip_polling(self: &Arc<Self>, video_id: &VideoId) -> ClientResult<()> {
        let generation = self.state.lock().await.require_selected(video_id)?;
        self.spawn_clip_poller(video_id.clone(), generation).await;
        Ok(())
    }

    pub async fn stop_polling(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.task.abort();
            debug!(
                "sync: stopped clip poll video={} generation={}",
                poller.video_id, poller.generation
            );
        }
    }

    async fn spawn_clip_poller(self: &Arc<Self>, video_id: VideoId, generation: u64) {
        let mut poller = self.poller.lock().await;
        // A newer selection may have landed while we waited for the lock.
        if self.state.lock().await.generation != generation {
            return;
        }
        if let Some(previous) = poller.take() {
            previous.task.abort();
        }

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(run_clip_poll(weak, video_id.clone(), generation));
        debug!("sync: started clip poll video={video_id} generation={generation}");
        *poller = Some(ClipPoller {
            video_id,
            generation,
            task,
        });
    }

    async fn fetch_clips(&self, video_id: &VideoId, generation: u64) -> ClientResult<FetchOutcome> {
        let ticket = {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.selected.as_ref() != Some(video_id) {
                return Ok(FetchOutcome::Superseded);
            }
            state.begin(Resource::Clips)
        };

        let result = self.api.list_clips_for_video(video_id).await;

        let count = {
            let mut state = self.state.lock().await;
            if !state.settle(ticket) {
                debug!("sync: dropped superseded clip list video={video_id}");
                return Ok(FetchOutcome::Superseded);
            }
            let clips = result?;
            let count = clips.len();
            state.clips = clips;
            count
        };
        self.emit(SyncEvent::ClipsUpdated {
            video_id: video_id.clone(),
            count,
        });
        Ok(FetchOutcome::Applied)
    }

    async fn apply_moments(
        &self,
        ticket: RequestTicket,
        video_id: &VideoId,
        result: ClientResult<Vec<Moment>>,
    ) -> ClientResult<FetchOutcome> {
        let count = {
            let mut state = self.state.lock().await;
            if !state.settle(ticket) {
                debug!("sync: dropped superseded moments video={video_id}");
                return Ok(FetchOutcome::Superseded);
            }
            let moments = result?;
            let count = moments.len();
            state.moments = moments;
            count
        };
        self.emit(SyncEvent::MomentsUpdated {
            video_id: video_id.clone(),
            count,
        });
        Ok(FetchOutcome::Applied)
    }

    async fn apply_detail(
        &self,
        ticket: RequestTicket,
        video_id: &VideoId,
        result: ClientResult<Video>,
    ) -> ClientResult<FetchOutcome> {
        let embed = {
            let mut state = self.state.lock().await;
            if !state.settle(ticket) {
                debug!("sync: dropped superseded video detail video={video_id}");
                return Ok(FetchOutcome::Superseded);
            }
            let video = result?;
            let embed = derive_embed_id(&video.youtube_url);
            state.embed = embed.clone();
            state.video = Some(video);
            embed
        };
        self.emit(SyncEvent::VideoDetailUpdated {
            video_id: video_id.clone(),
            embed,
        });
        Ok(FetchOutcome::Applied)
    }

    /// Marks a displayed moment as (de)selected for rendering.
    pub async fn toggle_moment(&self, moment_id: &MomentId, selected: bool) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        if !state.moments.iter().any(|moment| &moment.id == moment_id) {
            return Err(ClientError::validation(format!(
                "moment {moment_id} is not in the current view"
            )));
        }
        if selected {
            state.selection.insert(moment_id.clone());
        } else {
            state.selection.remove(moment_id);
        }
        Ok(())
    }

    pub async fn selected_moment_ids(&self) -> Vec<MomentId> {
        self.state.lock().await.selection.iter().cloned().collect()
    }

    /// Submits the current selection of the selected video for rendering.
    pub async fn submit_selected(&self) -> ClientResult<Vec<ClipId>> {
        let (video_id, moment_ids) = {
            let state = self.state.lock().await;
            let Some(video_id) = state.selected.clone() else {
                drop(state);
                return self.report(
                    Operation::Render,
                    Err(ClientError::validation("no video selected")),
                );
            };
            (video_id, state.selection.iter().cloned().collect::<Vec<_>>())
        };
        self.submit_render_selection(&video_id, &moment_ids).await
    }

    /// Queues a render of `moment_ids`. Resulting clips are not injected;
    /// they show up once the polled clip list contains them.
    pub async fn submit_render_selection(
        &self,
        video_id: &VideoId,
        moment_ids: &[MomentId],
    ) -> ClientResult<Vec<ClipId>> {
        if moment_ids.is_empty() {
            return self.report(
                Operation::Render,
                Err(ClientError::validation("select at least one moment to render")),
            );
        }

        let (generation, claim) = {
            let state = self.state.lock().await;
            let generation = match state.require_selected(video_id) {
                Ok(generation) => generation,
                Err(err) => {
                    drop(state);
                    return self.report(Operation::Render, Err(err));
                }
            };
            match self.rendering.claim(generation) {
                Some(claim) => (generation, claim),
                None => {
                    drop(state);
                    return self.report(
                        Operation::Render,
                        Err(ClientError::validation("a render is already being queued")),
                    );
                }
            }
        };

        let result = self
            .api
            .render_clips(video_id, moment_ids, &self.options.aspect_ratio)
            .await;

        let current = {
            let mut state = self.state.lock().await;
            let current = state.generation == generation;
            if current && result.is_ok() {
                state.selection.clear();
            }
            current
        };
        drop(claim);

        let clip_ids = if current {
            self.report(Operation::Render, result)?
        } else {
            // The selection moved on while the request was out; the server
            // still owns whatever it queued.
            let clip_ids = result?;
            info!(
                "sync: render for deselected video={video_id} completed clips={}",
                clip_ids.len()
            );
            return Ok(clip_ids);
        };

        info!("sync: queued render video={video_id} clips={}", clip_ids.len());
        self.emit(SyncEvent::RenderQueued {
            video_id: video_id.clone(),
            clip_ids: clip_ids.clone(),
        });
        Ok(clip_ids)
    }

    pub async fn suggest_titles(&self, use_llm: bool) -> ClientResult<Vec<String>> {
        let Some(video_id) = self.selected().await else {
            return self.report(
                Operation::SuggestTitles,
                Err(ClientError::validation("no video selected")),
            );
        };
        let result = self.api.suggest_titles(&video_id, use_llm).await;
        self.report(Operation::SuggestTitles, result)
    }
}

impl Drop for ViewSyncController {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.task.abort();
        }
    }
}

fn backoff_delay(interval: Duration, max: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    let factor = 1u32 << failures.min(MAX_BACKOFF_SHIFT);
    interval
        .checked_mul(factor)
        .unwrap_or(max)
        .min(max.max(interval))
}

async fn run_clip_poll(controller: Weak<ViewSyncController>, video_id: VideoId, generation: u64) {
    let mut failures = 0u32;
    loop {
        let Some(strong) = controller.upgrade() else {
            break;
        };

        let delay = match strong.fetch_clips(&video_id, generation).await {
            Ok(FetchOutcome::Applied) => {
                failures = 0;
                strong.options.poll_interval
            }
            Ok(FetchOutcome::Superseded) => {
                let stale = strong.state.lock().await.generation != generation;
                if stale {
                    debug!("sync: clip poll exiting for stale scope video={video_id}");
                    break;
                }
                strong.options.poll_interval
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                warn!("sync: clip poll failed video={video_id} failures={failures}: {err}");
                backoff_delay(
                    strong.options.poll_interval,
                    strong.options.poll_backoff_max,
                    failures,
                )
            }
        };
        drop(strong);

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
