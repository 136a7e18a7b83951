//! Follows a video through the pipeline by driving the view controller and
//! printing every event it broadcasts.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use client_core::{ApiClient, SyncEvent, ViewSyncController};
use shared::domain::VideoId;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, warn};

use crate::output;

pub struct WatchOptions {
    pub video_id: Option<VideoId>,
    pub duration: Option<Duration>,
    pub show_moments: bool,
}

/// How the watched video gets into the controller's view.
#[derive(Debug, PartialEq, Eq)]
enum Start<'a> {
    Select(&'a VideoId),
    /// The controller already shows the requested video, e.g. right after
    /// `create_video`, so selecting again would only reload it.
    Current,
    Newest,
}

fn start_for<'a>(requested: Option<&'a VideoId>, selected: Option<&VideoId>) -> Start<'a> {
    match requested {
        Some(requested) if selected == Some(requested) => Start::Current,
        Some(requested) => Start::Select(requested),
        None => Start::Newest,
    }
}

pub async fn run(
    api: &ApiClient,
    controller: Arc<ViewSyncController>,
    options: WatchOptions,
) -> Result<()> {
    let mut events = BroadcastStream::new(controller.subscribe());

    let selected = controller.selected().await;
    match start_for(options.video_id.as_ref(), selected.as_ref()) {
        Start::Select(video_id) => controller
            .select_video(video_id.clone())
            .await
            .with_context(|| format!("failed to load video {video_id}"))?,
        Start::Current => {
            debug!("watch: video already selected, printing current view");
            print_snapshot(api, &controller, options.show_moments).await;
        }
        Start::Newest => {
            let videos = controller
                .refresh_videos()
                .await
                .context("failed to list videos")?;
            if videos.is_empty() {
                println!("no videos yet; queue one with `clipdeck create <url>`");
                controller.shutdown().await;
                return Ok(());
            }
        }
    }

    let deadline = async {
        match options.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("watch: interrupted");
                break;
            }
            _ = &mut deadline => break,
            next = events.next() => {
                let Some(next) = next else {
                    break;
                };
                match next {
                    Ok(event) => print_event(api, &controller, &event, options.show_moments).await,
                    Err(err) => warn!("watch: event stream lagged: {err}"),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn print_snapshot(api: &ApiClient, controller: &ViewSyncController, show_moments: bool) {
    let snapshot = controller.snapshot().await;
    if let Some(video_id) = &snapshot.selected {
        println!("selected: {video_id}  {}", output::embed_line(snapshot.embed.as_ref()));
    }
    let source = snapshot.video.as_ref().map(|video| video.youtube_url.as_str());
    println!("moments: {}", snapshot.moments.len());
    if show_moments {
        for moment in &snapshot.moments {
            println!("  {}", output::moment_line(moment, source));
        }
    }
    println!("clips: {}", snapshot.clips.len());
    for clip in &snapshot.clips {
        println!("  {}", output::clip_line(clip, api));
    }
}

async fn print_event(
    api: &ApiClient,
    controller: &ViewSyncController,
    event: &SyncEvent,
    show_moments: bool,
) {
    println!("{}", output::event_line(event));
    match event {
        SyncEvent::MomentsUpdated { .. } if show_moments => {
            let snapshot = controller.snapshot().await;
            let source = snapshot.video.as_ref().map(|video| video.youtube_url.as_str());
            for moment in &snapshot.moments {
                println!("  {}", output::moment_line(moment, source));
            }
        }
        SyncEvent::ClipsUpdated { .. } => {
            for clip in &controller.snapshot().await.clips {
                println!("  {}", output::clip_line(clip, api));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_selected_video_is_not_selected_again() {
        let created = VideoId::new("v-new");
        assert_eq!(start_for(Some(&created), Some(&created)), Start::Current);
    }

    #[test]
    fn other_or_missing_selection_is_replaced() {
        let requested = VideoId::new("v2");
        let selected = VideoId::new("v1");
        assert_eq!(start_for(Some(&requested), Some(&selected)), Start::Select(&requested));
        assert_eq!(start_for(Some(&requested), None), Start::Select(&requested));
        assert_eq!(start_for(None, Some(&selected)), Start::Newest);
    }
}
