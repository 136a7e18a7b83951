mod output;
mod watch;

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    config::{load_settings, load_settings_from},
    ApiClient, ClientError, ClientSettings, DashboardApi,
};
use shared::{
    domain::{
        AlertChannelKind, AutoPostId, AutoPostPlatform, ClipId, JobId, MomentId, PrivacyStatus,
        VideoId,
    },
    media::parse_keywords,
    protocol::{
        AlertChannelRequest, AlertSettings, AutoPostRequest, PublishYouTubeRequest,
        SubscribeChannelRequest,
    },
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clipdeck", version, about = "Drive the clip pipeline from a terminal")]
struct Cli {
    /// Settings file; defaults to ./clipdeck.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Clip poll interval in milliseconds.
    #[arg(long, global = true)]
    poll_ms: Option<u64>,
    #[arg(long, global = true)]
    aspect_ratio: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List ingested videos, newest first.
    Videos,
    /// Queue a source video for ingest.
    Create {
        youtube_url: String,
        /// Keep following the new video after it is queued.
        #[arg(long)]
        follow: bool,
    },
    /// Show a video and its player link.
    Show { video_id: String },
    Moments {
        video_id: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    Titles {
        video_id: String,
        /// Ask the backend to use its language model.
        #[arg(long)]
        llm: bool,
    },
    /// Render the given moments into clips.
    Render {
        video_id: String,
        #[arg(required = true)]
        moment_ids: Vec<String>,
    },
    Clips { video_id: String },
    Clip { clip_id: String },
    SignedUrl { clip_id: String },
    /// Select a video and print moments/clips updates as the backend works.
    Watch {
        video_id: Option<String>,
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
        #[arg(long)]
        moments: bool,
    },
    #[command(subcommand)]
    Publish(PublishCommand),
    #[command(subcommand)]
    Thumbnail(ThumbnailCommand),
    #[command(subcommand)]
    Jobs(JobsCommand),
    Health,
    #[command(subcommand)]
    Alerts(AlertsCommand),
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    #[command(subcommand)]
    Channels(ChannelsCommand),
    #[command(subcommand)]
    Autopost(AutopostCommand),
}

#[derive(Subcommand, Debug)]
enum PublishCommand {
    Youtube {
        clip_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, value_enum, default_value_t = Privacy::Unlisted)]
        privacy: Privacy,
    },
    Tiktok {
        clip_id: String,
        #[arg(long)]
        title: String,
    },
}

#[derive(Subcommand, Debug)]
enum ThumbnailCommand {
    Make {
        clip_id: String,
        #[arg(long)]
        title: String,
    },
    Ab {
        clip_id: String,
        #[arg(long)]
        title_a: String,
        #[arg(long)]
        title_b: String,
    },
    /// Start or stop the A/B thumbnail test.
    AbTest {
        clip_id: String,
        #[arg(long)]
        stop: bool,
    },
    Styles {
        clip_id: String,
        #[arg(long)]
        title: String,
    },
    Set {
        clip_id: String,
        key: String,
        /// Also push the variant to YouTube.
        #[arg(long)]
        youtube: bool,
    },
}

#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// Failed jobs.
    List {
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    Retry { job_id: String },
    Delete { job_id: String },
}

#[derive(Subcommand, Debug)]
enum AlertsCommand {
    Channels,
    Add {
        #[arg(long, value_enum)]
        kind: AlertKind,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        disabled: bool,
    },
    Settings,
    SetSettings(AlertSettingsArgs),
    Test,
}

#[derive(Args, Debug)]
struct AlertSettingsArgs {
    #[arg(long)]
    queue_threshold: Option<u32>,
    #[arg(long)]
    debounce_min: Option<u32>,
    #[arg(long)]
    health_enabled: Option<bool>,
}

#[derive(Subcommand, Debug)]
enum ChannelsCommand {
    List,
    Subscribe {
        channel_id: String,
        #[arg(long, default_value_t = 3)]
        top_k: u32,
        #[arg(long, default_value = "08:00")]
        daily_time: String,
        /// Comma-separated keywords.
        #[arg(long, default_value = "")]
        keywords: String,
    },
    SyncAll,
}

#[derive(Subcommand, Debug)]
enum AutopostCommand {
    List,
    Create {
        #[arg(long, value_enum)]
        platform: Platform,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "09:00")]
        daily_time: String,
        #[arg(long)]
        disabled: bool,
    },
    Run { autopost_id: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Privacy {
    Public,
    Unlisted,
    Private,
}

impl From<Privacy> for PrivacyStatus {
    fn from(value: Privacy) -> Self {
        match value {
            Privacy::Public => PrivacyStatus::Public,
            Privacy::Unlisted => PrivacyStatus::Unlisted,
            Privacy::Private => PrivacyStatus::Private,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum AlertKind {
    Slack,
    Webhook,
}

impl From<AlertKind> for AlertChannelKind {
    fn from(value: AlertKind) -> Self {
        match value {
            AlertKind::Slack => AlertChannelKind::Slack,
            AlertKind::Webhook => AlertChannelKind::Webhook,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Platform {
    Webhook,
    X,
    Email,
}

impl From<Platform> for AutoPostPlatform {
    fn from(value: Platform) -> Self {
        match value {
            Platform::Webhook => AutoPostPlatform::Webhook,
            Platform::X => AutoPostPlatform::X,
            Platform::Email => AutoPostPlatform::Email,
        }
    }
}

impl Cli {
    fn settings(&self) -> ClientSettings {
        let mut settings = match &self.config {
            Some(path) => load_settings_from(path),
            None => load_settings(),
        };
        if let Some(api_url) = &self.api_url {
            settings.api_url = api_url.clone();
        }
        if let Some(api_key) = &self.api_key {
            settings.api_key = api_key.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            settings.poll_interval = Duration::from_millis(poll_ms.max(1));
        }
        if let Some(aspect_ratio) = &self.aspect_ratio {
            settings.aspect_ratio = aspect_ratio.clone();
        }
        settings
    }
}

/// Prefers the backend's `detail` message over the raw body when there is one.
fn explain(err: ClientError) -> anyhow::Error {
    match err.api_error() {
        Some(api_error) => anyhow::Error::new(api_error),
        None => anyhow::Error::new(err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();
    debug!("cli: api_url={} poll_interval={:?}", settings.api_url, settings.poll_interval);

    let (api, controller) = client_core::connect(&settings).context("invalid api settings")?;

    match cli.command {
        Command::Videos => {
            let videos = api.list_videos().await.map_err(explain)?;
            if videos.is_empty() {
                println!("no videos");
            }
            for video in &videos {
                println!("{}", output::video_line(video));
            }
        }
        Command::Create {
            youtube_url,
            follow,
        } => {
            let video_id = controller
                .create_video(&youtube_url)
                .await
                .map_err(explain)
                .context("failed to queue video")?;
            println!("queued video_id={video_id}");
            if follow {
                watch::run(
                    &api,
                    controller,
                    watch::WatchOptions {
                        video_id: Some(video_id),
                        duration: None,
                        show_moments: true,
                    },
                )
                .await?;
            }
        }
        Command::Show { video_id } => {
            let video = api.get_video(&VideoId::new(video_id)).await.map_err(explain)?;
            println!("{}", output::video_line(&video));
            let embed = client_core::derive_embed_id(&video.youtube_url);
            println!("{}", output::embed_line(embed.as_ref()));
        }
        Command::Moments { video_id, limit } => {
            let video_id = VideoId::new(video_id);
            let limit = limit.unwrap_or(settings.moments_limit);
            let (video, moments) = tokio::join!(
                api.get_video(&video_id),
                api.list_moments(&video_id, limit)
            );
            let moments = moments.map_err(explain)?;
            let source = video.ok().map(|video| video.youtube_url);
            if moments.is_empty() {
                println!("no moments yet for {video_id}");
            }
            for moment in &moments {
                println!("{}", output::moment_line(moment, source.as_deref()));
            }
        }
        Command::Titles { video_id, llm } => {
            let titles = api
                .suggest_titles(&VideoId::new(video_id), llm)
                .await
                .map_err(explain)?;
            for title in titles {
                println!("{title}");
            }
        }
        Command::Render {
            video_id,
            moment_ids,
        } => {
            let video_id = VideoId::new(video_id);
            let moment_ids: Vec<MomentId> = moment_ids.into_iter().map(MomentId::new).collect();
            controller
                .select_video(video_id.clone())
                .await
                .map_err(explain)
                .with_context(|| format!("failed to load video {video_id}"))?;
            let result = controller.submit_render_selection(&video_id, &moment_ids).await;
            controller.shutdown().await;
            let clip_ids = result.map_err(explain).context("render was not queued")?;
            println!("queued {} clip(s)", clip_ids.len());
            for clip_id in clip_ids {
                println!("  {clip_id}");
            }
        }
        Command::Clips { video_id } => {
            let clips = api
                .list_clips_for_video(&VideoId::new(video_id))
                .await
                .map_err(explain)?;
            for clip in &clips {
                println!("{}", output::clip_line(clip, &api));
            }
        }
        Command::Clip { clip_id } => {
            let clip = api.get_clip(&ClipId::new(clip_id)).await.map_err(explain)?;
            println!("{}", output::clip_line(&clip, &api));
        }
        Command::SignedUrl { clip_id } => {
            let url = api.signed_url(&ClipId::new(clip_id)).await.map_err(explain)?;
            println!("{url}");
        }
        Command::Watch {
            video_id,
            seconds,
            moments,
        } => {
            watch::run(
                &api,
                controller,
                watch::WatchOptions {
                    video_id: video_id.map(VideoId::new),
                    duration: seconds.map(Duration::from_secs),
                    show_moments: moments,
                },
            )
            .await?;
        }
        Command::Publish(command) => publish(&api, command).await?,
        Command::Thumbnail(command) => thumbnail(&api, command).await?,
        Command::Jobs(command) => jobs(&api, command).await?,
        Command::Health => {
            let report = api.health().await.map_err(explain)?;
            for line in output::health_lines(&report) {
                println!("{line}");
            }
            if !report.is_ok() {
                bail!("backend reports status={}", report.status);
            }
        }
        Command::Alerts(command) => alerts(&api, command).await?,
        Command::Leaderboard { limit } => {
            let items = api.leaderboard(limit).await.map_err(explain)?;
            for (idx, item) in items.iter().enumerate() {
                println!("{}", output::leaderboard_line(idx + 1, item));
            }
        }
        Command::Channels(command) => channels(&api, command).await?,
        Command::Autopost(command) => autopost(&api, command).await?,
    }

    Ok(())
}

async fn publish(api: &ApiClient, command: PublishCommand) -> Result<()> {
    match command {
        PublishCommand::Youtube {
            clip_id,
            title,
            description,
            tags,
            privacy,
        } => {
            let request = PublishYouTubeRequest {
                title,
                description,
                tags: parse_keywords(&tags),
                privacy_status: privacy.into(),
            };
            api.publish_to_youtube(&ClipId::new(clip_id), &request)
                .await
                .map_err(explain)?;
            println!("youtube publish queued");
        }
        PublishCommand::Tiktok { clip_id, title } => {
            api.publish_to_tiktok(&ClipId::new(clip_id), &title)
                .await
                .map_err(explain)?;
            println!("tiktok publish queued");
        }
    }
    Ok(())
}

async fn thumbnail(api: &ApiClient, command: ThumbnailCommand) -> Result<()> {
    let message = match command {
        ThumbnailCommand::Make { clip_id, title } => {
            api.make_thumbnail(&ClipId::new(clip_id), &title)
                .await
                .map_err(explain)?;
            "thumbnail queued"
        }
        ThumbnailCommand::Ab {
            clip_id,
            title_a,
            title_b,
        } => {
            api.make_ab_thumbnails(&ClipId::new(clip_id), &title_a, &title_b)
                .await
                .map_err(explain)?;
            "A/B thumbnails queued"
        }
        ThumbnailCommand::AbTest { clip_id, stop } => {
            api.set_ab_test(&ClipId::new(clip_id), !stop)
                .await
                .map_err(explain)?;
            if stop {
                "A/B test stopped"
            } else {
                "A/B test started"
            }
        }
        ThumbnailCommand::Styles { clip_id, title } => {
            api.make_style_pack(&ClipId::new(clip_id), &title)
                .await
                .map_err(explain)?;
            "style pack queued"
        }
        ThumbnailCommand::Set {
            clip_id,
            key,
            youtube,
        } => {
            api.set_style_variant(&ClipId::new(clip_id), &key, youtube)
                .await
                .map_err(explain)?;
            "style variant set"
        }
    };
    println!("{message}");
    Ok(())
}

async fn jobs(api: &ApiClient, command: JobsCommand) -> Result<()> {
    match command {
        JobsCommand::List { limit } => {
            let jobs = api.list_failed_jobs(limit).await.map_err(explain)?;
            if jobs.is_empty() {
                println!("no failed jobs");
            }
            for job in &jobs {
                println!("{}", output::job_line(job));
            }
        }
        JobsCommand::Retry { job_id } => {
            api.retry_job(&JobId::new(job_id.clone()))
                .await
                .map_err(explain)?;
            println!("job {job_id} re-queued");
        }
        JobsCommand::Delete { job_id } => {
            api.delete_job(&JobId::new(job_id.clone()))
                .await
                .map_err(explain)?;
            println!("job {job_id} deleted");
        }
    }
    Ok(())
}

async fn alerts(api: &ApiClient, command: AlertsCommand) -> Result<()> {
    match command {
        AlertsCommand::Channels => {
            for channel in &api.list_alert_channels().await.map_err(explain)? {
                println!("{}", output::alert_channel_line(channel));
            }
        }
        AlertsCommand::Add {
            kind,
            endpoint,
            disabled,
        } => {
            let id = api
                .add_alert_channel(&AlertChannelRequest {
                    kind: kind.into(),
                    endpoint,
                    enabled: !disabled,
                })
                .await
                .map_err(explain)?;
            println!("alert channel id={id}");
        }
        AlertsCommand::Settings => {
            let settings = api.alert_settings().await.map_err(explain)?;
            print_alert_settings(&settings);
        }
        AlertsCommand::SetSettings(args) => {
            let mut settings = api.alert_settings().await.unwrap_or_else(|err| {
                debug!("cli: using default alert settings: {err}");
                AlertSettings::default()
            });
            if let Some(queue_threshold) = args.queue_threshold {
                settings.queue_threshold = queue_threshold;
            }
            if let Some(debounce_min) = args.debounce_min {
                settings.debounce_min = debounce_min;
            }
            if let Some(health_enabled) = args.health_enabled {
                settings.health_enabled = health_enabled;
            }
            api.set_alert_settings(&settings).await.map_err(explain)?;
            print_alert_settings(&settings);
        }
        AlertsCommand::Test => {
            api.send_alert_test().await.map_err(explain)?;
            println!("test alert sent");
        }
    }
    Ok(())
}

fn print_alert_settings(settings: &AlertSettings) {
    println!(
        "queue_threshold={} debounce_min={} health_enabled={}",
        settings.queue_threshold, settings.debounce_min, settings.health_enabled
    );
}

async fn channels(api: &ApiClient, command: ChannelsCommand) -> Result<()> {
    match command {
        ChannelsCommand::List => {
            for subscription in &api.list_channels().await.map_err(explain)? {
                println!("{}", output::subscription_line(subscription));
            }
        }
        ChannelsCommand::Subscribe {
            channel_id,
            top_k,
            daily_time,
            keywords,
        } => {
            let mut request = SubscribeChannelRequest::new(channel_id);
            request.auto_render_top_k = top_k;
            request.daily_post_time = daily_time;
            request.keywords = parse_keywords(&keywords);
            let id = api.subscribe_channel(&request).await.map_err(explain)?;
            println!("subscribed id={id}");
        }
        ChannelsCommand::SyncAll => {
            let queued = api.sync_all_channels().await.map_err(explain)?;
            println!("queued {queued} channel sync(s)");
        }
    }
    Ok(())
}

async fn autopost(api: &ApiClient, command: AutopostCommand) -> Result<()> {
    match command {
        AutopostCommand::List => {
            for autopost in &api.list_autoposts().await.map_err(explain)? {
                println!("{}", output::autopost_line(autopost));
            }
        }
        AutopostCommand::Create {
            platform,
            endpoint,
            template,
            daily_time,
            disabled,
        } => {
            let id = api
                .create_autopost(&AutoPostRequest {
                    platform: platform.into(),
                    endpoint,
                    template,
                    daily_time,
                    enabled: !disabled,
                })
                .await
                .map_err(explain)?;
            println!("autopost id={id}");
        }
        AutopostCommand::Run { autopost_id } => {
            api.run_autopost_now(&AutoPostId::new(autopost_id.clone()))
                .await
                .map_err(explain)?;
            println!("autopost {autopost_id} triggered");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_loaded_settings() {
        let cli = Cli::parse_from([
            "clipdeck",
            "--config",
            "/nonexistent/clipdeck.toml",
            "--api-url",
            "http://backend:9000",
            "--poll-ms",
            "500",
            "videos",
        ]);
        let settings = cli.settings();
        assert_eq!(settings.api_url, "http://backend:9000");
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn render_requires_at_least_one_moment() {
        assert!(Cli::try_parse_from(["clipdeck", "render", "v1"]).is_err());
        let cli = Cli::try_parse_from(["clipdeck", "render", "v1", "m1", "m2"]).expect("parse");
        match cli.command {
            Command::Render { moment_ids, .. } => assert_eq!(moment_ids, vec!["m1", "m2"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
