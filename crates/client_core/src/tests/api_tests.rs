use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use serde_json::Value;
use shared::{
    domain::{AlertChannelKind, JobId, MomentId, PrivacyStatus},
    protocol::{AlertChannelRequest, PublishYouTubeRequest, SubscribeChannelRequest},
};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::transport::API_KEY_HEADER;

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    api_key: Option<String>,
    body: Option<Value>,
}

#[derive(Clone, Default)]
struct MockBackend {
    routes: Arc<HashMap<(Method, String), (StatusCode, String)>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn handle_any(
    State(backend): State<MockBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    backend.requests.lock().await.push(RecordedRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        api_key: headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).ok(),
    });

    let (status, body) = backend
        .routes
        .get(&(method, uri.path().to_string()))
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, r#"{"detail":"Not Found"}"#.to_string()));
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

async fn spawn_backend(
    routes: Vec<(Method, &str, StatusCode, &str)>,
) -> (ApiClient, Arc<Mutex<Vec<RecordedRequest>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let backend = MockBackend {
        routes: Arc::new(
            routes
                .into_iter()
                .map(|(method, path, status, body)| ((method, path.to_string()), (status, body.to_string())))
                .collect(),
        ),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let requests = Arc::clone(&backend.requests);
    let app = Router::new().fallback(handle_any).with_state(backend);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let settings = ClientSettings {
        api_url: format!("http://{addr}"),
        api_key: "test-key".into(),
        request_timeout: Duration::from_secs(5),
        ..ClientSettings::default()
    };
    (ApiClient::new(&settings).expect("client"), requests)
}

#[tokio::test]
async fn list_videos_sends_api_key_and_decodes_envelope() {
    let (api, requests) = spawn_backend(vec![(
        Method::GET,
        "/videos",
        StatusCode::OK,
        r#"{"videos":[{"id":"v1","youtube_url":"https://www.youtube.com/watch?v=abc","status":"queued","created_at":null}]}"#,
    )])
    .await;

    let videos = api.list_videos().await.expect("list videos");
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].id, VideoId::new("v1"));
    assert_eq!(videos[0].status, "queued");

    let requests = requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].api_key.as_deref(), Some("test-key"));
}

#[tokio::test]
async fn video_detail_and_moments_hit_scoped_paths() {
    let (api, requests) = spawn_backend(vec![
        (
            Method::GET,
            "/videos/v1",
            StatusCode::OK,
            r#"{"video_id":"v1","youtube_url":"https://www.youtube.com/watch?v=abc","status":"ANALYZED","created_at":"2024-03-01T10:00:00"}"#,
        ),
        (
            Method::GET,
            "/videos/v1/moments",
            StatusCode::OK,
            r#"{"video_id":"v1","moments":[{"segment_id":"s1","start":3.0,"end":21.5,"score":0.91,"reason":{"hook":0.5}}]}"#,
        ),
    ])
    .await;

    let video = api.get_video(&VideoId::new("v1")).await.expect("detail");
    assert_eq!(video.id, VideoId::new("v1"));

    let moments = api.list_moments(&VideoId::new("v1"), 12).await.expect("moments");
    assert_eq!(moments.len(), 1);
    assert_eq!(moments[0].id, MomentId::new("s1"));

    let requests = requests.lock().await;
    assert_eq!(requests[1].path, "/videos/v1/moments");
    assert_eq!(requests[1].query.as_deref(), Some("limit=12"));
}

#[tokio::test]
async fn non_success_status_surfaces_body_text() {
    let (api, _) = spawn_backend(vec![(
        Method::GET,
        "/videos/missing",
        StatusCode::NOT_FOUND,
        r#"{"detail":"video not found"}"#,
    )])
    .await;

    let err = api.get_video(&VideoId::new("missing")).await.expect_err("404");
    match err {
        ClientError::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, r#"{"detail":"video not found"}"#);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn render_posts_segment_ids_and_aspect_ratio() {
    let (api, requests) = spawn_backend(vec![(
        Method::POST,
        "/clips/v1/render",
        StatusCode::OK,
        r#"{"clip_ids":["c1","c2"]}"#,
    )])
    .await;

    let clip_ids = api
        .render_clips(
            &VideoId::new("v1"),
            &[MomentId::new("s1"), MomentId::new("s2")],
            "9:16",
        )
        .await
        .expect("render");
    assert_eq!(clip_ids, vec![ClipId::new("c1"), ClipId::new("c2")]);

    let requests = requests.lock().await;
    let body = requests[0].body.clone().expect("json body");
    assert_eq!(body["segment_ids"], serde_json::json!(["s1", "s2"]));
    assert_eq!(body["aspect_ratio"], "9:16");
}

#[tokio::test]
async fn title_suggestions_send_bare_boolean_body() {
    let (api, requests) = spawn_backend(vec![(
        Method::POST,
        "/videos/v1/titles",
        StatusCode::OK,
        r#"{"video_id":"v1","suggestions":["One","Two"]}"#,
    )])
    .await;

    let titles = api.suggest_titles(&VideoId::new("v1"), true).await.expect("titles");
    assert_eq!(titles, vec!["One".to_string(), "Two".to_string()]);
    assert_eq!(requests.lock().await[0].body, Some(Value::Bool(true)));
}

#[tokio::test]
async fn admin_job_commands_use_expected_methods() {
    let (api, requests) = spawn_backend(vec![
        (
            Method::GET,
            "/admin/jobs",
            StatusCode::OK,
            r#"{"jobs":[{"id":"j1","type":"RENDER","status":"error","error":"ffmpeg exited 1","attempts":2,"updated_at":"2024-03-01T10:00:00.5","payload":{"type":"RENDER"}}]}"#,
        ),
        (Method::POST, "/admin/jobs/j1/retry", StatusCode::OK, r#"{"ok":true}"#),
        (Method::DELETE, "/admin/jobs/j1", StatusCode::OK, r#"{"ok":true}"#),
    ])
    .await;

    let jobs = api.list_failed_jobs(100).await.expect("jobs");
    assert_eq!(jobs[0].attempts, 2);
    assert_eq!(jobs[0].job_type, "RENDER");

    let ack = api.retry_job(&JobId::new("j1")).await.expect("retry");
    assert_eq!(ack.get("ok"), Some(&Value::Bool(true)));
    api.delete_job(&JobId::new("j1")).await.expect("delete");

    let requests = requests.lock().await;
    assert_eq!(requests[0].query.as_deref(), Some("status=error&limit=100"));
    assert_eq!(requests[1].body, Some(serde_json::json!({})));
    assert_eq!(requests[2].method, Method::DELETE);
}

#[tokio::test]
async fn publish_and_alert_payloads_match_backend_shapes() {
    let (api, requests) = spawn_backend(vec![
        (
            Method::POST,
            "/clips/c1/publish/youtube",
            StatusCode::OK,
            r#"{"ok":true,"job":"UPLOAD_YT"}"#,
        ),
        (Method::POST, "/alerts/channels", StatusCode::OK, r#"{"id":"a1"}"#),
    ])
    .await;

    api.publish_to_youtube(
        &ClipId::new("c1"),
        &PublishYouTubeRequest {
            title: "Best bit".into(),
            description: String::new(),
            tags: vec!["rust".into()],
            privacy_status: PrivacyStatus::Unlisted,
        },
    )
    .await
    .expect("publish");

    let id = api
        .add_alert_channel(&AlertChannelRequest {
            kind: AlertChannelKind::Slack,
            endpoint: "https://hooks.slack.com/x".into(),
            enabled: true,
        })
        .await
        .expect("alert channel");
    assert_eq!(id.as_str(), "a1");

    let requests = requests.lock().await;
    let publish = requests[0].body.clone().expect("publish body");
    assert_eq!(publish["privacyStatus"], "unlisted");
    assert_eq!(publish["tags"], serde_json::json!(["rust"]));
    let alert = requests[1].body.clone().expect("alert body");
    assert_eq!(alert["kind"], "slack");
}

#[tokio::test]
async fn blank_required_fields_fail_before_any_request() {
    let (api, requests) = spawn_backend(Vec::new()).await;

    let err = api
        .subscribe_channel(&SubscribeChannelRequest::new("  "))
        .await
        .expect_err("blank channel");
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(requests.lock().await.is_empty());
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let (api, _) = spawn_backend(vec![(Method::GET, "/health", StatusCode::OK, "not json")]).await;

    let err = api.health().await.expect_err("decode");
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn signed_url_is_resolved_against_base() {
    let (api, _) = spawn_backend(vec![(
        Method::GET,
        "/clips/c1/signed_url",
        StatusCode::OK,
        r#"{"clip_id":"c1","url":"/media/clips/c1.mp4"}"#,
    )])
    .await;

    let url = api.signed_url(&ClipId::new("c1")).await.expect("signed url");
    assert_eq!(url, api.asset_url("/media/clips/c1.mp4"));
    assert!(url.ends_with("/media/clips/c1.mp4"));
    assert!(url.starts_with("http://127.0.0.1:"));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = ApiClient::new(&ClientSettings {
        api_url: format!("http://{addr}"),
        request_timeout: Duration::from_secs(2),
        ..ClientSettings::default()
    })
    .expect("client");

    let err = api.list_videos().await.expect_err("connection refused");
    assert!(matches!(err, ClientError::Network(_)));
    assert!(err.is_retryable());
}

#[test]
fn asset_url_joins_relative_paths() {
    let api = ApiClient::new(&ClientSettings {
        api_url: "https://clips.example.com".into(),
        ..ClientSettings::default()
    })
    .expect("client");

    assert_eq!(
        api.asset_url("/media/a.jpg"),
        "https://clips.example.com/media/a.jpg"
    );
    assert_eq!(
        api.asset_url("https://cdn.example.com/a.jpg"),
        "https://cdn.example.com/a.jpg"
    );
}

#[test]
fn ids_are_percent_encoded_as_path_segments() {
    let api = ApiClient::new(&ClientSettings::default()).expect("client");
    let url = api
        .transport
        .endpoint(&["videos", "a b/c", "moments"])
        .expect("endpoint");
    assert_eq!(url.path(), "/videos/a%20b%2Fc/moments");
}
