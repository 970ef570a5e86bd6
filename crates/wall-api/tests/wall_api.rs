//! End-to-end tests for the wall HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use wall_api::{AppState, AppStateInner, WallSettings, router};
use wall_db::Database;
use wall_gateway::{BrokerConfig, FanoutBroker};
use wall_types::api::{Claims, EventWallResponse, MessagePage, PinResponse};
use wall_types::{Event, Message};

const SECRET: &str = "test-secret";

fn setup() -> (Router, AppState) {
    setup_with(BrokerConfig::default())
}

fn setup_with(broker: BrokerConfig) -> (Router, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        broker: FanoutBroker::new(broker),
        jwt_secret: SECRET.into(),
        settings: WallSettings::default(),
    });
    (router(state.clone()), state)
}

fn moderator_token() -> String {
    let claims = Claims {
        sub: Uuid::new_v4(),
        username: "moderator".into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn post(app: &Router, code: &str, text: &str) -> Message {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("/events/{code}/messages"),
            Some(json!({ "text": text, "sender_name": "Ada" })),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // Keep created_at strictly increasing between posts.
    tokio::time::sleep(Duration::from_millis(2)).await;
    serde_json::from_slice(&body).unwrap()
}

async fn page(app: &Router, uri: &str) -> MessagePage {
    let (status, body) = send(app, request("GET", uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

fn texts(page: &MessagePage) -> Vec<&str> {
    page.messages.iter().map(|m| m.text.as_str()).collect()
}

#[tokio::test]
async fn history_pages_newest_first() {
    let (app, _) = setup();
    for text in ["one", "two", "three"] {
        post(&app, "abc", text).await;
    }

    let first = page(&app, "/events/abc/messages?limit=2").await;
    assert_eq!(texts(&first), ["three", "two"]);
    assert!(first.has_older);

    let cursor = first.next_before_id.unwrap();
    let second = page(&app, &format!("/events/abc/messages?limit=2&before_id={cursor}")).await;
    assert_eq!(texts(&second), ["one"]);
    assert!(!second.has_older);

    let unknown = page(&app, "/events/abc/messages?limit=2&before_id=not-a-message").await;
    assert_eq!(texts(&unknown), ["three", "two"]);
}

#[tokio::test]
async fn pinning_requires_moderator_and_reorders() {
    let (app, _) = setup();
    let oldest = post(&app, "abc", "important").await;
    post(&app, "abc", "chatter").await;

    let pin_uri = format!("/messages/{}/pin", oldest.id);
    let (status, _) = send(&app, request("POST", &pin_uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, request("POST", &pin_uri, None, Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = moderator_token();
    let (status, body) = send(&app, request("POST", &pin_uri, None, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let pin: PinResponse = serde_json::from_slice(&body).unwrap();
    assert!(pin.pinned);

    let all = page(&app, "/events/abc/messages").await;
    assert_eq!(texts(&all), ["important", "chatter"]);
    assert!(all.messages[0].pinned);

    let pinned = page(&app, "/events/abc/messages?partition=pinned").await;
    assert_eq!(texts(&pinned), ["important"]);
    let unpinned = page(&app, "/events/abc/messages?partition=unpinned").await;
    assert_eq!(texts(&unpinned), ["chatter"]);

    let missing = format!("/messages/{}/pin", Uuid::new_v4());
    let (status, _) = send(&app, request("POST", &missing, None, Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn older_probe_answers_without_fetching_a_page() {
    let (app, _) = setup();
    let first = post(&app, "abc", "first").await;
    let second = post(&app, "abc", "second").await;

    let (status, body) = send(
        &app,
        request("GET", &format!("/events/abc/messages/older?before_id={}", second.id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let probe: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(probe["has_older"], json!(true));

    for cursor in [first.id.to_string(), "missing".to_string()] {
        let (status, body) = send(
            &app,
            request("GET", &format!("/events/abc/messages/older?before_id={cursor}"), None, None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn invalid_posts_are_rejected() {
    let (app, _) = setup();
    let (status, _) = send(
        &app,
        request("POST", "/events/abc/messages", Some(json!({ "text": "   " })), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("POST", "/events/bad%20code/messages", Some(json!({ "text": "hi" })), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_delivers_new_posts_and_cleans_up() {
    let (app, state) = setup();

    let response = app
        .clone()
        .oneshot(request("GET", "/events/abc/stream", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-transform");
    assert_eq!(state.broker.subscriber_count("abc"), 1);

    // Posts to other channels are not relayed here.
    post(&app, "other", "elsewhere").await;
    let posted = post(&app, "abc", "live <b>now</b>").await;

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap().into_data().unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.starts_with("event: message\ndata: <span data-autoscroll=\"1\""));
    assert!(frame.ends_with("</article>\n\n"));
    assert!(frame.contains(&format!("message-{}", posted.id)));
    assert!(frame.contains("live &lt;b&gt;now&lt;/b&gt;"));

    drop(body);
    for _ in 0..50 {
        if state.broker.subscriber_count("abc") == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.broker.subscriber_count("abc"), 0);
    assert_eq!(state.broker.channel_count(), 0);
}

#[tokio::test]
async fn events_are_created_by_moderators() {
    let (app, _) = setup();
    let token = moderator_token();
    let create = json!({ "code": "rustconf", "title": "RustConf", "description": "Day 1" });

    let (status, _) = send(&app, request("POST", "/events", Some(create.clone()), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, request("POST", "/events", Some(create.clone()), Some(&token))).await;
    assert_eq!(status, StatusCode::CREATED);
    let event: Event = serde_json::from_slice(&body).unwrap();
    assert_eq!(event.title, "RustConf");

    let (status, _) = send(&app, request("POST", "/events", Some(create), Some(&token))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, request("GET", "/events", None, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let events: Vec<Event> = serde_json::from_slice(&body).unwrap();
    assert_eq!(events.len(), 1);

    post(&app, "rustconf", "hello wall").await;
    let (status, body) = send(&app, request("GET", "/events/rustconf", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let wall: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(wall["event_url"], json!("http://localhost:3000/events/rustconf"));
    assert_eq!(wall["recent"]["messages"][0]["text"], json!("hello wall"));
    assert_eq!(wall["recent"]["has_older"], json!(false));
    assert_eq!(wall["pinned"]["messages"], json!([]));

    let (status, _) = send(&app, request("GET", "/events/nope", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_live_viewers() {
    let (app, state) = setup();
    let _held = state.broker.subscribe("abc").unwrap();

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["channels"], json!(1));
    assert_eq!(health["subscribers"], json!(1));
}

async fn create_event(app: &Router, token: &str, code: &str) {
    let body = json!({ "code": code, "title": "Conf" });
    let (status, _) = send(app, request("POST", "/events", Some(body), Some(token))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn wall_shows_recent_messages_beside_many_pins() {
    let (app, _) = setup();
    let token = moderator_token();
    create_event(&app, &token, "conf").await;

    let mut posted = Vec::new();
    for n in 0..13 {
        posted.push(post(&app, "conf", &format!("m{n}")).await);
    }
    // Pin more messages than fit on one page, leaving the two newest unpinned.
    for message in &posted[..11] {
        let uri = format!("/messages/{}/pin", message.id);
        let (status, _) = send(&app, request("POST", &uri, None, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, request("GET", "/events/conf", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let wall: EventWallResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(texts(&wall.recent), ["m12", "m11"]);
    assert!(!wall.recent.has_older);
    assert_eq!(wall.recent.next_before_id, Some(posted[11].id));

    assert_eq!(wall.pinned.messages.len(), 10);
    assert!(wall.pinned.messages.iter().all(|m| m.pinned));
    assert_eq!(wall.pinned.messages[0].text, "m10");
    assert!(wall.pinned.has_older);

    let cursor = wall.pinned.next_before_id.unwrap();
    let rest = page(&app, &format!("/events/conf/messages?partition=pinned&before_id={cursor}")).await;
    assert_eq!(texts(&rest), ["m0"]);
    assert!(!rest.has_older);
}

#[tokio::test]
async fn moderators_update_event_details() {
    let (app, _) = setup();
    let token = moderator_token();
    create_event(&app, &token, "conf").await;

    let change = json!({ "title": "  Conf 2025 ", "description": "Main hall" });
    let (status, _) = send(&app, request("PATCH", "/events/conf", Some(change.clone()), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, request("PATCH", "/events/conf", Some(change), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let event: Event = serde_json::from_slice(&body).unwrap();
    assert_eq!(event.title, "Conf 2025");
    assert_eq!(event.description.as_deref(), Some("Main hall"));

    let clear = json!({ "description": "" });
    let (status, body) = send(&app, request("PATCH", "/events/conf", Some(clear), Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let event: Event = serde_json::from_slice(&body).unwrap();
    assert_eq!(event.title, "Conf 2025");
    assert_eq!(event.description, None);

    let (status, _) = send(&app, request("PATCH", "/events/conf", Some(json!({})), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) =
        send(&app, request("PATCH", "/events/conf", Some(json!({ "title": " " })), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) =
        send(&app, request("PATCH", "/events/nope", Some(json!({ "title": "x" })), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The public view still answers GET on the same path.
    let (status, body) = send(&app, request("GET", "/events/conf", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let wall: EventWallResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(wall.event.title, "Conf 2025");
}

#[tokio::test]
async fn slow_stream_reader_gets_newest_frames() {
    let (app, _) = setup_with(BrokerConfig {
        queue_capacity: 2,
        ..BrokerConfig::default()
    });
    let response = app
        .clone()
        .oneshot(request("GET", "/events/abc/stream", None, None))
        .await
        .unwrap();

    // Nobody reads the body while these are posted.
    let mut posted = Vec::new();
    for n in 0..8 {
        posted.push(post(&app, "abc", &format!("m{n}")).await);
    }

    let mut body = response.into_body();
    let mut received = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(200), body.frame()).await {
        let frame = frame.unwrap().into_data().unwrap();
        received.push(String::from_utf8(frame.to_vec()).unwrap());
    }

    let delivered: Vec<usize> = posted
        .iter()
        .enumerate()
        .filter(|(_, m)| received.iter().any(|f| f.contains(&format!("message-{}", m.id))))
        .map(|(n, _)| n)
        .collect();
    // Two frames can be in flight to the body; the queue keeps the two newest.
    assert!(delivered.len() <= 4, "delivered {delivered:?}");
    assert!(delivered.ends_with(&[6, 7]), "delivered {delivered:?}");
}
