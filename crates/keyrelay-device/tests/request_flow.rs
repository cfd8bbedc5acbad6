//! Integration tests for the device request flow.
//!
//! These wire a full `ServerState` (auth gate, lockout guard, typing use
//! case) to a recording HID sink and a recording notifier, then drive
//! requests through the public `respond` entry point and, once, through a
//! real TCP listener.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Method, Request, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use keyrelay_core::domain::{Clock, ManualClock};
use keyrelay_core::{HidKey, HidKeyCode, KeyboardReport};
use keyrelay_device::application::{HidReportSink, Notifier};
use keyrelay_device::domain::{AlertEvent, AppConfig};
use keyrelay_device::infrastructure::hid_output::MockHidSink;
use keyrelay_device::infrastructure::http_server::{respond, serve, ServerState};
use keyrelay_device::infrastructure::notifier::RecordingNotifier;

const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77));

struct Harness {
    state: ServerState,
    sink: Arc<MockHidSink>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
}

fn make_harness(pagename: &str) -> Harness {
    let mut config = AppConfig::from_legacy_str("username=admin\nuserpass=secret\n");
    config.http.pagename = pagename.to_string();
    config.hid.press_settle_ms = 0;
    config.hid.release_settle_ms = 0;
    config.hid.ready_timeout_ms = 20;

    let sink = Arc::new(MockHidSink::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::new());
    let state = ServerState::from_config(
        &config,
        Arc::clone(&sink) as Arc<dyn HidReportSink>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(AtomicBool::new(true)),
    );
    Harness {
        state,
        sink,
        notifier,
        clock,
    }
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

fn get(path: &str, auth: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(Method::GET).uri(path);
    if let Some(auth) = auth {
        builder = builder.header(AUTHORIZATION, auth);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

fn post_send(form: &str, auth: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/send")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(auth) = auth {
        builder = builder.header(AUTHORIZATION, auth);
    }
    builder.body(Full::new(Bytes::from(form.to_string()))).unwrap()
}

async fn body_text(response: Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ── Control page ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_page_without_credentials_is_challenged() {
    let h = make_harness("");

    let response = respond(&h.state, CLIENT, get("/", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[WWW_AUTHENTICATE],
        "Basic realm=\"Device Auth Realm\""
    );
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_page_with_credentials_serves_form_and_alerts() {
    // Arrange
    let h = make_harness("");
    let auth = basic("admin", "secret");

    // Act
    let response = respond(&h.state, CLIENT, get("/", Some(&auth))).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("name=\"keystroke\""));
    assert_eq!(
        h.notifier.events(),
        vec![AlertEvent::AuthSucceeded {
            ip: "192.168.1.77".to_string(),
            page: "/".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_named_page_is_served_only_at_its_path() {
    let h = make_harness("console");
    let auth = basic("admin", "secret");

    let at_name = respond(&h.state, CLIENT, get("/console", Some(&auth))).await;
    let at_root = respond(&h.state, CLIENT, get("/", Some(&auth))).await;

    assert_eq!(at_name.status(), StatusCode::OK);
    assert_eq!(at_root.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_three_bad_logins_block_the_client_for_an_hour() {
    // Arrange
    let h = make_harness("");
    let wrong = basic("admin", "nope");
    let right = basic("admin", "secret");

    // Act
    let first = respond(&h.state, CLIENT, get("/", Some(&wrong))).await;
    let second = respond(&h.state, CLIENT, get("/", Some(&wrong))).await;
    let third = respond(&h.state, CLIENT, get("/", Some(&wrong))).await;
    let blocked = respond(&h.state, CLIENT, get("/", Some(&right))).await;

    // Assert
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(first).await, "Authentication Failed");
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(third.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(third).await,
        "Too many failed authentication attempts - Access blocked"
    );
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(blocked).await,
        "Access blocked - too many failed authentication attempts."
    );

    let events = h.notifier.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, AlertEvent::ThresholdReached { .. })));

    // After the block window the same client may log in again.
    h.clock.advance(Duration::from_secs(3600));
    let later = respond(&h.state, CLIENT, get("/", Some(&right))).await;
    assert_eq!(later.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let h = make_harness("");
    let response = respond(&h.state, CLIENT, get("/admin", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ── /send ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_types_the_command_and_alerts() {
    // Arrange
    let h = make_harness("");
    let auth = basic("admin", "secret");

    // Act
    let response = respond(
        &h.state,
        CLIENT,
        post_send("keystroke=CTRL%2BALT%2BDEL", Some(&auth)),
    )
    .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Keystrokes sent: CTRL+ALT+DEL");
    let reports = h.sink.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].to_bytes(), [0x05, 0, 0x4C, 0, 0, 0, 0, 0]);
    assert!(reports[1].is_release());
    assert_eq!(
        h.notifier.events(),
        vec![AlertEvent::KeystrokesSent {
            ip: "192.168.1.77".to_string(),
            data: "CTRL+ALT+DEL".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_send_text_with_spaces() {
    let h = make_harness("");
    let auth = basic("admin", "secret");

    let response = respond(&h.state, CLIENT, post_send("keystroke=Hi+There", Some(&auth))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.sink.reports().len(), 14);
    assert_eq!(
        h.sink.reports()[0],
        KeyboardReport::single(HidKey::shifted(HidKeyCode::KeyH))
    );
}

#[tokio::test]
async fn test_send_without_data_is_bad_request() {
    let h = make_harness("");
    let auth = basic("admin", "secret");

    let empty = respond(&h.state, CLIENT, post_send("keystroke=", Some(&auth))).await;
    let missing = respond(&h.state, CLIENT, post_send("other=1", Some(&auth))).await;

    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(empty).await, "No keystroke data provided");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert!(h.sink.reports().is_empty());
}

#[tokio::test]
async fn test_send_without_credentials_is_forbidden() {
    let h = make_harness("");

    let response = respond(&h.state, CLIENT, post_send("keystroke=abc", None)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Authentication required");
    assert!(h.sink.reports().is_empty());
}

#[tokio::test]
async fn test_send_with_wrong_credentials_is_silent_but_counted() {
    // Arrange
    let h = make_harness("");
    let wrong = basic("admin", "nope");

    // Act
    let first = respond(&h.state, CLIENT, post_send("keystroke=abc", Some(&wrong))).await;
    let second = respond(&h.state, CLIENT, post_send("keystroke=abc", Some(&wrong))).await;
    let third = respond(&h.state, CLIENT, post_send("keystroke=abc", Some(&wrong))).await;

    // Assert
    assert_eq!(first.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(first).await, "Authentication required");
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    assert_eq!(third.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(third).await,
        "Too many failed authentication attempts - Access blocked"
    );
    assert!(h.notifier.events().is_empty());
    assert!(h.sink.reports().is_empty());
}

#[tokio::test]
async fn test_send_from_blocked_client_is_refused() {
    let h = make_harness("");
    let wrong = basic("x", "y");
    for _ in 0..3 {
        respond(&h.state, CLIENT, get("/", Some(&wrong))).await;
    }

    let response = respond(
        &h.state,
        CLIENT,
        post_send("keystroke=abc", Some(&basic("admin", "secret"))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(h.sink.reports().is_empty());
}

#[tokio::test]
async fn test_send_when_hid_not_ready_is_service_unavailable() {
    let h = make_harness("");
    h.sink.set_ready(false);

    let response = respond(
        &h.state,
        CLIENT,
        post_send("keystroke=abc", Some(&basic("admin", "secret"))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_get_on_send_is_method_not_allowed() {
    let h = make_harness("");
    let response = respond(&h.state, CLIENT, get("/send", None)).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ── Over the wire ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_answers_over_tcp_and_stops_on_flag() {
    // Arrange
    let h = make_harness("");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(
        listener,
        Arc::new(h.state),
        Arc::clone(&running),
    ));

    // Act
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: device\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    running.store(false, std::sync::atomic::Ordering::Relaxed);
    let stopped = tokio::time::timeout(Duration::from_secs(2), server).await;

    // Assert
    assert!(raw.starts_with("HTTP/1.1 401"), "got: {raw}");
    assert!(stopped.is_ok(), "accept loop must exit after the flag clears");
}
