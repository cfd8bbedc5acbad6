//! HTTP server: accept loop, routing, and the lockout sweep task.
//!
//! Routes:
//!
//! | Method     | Path                  | Purpose                              |
//! |------------|-----------------------|--------------------------------------|
//! | GET / HEAD | `/` or `/{pagename}`  | Control page (HTML form)             |
//! | POST       | `/send`               | Type the `keystroke` form field      |
//!
//! Both routes go through the same [`AuthGate`], keyed by the peer's IP
//! address, and share its failure counters.  Only the control page raises
//! authentication alerts; `/send` reports the keystrokes it typed.
//! Everything else is a 404.
//!
//! # Concurrency
//!
//! Each TCP connection is served on its own Tokio task.  Keystroke output is
//! not: the single [`TypeKeystrokesUseCase`] sits behind a mutex and runs on
//! the blocking pool, so concurrent `/send` requests are typed one after the
//! other and their reports never interleave.
//!
//! Shutdown is triggered by a shared `AtomicBool` (cleared on Ctrl+C in
//! `main.rs`); the accept loop polls it every 200 ms.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;

use anyhow::Context;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use keyrelay_core::domain::Clock;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use crate::application::auth_gate::{AuthGate, Credentials, GateDecision, Notifier};
use crate::application::type_keystrokes::{EmitterTiming, HidReportSink, TypeKeystrokesUseCase};
use crate::domain::{AlertEvent, AppConfig};

/// Path of the keystroke endpoint.
pub const SEND_PATH: &str = "/send";

/// Largest request body accepted on `/send`.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

const BLOCKED_BODY: &str = "Access blocked - too many failed authentication attempts.";
const LOCKED_OUT_BODY: &str = "Too many failed authentication attempts - Access blocked";
const AUTH_FAILED_BODY: &str = "Authentication Failed";
const AUTH_REQUIRED_BODY: &str = "Authentication required";
const NO_DATA_BODY: &str = "No keystroke data provided";

const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Keystroke Sender</title>
</head>
<body>
<h2>Send Keystrokes</h2>
<form action="/send" method="post">
<input type="text" name="keystroke" size="60" autofocus>
<input type="submit" value="Send">
</form>
<p>Text is typed as-is. Named keys: ENTER, TAB, ESC, F1-F24, UP, DOWN, ...
Chords join keys with +, e.g. CTRL+ALT+DEL or WIN+r.</p>
</body>
</html>
"#;

// ── Shared state ──────────────────────────────────────────────────────────────

/// Everything a request handler needs, shared across connection tasks.
pub struct ServerState {
    gate: Arc<AuthGate>,
    typer: Arc<Mutex<TypeKeystrokesUseCase>>,
    page_path: String,
    realm: String,
}

impl ServerState {
    pub fn new(
        gate: Arc<AuthGate>,
        typer: TypeKeystrokesUseCase,
        page_path: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            typer: Arc::new(Mutex::new(typer)),
            page_path: page_path.into(),
            realm: realm.into(),
        }
    }

    /// Wires the gate and the typing use case from `config`.
    pub fn from_config(
        config: &AppConfig,
        sink: Arc<dyn HidReportSink>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let credentials = Credentials {
            username: config.auth.username.clone(),
            password: config.auth.userpass.clone(),
        };
        let gate = AuthGate::new(credentials, config.lockout.policy(), clock, notifier);
        let timing = EmitterTiming {
            press_settle: Duration::from_millis(config.hid.press_settle_ms),
            release_settle: Duration::from_millis(config.hid.release_settle_ms),
            ready_timeout: config.hid.ready_timeout(),
            ..EmitterTiming::default()
        };
        let typer = TypeKeystrokesUseCase::new(sink, timing, running);
        Self::new(
            Arc::new(gate),
            typer,
            config.http.page_path(),
            config.auth.realm.clone(),
        )
    }

    pub fn gate(&self) -> &Arc<AuthGate> {
        &self.gate
    }

    pub fn page_path(&self) -> &str {
        &self.page_path
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, or no
/// permission for a privileged port such as 80).
pub async fn run_server(
    bind_addr: SocketAddr,
    state: Arc<ServerState>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {bind_addr}"))?;

    info!("control page listening on http://{bind_addr}{}", state.page_path);
    serve(listener, state, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop continues.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("connection from {peer_addr}");
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, state).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll interval; re-check the flag.
            }
        }
    }

    Ok(())
}

/// Periodically purges expired blocks from the gate's lockout guard.
pub fn spawn_sweeper(
    gate: Arc<AuthGate>,
    every: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        // The first tick completes immediately.
        ticker.tick().await;
        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            gate.sweep();
        }
    })
}

/// Answers one request.  Routing, admission, and keystroke output all
/// happen here; the connection plumbing above only feeds requests in.
pub async fn respond<B>(state: &ServerState, peer: IpAddr, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let ip = peer.to_string();
    let path = req.uri().path().to_string();
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if path == state.page_path {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        return control_page(state, &ip, &path, authorization.as_deref());
    }

    if path == SEND_PATH {
        if req.method() != Method::POST {
            return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        return send_keystrokes(state, &ip, req, authorization.as_deref()).await;
    }

    text(StatusCode::NOT_FOUND, "Not Found")
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: Arc<ServerState>) {
    match run_connection(stream, peer_addr, state).await {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(respond(&state, peer_addr.ip(), req).await) }
    });

    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
        .with_context(|| format!("HTTP error on connection from {peer_addr}"))
}

// ── Route handlers ────────────────────────────────────────────────────────────

fn control_page(
    state: &ServerState,
    ip: &str,
    page: &str,
    authorization: Option<&str>,
) -> Response<Full<Bytes>> {
    match state.gate.admit(ip, page, authorization) {
        GateDecision::Granted => html(CONTROL_PAGE),
        GateDecision::Blocked => text(StatusCode::FORBIDDEN, BLOCKED_BODY),
        GateDecision::LockedOut => text(StatusCode::FORBIDDEN, LOCKED_OUT_BODY),
        GateDecision::ChallengeRequired => challenge(&state.realm, AUTH_REQUIRED_BODY),
        GateDecision::Failed => challenge(&state.realm, AUTH_FAILED_BODY),
    }
}

async fn send_keystrokes<B>(
    state: &ServerState,
    ip: &str,
    req: Request<B>,
    authorization: Option<&str>,
) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match state.gate.authorize(ip, SEND_PATH, authorization) {
        GateDecision::Granted => {}
        GateDecision::Blocked => return text(StatusCode::FORBIDDEN, BLOCKED_BODY),
        GateDecision::LockedOut => return text(StatusCode::FORBIDDEN, LOCKED_OUT_BODY),
        GateDecision::ChallengeRequired | GateDecision::Failed => {
            return text(StatusCode::FORBIDDEN, AUTH_REQUIRED_BODY)
        }
    }

    let data = match keystroke_field(req).await {
        Ok(Some(data)) if !data.is_empty() => data,
        Ok(_) => return text(StatusCode::BAD_REQUEST, NO_DATA_BODY),
        Err(e) => {
            warn!(client = ip, "unreadable request body: {e}");
            return text(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let typer = Arc::clone(&state.typer);
    let command = data.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let typer = typer.lock().unwrap_or_else(PoisonError::into_inner);
        typer.type_command(&command)
    })
    .await;

    match outcome {
        Ok(Ok(count)) => {
            info!(client = ip, keystrokes = count, "keystrokes sent");
            debug!(client = ip, data = %data, "keystroke data");
            state.gate.notify(AlertEvent::KeystrokesSent {
                ip: ip.to_string(),
                data: data.clone(),
            });
            text(StatusCode::OK, format!("Keystrokes sent: {data}"))
        }
        Ok(Err(e)) => {
            error!(client = ip, "keystroke output failed: {e}");
            text(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Keystroke output failed: {e}"),
            )
        }
        Err(e) => {
            error!(client = ip, "keystroke worker did not finish: {e}");
            text(StatusCode::SERVICE_UNAVAILABLE, "Keystroke output failed")
        }
    }
}

/// Pulls the `keystroke` field out of a urlencoded form body, falling back to
/// the query string.
async fn keystroke_field<B>(
    req: Request<B>,
) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let query = req.uri().query().map(str::to_string);
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await?
        .to_bytes();

    let from_body = form_field(&body, "keystroke");
    Ok(from_body.or_else(|| query.and_then(|q| form_field(q.as_bytes(), "keystroke"))))
}

fn form_field(input: &[u8], name: &str) -> Option<String> {
    form_urlencoded::parse(input)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// ── Response helpers ──────────────────────────────────────────────────────────

fn text(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn html(body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn challenge(realm: &str, body: &str) -> Response<Full<Bytes>> {
    let mut response = text(StatusCode::UNAUTHORIZED, body);
    let value = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"keyrelay\""));
    response.headers_mut().insert(WWW_AUTHENTICATE, value);
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────
