//! Alert delivery.
//!
//! [`WebhookNotifier`] posts `{"text": "<message>"}` to a Slack-style
//! incoming webhook.  Delivery is fire-and-forget: each alert is sent from
//! its own Tokio task, and failures are logged and dropped so a slow or
//! unreachable webhook never holds up a request.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::auth_gate::Notifier;
use crate::domain::AlertEvent;

/// Host used when the webhook is configured as a bare path.
pub const DEFAULT_WEBHOOK_HOST: &str = "https://hooks.slack.com";

/// Error type for a single webhook delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Expands a configured webhook into a full URL.
///
/// Full `http(s)://` URLs are used as-is; anything else is treated as a path
/// on [`DEFAULT_WEBHOOK_HOST`].  Returns `None` when alerts are disabled.
pub fn webhook_url(configured: &str) -> Option<String> {
    let configured = configured.trim();
    if configured.is_empty() {
        return None;
    }
    if configured.starts_with("http://") || configured.starts_with("https://") {
        return Some(configured.to_string());
    }
    let path = configured.trim_start_matches('/');
    Some(format!("{DEFAULT_WEBHOOK_HOST}/{path}"))
}

/// Builds the notifier for a configured webhook: a [`WebhookNotifier`], or a
/// [`NullNotifier`] when the setting is empty.
pub fn build_notifier(configured: &str) -> Arc<dyn Notifier> {
    match webhook_url(configured) {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(NullNotifier),
    }
}

/// Posts alerts to an incoming webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Sends one message and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the request cannot be made and
    /// [`NotifyError::Status`] for a non-2xx reply.
    pub async fn post(&self, message: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status()));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: AlertEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; dropping alert: {event}");
            return;
        };
        let this = self.clone();
        runtime.spawn(async move {
            let message = event.to_string();
            match this.post(&message).await {
                Ok(()) => debug!("alert delivered"),
                Err(e) => warn!("alert delivery failed: {e}"),
            }
        });
    }
}

/// Discards every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, event: AlertEvent) {
        debug!("alerts disabled; not sending: {event}");
    }
}

/// Keeps every alert in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alerts raised so far.
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: AlertEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
