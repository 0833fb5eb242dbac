use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::audit::AuditEntry;
use crate::models::environment::Environment;

// ── Webhook Event Types ───────────────────────────────────────

/// A structured governance event sent to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceEvent {
    /// Event type identifier, e.g. "approval.approved", "environment.unlocked".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// User who triggered the event.
    pub actor_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub environment: Option<Environment>,
    /// Event-specific details (counts, comment, reason, etc.).
    pub details: serde_json::Value,
}

impl GovernanceEvent {
    /// Every audited governance write doubles as a webhook event.
    pub fn from_audit(entry: &AuditEntry) -> Self {
        Self {
            event_type: entry.action.clone(),
            timestamp: entry.created_at.to_rfc3339(),
            actor_id: entry.actor_id.clone(),
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
            environment: entry.environment,
            details: entry.details.clone(),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid webhook signing key: {}", e))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches governance events to the configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Opzenix-Signature header)
/// - Retries with back-off (1s → 5s → 25s by default)
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    signing_secret: Option<String>,
    backoff_secs: Vec<u64>,
    /// Deliveries spawned by `dispatch` that have not been flushed yet.
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Opzenix-Webhook/1.0")
            .build()?;
        Ok(Self {
            client,
            urls,
            signing_secret,
            backoff_secs: vec![0, 1, 5, 25],
            in_flight: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Override the delay before each attempt. One entry per attempt.
    pub fn with_backoff(mut self, backoff_secs: Vec<u64>) -> Self {
        self.backoff_secs = backoff_secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Send a signed event to a single URL with retry.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send(&self, url: &str, event: &GovernanceEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = match &self.signing_secret {
            Some(secret) => Some(hmac_sha256_hex(secret, &payload)?),
            None => None,
        };

        for (attempt, &delay) in self.backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-opzenix-delivery-id", &delivery_id)
                .header("x-opzenix-timestamp", &timestamp)
                .header("x-opzenix-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-opzenix-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %status,
                        body = %body,
                        "webhook delivery failed (non-2xx)"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error"
                    );
                }
            }
        }

        Err(anyhow::anyhow!(
            "webhook delivery failed after {} attempts: {}",
            self.backoff_secs.len(),
            url
        ))
    }

    /// Dispatch an event to all configured URLs (fire-and-forget).
    ///
    /// Each URL is attempted independently; failures in one do not block others.
    pub fn dispatch(&self, event: GovernanceEvent) {
        if self.urls.is_empty() {
            return;
        }

        let notifier = self.clone();
        let handle = tokio::spawn(async move {
            for url in &notifier.urls {
                if let Err(e) = notifier.send(url, &event).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });

        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
            }
            Err(_) => warn!("webhook task list poisoned, delivery will not be awaited"),
        }
    }

    /// Wait for every delivery started by `dispatch`. Short-lived callers
    /// such as one-shot CLI commands must call this before the runtime exits.
    /// Returns the number of deliveries awaited.
    pub async fn flush(&self) -> usize {
        let pending = match self.in_flight.lock() {
            Ok(mut in_flight) => std::mem::take(&mut *in_flight),
            Err(_) => return 0,
        };
        let count = pending.len();
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "webhook delivery task failed");
            }
        }
        if count > 0 {
            debug!(count, "flushed webhook deliveries");
        }
        count
    }
}

// ── Tests ─────────────────────────────────────────────────────
