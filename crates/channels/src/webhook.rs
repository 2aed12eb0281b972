//! Generic HTTP webhook connector.
//!
//! External systems POST JSON to the configured path; replies are either
//! pushed to a `callback_url` from the reply metadata or parked until the
//! caller polls `GET {path}/response/{conversation_id}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use proto::{
    ChannelError, ConfigError, Content, Conversation, ConversationKind, Metadata,
    OutgoingMessage, Sender, ShutdownSignal,
};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::adapter::Connector;
use crate::registry::ConnectorSpec;
use crate::runtime::ConnectorContext;

type HmacSha256 = Hmac<Sha256>;

const SECRET_HEADER: &str = "x-webhook-secret";
const SIGNATURE_HEADER: &str = "x-webhook-signature";
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener settings resolved from the connector config.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookSettings {
    pub host: String,
    pub port: u16,
    /// Route prefix, always starting with `/` and without trailing `/`.
    pub path: String,
    /// Shared secret; `None` accepts unauthenticated posts.
    pub secret: Option<String>,
}

impl WebhookSettings {
    /// Reads `host`, `port`, `path` and `secret` (falling back to
    /// `WEBHOOK_SECRET`).
    pub fn from_spec(spec: &ConnectorSpec) -> Result<Self, ConfigError> {
        let config = &spec.config;
        let path = config.get_string_or("path", "/webhook", None);
        let path = format!("/{}", path.trim().trim_matches('/'));
        if path == "/" {
            return Err(ConfigError::InvalidValue {
                field: "path".to_string(),
                reason: "webhook path must not be the root".to_string(),
            });
        }

        Ok(Self {
            host: config.get_string_or("host", "0.0.0.0", None),
            port: config.get_port("port", 8080, None)?,
            path,
            secret: config
                .get_str("secret", Some("WEBHOOK_SECRET"))
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Webhook connector backed by an axum server.
pub struct WebhookConnector {
    settings: WebhookSettings,
    http: reqwest::Client,
    pending: Arc<DashMap<String, String>>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Option<SocketAddr>,
}

impl WebhookConnector {
    pub fn from_spec(spec: &ConnectorSpec) -> Result<Self, ConfigError> {
        Ok(Self::new(WebhookSettings::from_spec(spec)?))
    }

    pub fn new(settings: WebhookSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            pending: Arc::new(DashMap::new()),
            listener: Mutex::new(None),
            local_addr: None,
        }
    }

    pub fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    /// Bound address, known once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of replies waiting to be polled.
    pub fn pending_responses(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Clone)]
struct WebhookState {
    ctx: Arc<ConnectorContext>,
    secret: Option<String>,
    pending: Arc<DashMap<String, String>>,
}

const DEFAULT_SENDER: &str = "webhook-user";
const DEFAULT_CHANNEL: &str = "webhook";

/// Inbound POST body.
#[derive(Debug, Deserialize)]
struct WebhookPost {
    #[serde(default)]
    text: String,
    sender: Option<String>,
    display_name: Option<String>,
    channel: Option<String>,
    thread_id: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

#[async_trait]
impl Connector for WebhookConnector {
    fn connector_type(&self) -> &str {
        "webhook"
    }

    async fn connect(&mut self, ctx: &ConnectorContext) -> Result<(), ChannelError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("bind {addr} failed: {e}")))?;
        self.local_addr = listener.local_addr().ok();
        *self.listener.lock() = Some(listener);

        if self.settings.secret.is_none() {
            warn!("Webhook connector '{}' accepts unauthenticated posts", ctx.name());
        }
        info!(
            "Webhook connector '{}' listening on {addr}{}",
            ctx.name(),
            self.settings.path
        );
        Ok(())
    }

    async fn run_loop(
        &self,
        ctx: &ConnectorContext,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ChannelError> {
        let listener = self.listener.lock().take().ok_or(ChannelError::Closed)?;
        let state = WebhookState {
            ctx: Arc::new(ctx.clone()),
            secret: self.settings.secret.clone(),
            pending: self.pending.clone(),
        };
        let app = router(&self.settings.path, state);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("server error: {e}")))
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), ChannelError> {
        let Some(callback) = msg.metadata_str("callback_url") else {
            self.pending
                .insert(msg.conversation_id.clone(), msg.text.clone());
            return Ok(());
        };

        let mut body = json!({
            "text": msg.text,
            "conversation_id": msg.conversation_id,
            "message_id": msg.id,
        });
        if let Some(thread_id) = &msg.thread_id {
            body["thread_id"] = json!(thread_id);
        }

        self.http
            .post(callback)
            .timeout(CALLBACK_TIMEOUT)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ChannelError::SendFailed(format!("callback {callback}: {e}")))?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        self.listener.lock().take();
        info!("Webhook connector stopped");
        Ok(())
    }
}

fn router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, post(receive))
        .route(&format!("{path}/health"), get(health))
        .route(&format!("{path}/response/{{conversation_id}}"), get(poll_response))
        .with_state(state)
}

async fn receive(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.secret
        && let Err(e) = authenticate(&headers, &body, secret)
    {
        warn!("Webhook authentication failed: {e}");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let post: WebhookPost = match serde_json::from_slice(&body) {
        Ok(post) => post,
        Err(e) => {
            warn!("Invalid webhook payload: {e}");
            return error_response(StatusCode::BAD_REQUEST, "invalid JSON");
        }
    };
    if post.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text required");
    }

    let msg = build_message(&state.ctx, post);
    if let Err(e) = state.ctx.write_to_inbox(&msg) {
        error!("Failed to write webhook message to inbox: {e}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "inbox unavailable");
    }

    Json(json!({ "status": "delivered", "message_id": msg.id })).into_response()
}

async fn health(State(state): State<WebhookState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "connector": state.ctx.name() }))
}

async fn poll_response(
    State(state): State<WebhookState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.pending.remove(&conversation_id) {
        Some((_, text)) => Json(json!({ "text": text })).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn build_message(ctx: &ConnectorContext, post: WebhookPost) -> proto::Message {
    let sender_id = post.sender.unwrap_or_else(|| DEFAULT_SENDER.to_string());
    let display_name = post.display_name.unwrap_or_else(|| sender_id.clone());
    let channel = post.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

    let mut conversation =
        Conversation::new(channel.clone(), ConversationKind::Channel).with_name(channel);
    if let Some(thread_id) = post.thread_id {
        conversation = conversation.with_thread(thread_id);
    }

    ctx.new_message(
        Sender::new(sender_id.clone(), sender_id).with_display_name(display_name),
        Content::text(post.text),
        conversation,
    )
    .with_metadata(post.metadata)
}

/// Accepts either the shared secret in `X-Webhook-Secret` or an HMAC-SHA256
/// of the body in `X-Webhook-Signature: sha256=<hex>`.
fn authenticate(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), String> {
    if let Some(given) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return if constant_time_eq(given.as_bytes(), secret.as_bytes()) {
            Ok(())
        } else {
            Err("secret mismatch".to_string())
        };
    }
    if headers.contains_key(SIGNATURE_HEADER) {
        return verify_hmac_signature(headers, body, secret);
    }
    Err("missing X-Webhook-Secret header".to_string())
}

fn verify_hmac_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or("Unreadable X-Webhook-Signature header")?;
    let hex_sig = sig_header
        .strip_prefix("sha256=")
        .ok_or("Signature does not start with sha256=")?;
    let expected = hex::decode(hex_sig).map_err(|e| format!("Signature is not hex: {e}"))?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| format!("HMAC init: {e}"))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "HMAC mismatch".to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
