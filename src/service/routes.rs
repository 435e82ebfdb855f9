//! Axum routes for the envelope kernel service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonical_hash_hex, BigIntMode, VisitedSet};
use crate::edit::{EditOutcome, InstanceRef, LoggingMessagingClient, MessagingClient};
use crate::extract::extract_reply_context_with;
use crate::store::{InMemoryMessageStore, MessageStore};
use crate::types::{ReplyContextSummary, ValueGraph};
use crate::ENVELOPE_KERNEL_SCHEMA_VERSION;

use super::middleware::{record_canonicalize_metrics, record_edit_outcome};
use super::state::ServiceState;

/// Service state used by the binary.
pub type AppState = ServiceState<InMemoryMessageStore, LoggingMessagingClient>;

type SharedState<S, C> = State<Arc<ServiceState<S, C>>>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Canonical form of a posted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalizeResponse {
    /// Canonical value; `null` when the input is absent.
    pub canonical: Option<Value>,
    /// xxh64 fingerprint of the canonical value.
    pub fingerprint: Option<String>,
    /// Big-integer mode in effect.
    pub bigint_mode: BigIntMode,
}

/// Query parameters of the webhook endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookQuery {
    /// Instance id, when the caller knows it.
    pub instance_id: Option<String>,
    /// Instance id resolved upstream; wins over `instance_id`.
    pub resolved_instance_id: Option<String>,
}

/// Result of a webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    /// Whether the event was consumed.
    pub handled: bool,
    /// Detailed outcome.
    #[serde(flatten)]
    pub outcome: EditOutcome,
}

/// Service health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Canonical schema version.
    pub schema_version: String,
    /// Big-integer mode in effect.
    pub bigint_mode: BigIntMode,
    /// Whether an outbound client is configured.
    pub mirroring_enabled: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(code = %self.code, error = %self.error, "Request error");
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Route Handlers
// ============================================================================

/// Canonicalize a posted JSON document.
///
/// Limits configured on the canonicalizer are enforced strictly here.
async fn canonicalize_handler<S, C>(
    State(state): SharedState<S, C>,
    Json(body): Json<Value>,
) -> Result<Json<CanonicalizeResponse>, ApiError>
where
    S: MessageStore + 'static,
    C: MessagingClient + 'static,
{
    let start = Instant::now();
    let (graph, root) = ValueGraph::from_json(&body);

    let canonical = state
        .canonicalizer()
        .try_canonicalize(&graph, &root, &mut VisitedSet::new())
        .map_err(|e| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::new("LIMIT_EXCEEDED", e.to_string())),
            )
        })?;

    record_canonicalize_metrics(graph.len(), start.elapsed().as_millis() as u64);

    Ok(Json(CanonicalizeResponse {
        fingerprint: canonical.as_ref().map(canonical_hash_hex),
        canonical,
        bigint_mode: state.canonicalizer().options().bigint_mode,
    }))
}

/// Extract the reply context of a posted envelope.
async fn reply_context_handler<S, C>(
    State(state): SharedState<S, C>,
    Json(body): Json<Value>,
) -> Json<ReplyContextSummary>
where
    S: MessageStore + 'static,
    C: MessagingClient + 'static,
{
    let (graph, root) = ValueGraph::from_json(&body);
    let context = extract_reply_context_with(state.canonicalizer(), &graph, Some(&root));
    Json(context.summary())
}

/// Receive a helpdesk webhook and mirror edits.
async fn webhook_handler<S, C>(
    State(state): SharedState<S, C>,
    Path(instance_name): Path<String>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<Value>,
) -> Result<Json<WebhookResponse>, ApiError>
where
    S: MessageStore + 'static,
    C: MessagingClient + 'static,
{
    let instance = InstanceRef::new(instance_name, query.instance_id);

    let outcome = state
        .mirror()
        .handle(&body, &instance, query.resolved_instance_id.as_deref(), state.client.as_deref())
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("EDIT_FAILED", e.to_string()).with_details(instance.instance_name.clone())),
            )
        })?;

    record_edit_outcome(&outcome);

    Ok(Json(WebhookResponse {
        handled: outcome.handled(),
        outcome,
    }))
}

/// Health check endpoint.
async fn health_handler<S, C>(State(state): SharedState<S, C>) -> Json<HealthResponse>
where
    S: MessageStore + 'static,
    C: MessagingClient + 'static,
{
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: ENVELOPE_KERNEL_SCHEMA_VERSION.to_string(),
        bigint_mode: state.canonicalizer().options().bigint_mode,
        mirroring_enabled: state.client.is_some(),
    })
}

/// Liveness probe endpoint.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the envelope kernel service.
pub fn create_router<S, C>(state: ServiceState<S, C>) -> Router
where
    S: MessageStore + 'static,
    C: MessagingClient + 'static,
{
    let state = Arc::new(state);

    Router::new()
        .route("/api/canonicalize", post(canonicalize_handler::<S, C>))
        .route("/api/reply_context", post(reply_context_handler::<S, C>))
        .route("/webhook/chatwoot/:instance_name", post(webhook_handler::<S, C>))
        .route("/health", get(health_handler::<S, C>))
        .route("/health/live", get(liveness_handler))
        .with_state(state)
}
