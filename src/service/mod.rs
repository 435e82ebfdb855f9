//! Envelope Kernel REST Service
//!
//! Exposes canonicalization, reply-context extraction and edit mirroring
//! over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/canonicalize` - Canonical form and fingerprint of a JSON document
//! - `POST /api/reply_context` - Reply context of an envelope
//! - `POST /webhook/chatwoot/:instance_name` - Helpdesk webhook; mirrors edits
//! - `GET /health` - Service health
//! - `GET /health/live` - Liveness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_canonicalize_metrics, record_edit_outcome};
pub use routes::{create_router, AppState};
pub use state::ServiceState;
