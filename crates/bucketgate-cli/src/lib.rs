//! # Bucketgate Server
//!
//! JSON HTTP surface for the bucketgate object-storage gateway.
//!
//! This crate provides:
//! - **REST API**: bucket and object endpoints over the gateway facade
//! - **Rate Limiting**: per-client request throttling
//! - **Cancellation**: per-request deadline that reaches every backend call
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  bucketgate-cli                     │
//! ├─────────────────────────────────────────────────────┤
//! │ Request ID │ Rate Limiter │ Deadline │ CORS │ Trace │
//! ├─────────────────────────────────────────────────────┤
//! │                    Handlers                         │
//! ├─────────────────────────────────────────────────────┤
//! │                 bucketgate-core                     │
//! │     (Gateway, Retry, Executor, Paginator)           │
//! ├─────────────────────────────────────────────────────┤
//! │               bucketgate-backend                    │
//! │                 (S3, Memory)                        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{BackendKind, GatewayConfig};
pub use error::{ApiError, ErrorCode};
pub use server::{run_server, run_server_with_shutdown, shutdown_signal};
pub use state::AppState;
