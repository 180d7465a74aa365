//! Bucketgate: a resilient HTTP gateway in front of S3-compatible storage.
//!
//! Re-exports the workspace crates under one name.

pub use bucketgate_backend as backend;
pub use bucketgate_cli as server;
pub use bucketgate_core as gateway;
