//! Application state

use crate::config::{BackendKind, GatewayConfig};
use bucketgate_backend::{MemoryBackend, S3Backend, StorageBackend};
use bucketgate_core::Gateway;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Facade over the single shared backend handle
    pub gateway: Gateway,
    /// Memory backend handle, kept to verify memory-mode share links
    pub memory: Option<MemoryBackend>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The backend client is built here, once, and shared by every request.
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        let (backend, memory): (Arc<dyn StorageBackend>, Option<MemoryBackend>) = match config.backend {
            BackendKind::Memory => {
                warn!("⚠ Storage mode: In-memory (NOT persistent - for development only)");
                if config.share_links_unreachable() {
                    warn!(
                        base_url = %config.public_url(),
                        "Share links use a wildcard bind address; set BUCKETGATE_PUBLIC_URL so remote clients can open them"
                    );
                }
                let memory = MemoryBackend::with_config(config.memory_config());
                (Arc::new(memory.clone()), Some(memory))
            }
            BackendKind::S3 => {
                if config.credentials.is_none() {
                    warn!("No AWS credentials in the environment, requests will be unsigned");
                }
                let backend = S3Backend::new(config.s3_config())?;
                info!(
                    endpoint = %config.s3_endpoint,
                    region = %config.s3_region,
                    path_style = config.s3_path_style,
                    "✓ Storage mode: S3"
                );
                (Arc::new(backend), None)
            }
        };

        let gateway = Gateway::with_options(backend, config.gateway_options());

        Ok(Self {
            config,
            gateway,
            memory,
        })
    }
}
