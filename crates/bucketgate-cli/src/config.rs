//! Gateway configuration

use bucketgate_backend::{Credentials, MemoryConfig, S3Config};
use bucketgate_core::{GatewayOptions, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which object store the gateway fronts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store, data does not persist
    Memory,
    /// S3-compatible service
    S3,
}

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL clients use to reach this gateway (memory-mode share links)
    pub public_url: Option<String>,
    /// Backend selection
    pub backend: BackendKind,
    /// S3 endpoint URL
    pub s3_endpoint: String,
    /// S3 signing region
    pub s3_region: String,
    /// Use path-style bucket addressing
    pub s3_path_style: bool,
    /// Buckets are versioned, so puts are not replayed after a possible write
    pub s3_versioned_buckets: bool,
    /// Per-call backend timeout (seconds)
    pub backend_timeout_secs: u64,
    /// Access credentials, taken from the environment
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    /// Share link lifetime (seconds)
    pub share_link_ttl_secs: u64,
    /// Maximum presign calls in flight per listing
    pub max_concurrency: usize,
    /// Keys requested per listing page
    pub page_size: usize,
    /// Attempts per backend call, the first one included
    pub retry_max_attempts: u32,
    /// Backoff after the first failure (milliseconds)
    pub retry_base_delay_ms: u64,
    /// Backoff cap (milliseconds)
    pub retry_max_delay_ms: u64,
    /// Whole-request deadline (seconds)
    pub request_timeout_secs: u64,
    /// Rate limit (requests per second per client, 0 disables)
    pub rate_limit_rps: u32,
    /// Identify clients by `x-forwarded-for` (only behind a trusted proxy)
    pub trust_proxy: bool,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Enable CORS
    pub cors_enabled: bool,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
            backend: BackendKind::Memory,
            s3_endpoint: "https://s3.amazonaws.com".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_path_style: false,
            s3_versioned_buckets: false,
            backend_timeout_secs: 30,
            credentials: None,
            share_link_ttl_secs: 60,
            max_concurrency: 16,
            page_size: 1000,
            retry_max_attempts: 5,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            request_timeout_secs: 60,
            rate_limit_rps: 100,
            trust_proxy: false,
            max_body_size: 64 * 1024 * 1024, // 64 MiB
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL embedded in memory-mode share links
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind_addr()),
        }
    }

    /// No `public_url` and a wildcard bind address, so share links would
    /// point at an address remote clients cannot reach
    pub fn share_links_unreachable(&self) -> bool {
        self.public_url.is_none()
            && self
                .host
                .trim_matches(|c| c == '[' || c == ']')
                .parse::<std::net::IpAddr>()
                .is_ok_and(|ip| ip.is_unspecified())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            share_link_ttl: Duration::from_secs(self.share_link_ttl_secs),
            max_concurrency: self.max_concurrency,
            page_size: self.page_size,
            retry: RetryConfig::default()
                .with_max_attempts(self.retry_max_attempts)
                .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
                .with_max_delay(Duration::from_millis(self.retry_max_delay_ms)),
        }
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            path_style: self.s3_path_style,
            versioned_buckets: self.s3_versioned_buckets,
            timeout: Duration::from_secs(self.backend_timeout_secs),
            credentials: self.credentials.clone(),
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            page_size: self.page_size,
            base_url: format!("{}/share", self.public_url()),
            latency: None,
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.share_link_ttl_secs == 0 {
            return Err("share link TTL must be at least one second".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("max concurrency must be at least 1".to_string());
        }
        if self.page_size == 0 || self.page_size > 1000 {
            return Err("page size must be between 1 and 1000".to_string());
        }
        if self.retry_max_attempts == 0 {
            return Err("retry attempts must be at least 1".to_string());
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err("retry base delay cannot exceed the retry cap".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");

        let options = config.gateway_options();
        assert_eq!(options.share_link_ttl, Duration::from_secs(60));
        assert_eq!(options.max_concurrency, 16);
        assert_eq!(options.retry.max_attempts, 5);
    }

    #[test]
    fn test_public_url() {
        let mut config = GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 9001,
            ..Default::default()
        };
        assert_eq!(config.memory_config().base_url, "http://127.0.0.1:9001/share");

        config.public_url = Some("https://files.example.com/".to_string());
        assert_eq!(config.memory_config().base_url, "https://files.example.com/share");
    }

    #[test]
    fn test_share_links_unreachable() {
        let mut config = GatewayConfig::default();
        assert!(config.share_links_unreachable());

        config.public_url = Some("https://files.example.com".to_string());
        assert!(!config.share_links_unreachable());

        let config = GatewayConfig {
            host: "127.0.0.1".to_string(),
            ..Default::default()
        };
        assert!(!config.share_links_unreachable());

        let config = GatewayConfig {
            host: "::".to_string(),
            ..Default::default()
        };
        assert!(config.share_links_unreachable());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = GatewayConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GatewayConfig {
            retry_base_delay_ms: 10_000,
            retry_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_skips_credentials() {
        let config = GatewayConfig {
            credentials: Some(Credentials::new("AKID", "secret")),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"backend\":\"memory\""));
    }
}
