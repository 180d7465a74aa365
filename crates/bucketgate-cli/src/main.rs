//! Bucketgate - resilient object-storage gateway

use bucketgate_backend::Credentials;
use bucketgate_cli::{BackendKind, GatewayConfig, run_server_with_shutdown, shutdown_signal};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bucketgate")]
#[command(about = "Resilient HTTP gateway for S3-compatible object storage")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "BUCKETGATE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "BUCKETGATE_PORT")]
    port: u16,

    /// Base URL clients use to reach the gateway
    #[arg(long, env = "BUCKETGATE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Storage backend
    #[arg(long, value_enum, default_value = "memory", env = "BUCKETGATE_BACKEND")]
    backend: BackendKind,

    /// S3 endpoint URL
    #[arg(long, default_value = "https://s3.amazonaws.com", env = "S3_ENDPOINT")]
    s3_endpoint: String,

    /// S3 region
    #[arg(long, default_value = "us-east-1", env = "AWS_REGION")]
    s3_region: String,

    /// Use path-style addressing (MinIO, Ceph, LocalStack)
    #[arg(long, env = "S3_PATH_STYLE")]
    s3_path_style: bool,

    /// Buckets are versioned; uploads are never replayed after a possible write
    #[arg(long, env = "S3_VERSIONED_BUCKETS")]
    s3_versioned_buckets: bool,

    /// Share link lifetime in seconds
    #[arg(long, default_value = "60", env = "BUCKETGATE_SHARE_TTL_SECS")]
    share_ttl_secs: u64,

    /// Maximum concurrent presign calls per listing
    #[arg(long, default_value = "16", env = "BUCKETGATE_MAX_CONCURRENCY")]
    max_concurrency: usize,

    /// Keys requested per listing page
    #[arg(long, default_value = "1000", env = "BUCKETGATE_PAGE_SIZE")]
    page_size: usize,

    /// Attempts per backend call
    #[arg(long, default_value = "5", env = "BUCKETGATE_RETRY_ATTEMPTS")]
    retry_attempts: u32,

    /// Backoff after the first failure, in milliseconds
    #[arg(long, default_value = "100", env = "BUCKETGATE_RETRY_BASE_MS")]
    retry_base_ms: u64,

    /// Backoff cap, in milliseconds
    #[arg(long, default_value = "5000", env = "BUCKETGATE_RETRY_CAP_MS")]
    retry_cap_ms: u64,

    /// Whole-request deadline in seconds
    #[arg(long, default_value = "60", env = "BUCKETGATE_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Requests per second per client (0 disables)
    #[arg(long, default_value = "100", env = "BUCKETGATE_RATE_LIMIT")]
    rate_limit: u32,

    /// Key the rate limit on x-forwarded-for (only behind a trusted proxy)
    #[arg(long, env = "BUCKETGATE_TRUST_PROXY")]
    trust_proxy: bool,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "67108864", env = "BUCKETGATE_MAX_BODY_SIZE")]
    max_body_size: usize,

    /// Enable debug logging
    #[arg(short, long, env = "BUCKETGATE_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "bucketgate_cli={lvl},bucketgate_core={lvl},bucketgate_backend={lvl},tower_http=debug",
                lvl = log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Bucketgate on {}:{}", args.host, args.port);

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        public_url: args.public_url,
        backend: args.backend,
        s3_endpoint: args.s3_endpoint,
        s3_region: args.s3_region,
        s3_path_style: args.s3_path_style,
        s3_versioned_buckets: args.s3_versioned_buckets,
        credentials: Credentials::from_env(),
        share_link_ttl_secs: args.share_ttl_secs,
        max_concurrency: args.max_concurrency,
        page_size: args.page_size,
        retry_max_attempts: args.retry_attempts,
        retry_base_delay_ms: args.retry_base_ms,
        retry_max_delay_ms: args.retry_cap_ms,
        request_timeout_secs: args.request_timeout_secs,
        rate_limit_rps: args.rate_limit,
        trust_proxy: args.trust_proxy,
        max_body_size: args.max_body_size,
        ..Default::default()
    };

    if config.backend == BackendKind::S3 {
        tracing::info!("S3 endpoint: {} ({})", config.s3_endpoint, config.s3_region);
    }

    run_server_with_shutdown(config, shutdown_signal()).await
}
