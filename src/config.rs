use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

const DEFAULT_REGION: &str = "ap-south-1";
const DEFAULT_BUCKET: &str = "unorganizedbucket-dev-971709774307-ap-south-1";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Which object store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    S3,
    Local,
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    pub data_dir: String,
    pub region: String,
    pub bucket: String,
    pub max_retries: u32,
    pub endpoint_url: Option<String>,
    pub signed_urls: bool,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "User profile and file API backed by an object store")]
pub struct Args {
    /// Host to bind to (overrides PROFILE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PROFILE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides PROFILE_STORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Directory used by the local backend (overrides PROFILE_STORE_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// AWS region (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Bucket holding all objects (overrides AWS_S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Attempts per store request (overrides AWS_MAX_RETRIES)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Custom S3 endpoint such as MinIO (overrides AWS_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Allow signed URL generation (overrides AWS_S3_ENABLE_PRESIGNED_URLS)
    #[arg(long)]
    pub signed_urls: Option<bool>,

    /// Per-request timeout in seconds (overrides PROFILE_STORE_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Largest accepted upload body (overrides PROFILE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_sources(Args::parse(), |key| {
            env::var(key).ok().filter(|value| !value.is_empty())
        })
    }

    /// Merge CLI args over values from `lookup`, then over defaults.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = lookup("PROFILE_STORE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port: u16 = parse_env(&lookup, "PROFILE_STORE_PORT")?.unwrap_or(8080);
        let env_backend = match lookup("PROFILE_STORE_BACKEND") {
            Some(value) => <StoreBackend as ValueEnum>::from_str(&value, true)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("parsing PROFILE_STORE_BACKEND value `{}`", value))?,
            None => StoreBackend::S3,
        };
        let env_data_dir =
            lookup("PROFILE_STORE_DATA_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_region = lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.into());
        let env_bucket = lookup("AWS_S3_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.into());
        let env_retries = parse_retries(lookup("AWS_MAX_RETRIES").as_deref());
        let env_signed = parse_flag(lookup("AWS_S3_ENABLE_PRESIGNED_URLS").as_deref(), true);
        let env_timeout: u64 = parse_env(&lookup, "PROFILE_STORE_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let env_max_upload: usize = parse_env(&lookup, "PROFILE_STORE_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            data_dir: args.data_dir.unwrap_or(env_data_dir),
            region: args.region.unwrap_or(env_region),
            bucket: args.bucket.unwrap_or(env_bucket),
            max_retries: args.max_retries.filter(|n| *n > 0).unwrap_or(env_retries),
            endpoint_url: args.endpoint_url.or_else(|| lookup("AWS_ENDPOINT_URL")),
            signed_urls: args.signed_urls.unwrap_or(env_signed),
            request_timeout: Duration::from_secs(
                args.request_timeout_secs.unwrap_or(env_timeout).max(1),
            ),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a numeric variable strictly; a malformed value is a startup error.
fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

/// Retry count: plain decimal digits only; zero or anything else means default.
fn parse_retries(value: Option<&str>) -> u32 {
    value
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

/// `true`, `1`, and `yes` are truthy; any other non-empty value is false.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) if !v.is_empty() => matches!(v, "true" | "1" | "yes"),
        _ => default,
    }
}
