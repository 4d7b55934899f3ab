use anyhow::{Context, Result};
use clap::Parser;
use std::env;

const DEFAULT_MAX_UPLOAD_MB: usize = 100;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub access: AccessConfig,
}

/// Access rules handed to every handler through `AppState`.
#[derive(Clone, Default)]
pub struct AccessConfig {
    /// Shared secret for uploads, upload link creation and restricted listing.
    /// `None` disables authorization checks.
    pub api_key: Option<String>,

    /// Require the API key to view `/files`.
    pub restrict_listing: bool,
}

impl AccessConfig {
    /// Whether `candidate` satisfies the configured secret.
    ///
    /// Always true when no secret is configured.
    pub fn authorizes(&self, candidate: Option<&str>) -> bool {
        match &self.api_key {
            Some(expected) => candidate == Some(expected.as_str()),
            None => true,
        }
    }
}

impl std::fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("restrict_listing", &self.restrict_listing)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Personal content-delivery service")]
pub struct Args {
    /// Host to bind to (overrides POCKET_CDN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides POCKET_CDN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides POCKET_CDN_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides POCKET_CDN_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted upload body in MiB (overrides POCKET_CDN_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// API secret for uploads and restricted listing (overrides POCKET_CDN_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Require the API key to view the file listing (overrides POCKET_CDN_VIEW_LIST_WITH_PASS)
    #[arg(long)]
    pub restrict_listing: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("POCKET_CDN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("POCKET_CDN_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing POCKET_CDN_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading POCKET_CDN_PORT"),
        };
        let env_storage =
            env::var("POCKET_CDN_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("POCKET_CDN_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/pocket_cdn.db".into());
        let env_max_upload_mb = match env::var("POCKET_CDN_MAX_UPLOAD_MB") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing POCKET_CDN_MAX_UPLOAD_MB value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_MAX_UPLOAD_MB,
            Err(err) => return Err(err).context("reading POCKET_CDN_MAX_UPLOAD_MB"),
        };
        let env_api_key = env::var("POCKET_CDN_API_KEY").ok();
        let env_restrict = env::var("POCKET_CDN_VIEW_LIST_WITH_PASS")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        let max_upload_mb = args.max_upload_mb.unwrap_or(env_max_upload_mb);
        let max_upload_bytes = max_upload_bytes(max_upload_mb)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_bytes,
            access: AccessConfig {
                api_key: normalize_secret(args.api_key.or(env_api_key)),
                restrict_listing: args.restrict_listing || env_restrict,
            },
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Convert the configured upload limit from MiB to bytes.
fn max_upload_bytes(mb: usize) -> Result<usize> {
    mb.checked_mul(1024 * 1024)
        .with_context(|| format!("max upload size of {} MiB is too large", mb))
}

/// An empty secret counts as no secret.
fn normalize_secret(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
