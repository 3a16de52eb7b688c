use anyhow::{Context, Result, bail};
use axum::http::HeaderValue;
use clap::Parser;
use std::{env, str::FromStr};

/// Settings the request handler consumes on every request.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allow_origins: HeaderValue,
    /// Serve the `/ppx-server` frame document.
    pub enable_ppx: bool,
    /// Largest `Content-Length` accepted by `POST /publish`.
    pub max_payload_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_origins: HeaderValue::from_static("*"),
            enable_ppx: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub public_url: String,
    pub settings: Settings,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Publish JSON and HTML snippets over HTTP")]
pub struct Args {
    /// Host to bind to (overrides HACKPUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides HACKPUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where published content is written (overrides HACKPUB_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides HACKPUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// URL prefix under which the storage directory is served (overrides HACKPUB_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Access-Control-Allow-Origin value (overrides ALLOW_ORIGINS)
    #[arg(long)]
    pub allow_origins: Option<String>,

    /// Serve the /ppx-server frame (or set ENABLE_PPX)
    #[arg(long)]
    pub enable_ppx: bool,

    /// Maximum publish payload in bytes (overrides MAX_PAYLOAD_SIZE)
    #[arg(long)]
    pub max_payload_size: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge parsed arguments over the environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("HACKPUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("HACKPUB_PORT", 3000u16)?;
        let env_storage =
            env::var("HACKPUB_STORAGE_DIR").unwrap_or_else(|_| "./data/published".into());
        let env_db = env::var("HACKPUB_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/hackpub.db".into());
        let env_public = env::var("HACKPUB_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000/published".into());
        let env_origins = env::var("ALLOW_ORIGINS").unwrap_or_else(|_| "*".into());
        let env_ppx = match env::var("ENABLE_PPX") {
            Ok(value) => parse_flag(&value)
                .with_context(|| format!("parsing ENABLE_PPX value `{}`", value))?,
            Err(env::VarError::NotPresent) => false,
            Err(err) => return Err(err).context("reading ENABLE_PPX"),
        };
        let env_max = parse_env("MAX_PAYLOAD_SIZE", DEFAULT_MAX_PAYLOAD_SIZE)?;

        // --- Merge ---
        let origins = args.allow_origins.unwrap_or(env_origins);
        let allow_origins = HeaderValue::from_str(&origins)
            .with_context(|| format!("ALLOW_ORIGINS value `{}` is not a valid header", origins))?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.unwrap_or(env_public),
            settings: Settings {
                allow_origins,
                enable_ppx: args.enable_ppx || env_ppx,
                max_payload_size: args.max_payload_size.unwrap_or(env_max),
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse `name`, falling back to `default` when it is unset.
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}
