//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CLUSTERSCOPE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CLUSTERSCOPE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CLUSTERSCOPE_PROBES__INTERVAL=15s` sets the `probes.interval` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Upstream**: `upstream.origin`, `upstream.prefixes` - where forwarded service calls go
//! - **Probes**: `probes.interval`, `probes.timeout`, `probes.services` - per-service liveness and DB checks
//! - **Snapshot**: `snapshot.interval`, `snapshot.timeout`, `snapshot.aggregator_url` - aggregator polling
//! - **Features**: `enable_metrics`, `enable_otel_export` - optional feature toggles
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! CLUSTERSCOPE_PORT=8080
//!
//! # Point the proxy and probes at another environment
//! CLUSTERSCOPE_UPSTREAM__ORIGIN="https://backend.example.com"
//!
//! # Poll the aggregator more often
//! CLUSTERSCOPE_SNAPSHOT__INTERVAL=15s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use url::Url;

const DEFAULT_UPSTREAM_ORIGIN: &str = "https://backend-stage.vacademy.io";

/// Path prefixes forwarded to the upstream origin, in match order.
pub const DEFAULT_SERVICE_PREFIXES: [&str; 7] = [
    "/auth-service",
    "/admin-core-service",
    "/media-service",
    "/assessment-service",
    "/notification-service",
    "/ai-service",
    "/community-service",
];

/// Services probed for liveness and database health by default.
pub const DEFAULT_PROBED_SERVICES: [&str; 6] = [
    "auth-service",
    "admin-core-service",
    "media-service",
    "assessment-service",
    "notification-service",
    "ai-service",
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CLUSTERSCOPE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upstream origin and the service prefixes forwarded to it
    pub upstream: UpstreamConfig,
    /// Per-service liveness and database probes
    pub probes: ProbesConfig,
    /// Aggregator snapshot polling
    pub snapshot: SnapshotConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Where forwarded service requests go.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base origin every configured prefix is forwarded to (scheme, host and optional port only)
    pub origin: Url,
    /// Ordered, non-overlapping path prefixes that are forwarded
    pub prefixes: Vec<String>,
    /// Upper bound on one forwarded call, including redirects
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Largest request body that will be buffered and forwarded
    pub max_body_bytes: usize,
    /// Number of upstream redirects followed before giving up
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_UPSTREAM_ORIGIN).expect("default upstream origin is a valid URL"),
            prefixes: DEFAULT_SERVICE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 32 * 1024 * 1024,
            max_redirects: 10,
        }
    }
}

/// Probe scheduler configuration.
///
/// Every `interval`, each service gets a ping probe and a DB probe, each bounded by `timeout`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbesConfig {
    /// Enable the probe scheduler (default: true)
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub services: Vec<ServiceTarget>,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            services: DEFAULT_PROBED_SERVICES
                .iter()
                .map(|name| ServiceTarget {
                    name: name.to_string(),
                    url: None,
                })
                .collect(),
        }
    }
}

/// One probed service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceTarget {
    /// Service identity, used as the key of its probe result
    pub name: String,
    /// Base URL of the service. Defaults to `{upstream.origin}/{name}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

/// Aggregator snapshot poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Enable the snapshot poller (default: true)
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Aggregator base URL. Defaults to `{upstream.origin}/community-service`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator_url: Option<Url>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            aggregator_url: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            upstream: UpstreamConfig::default(),
            probes: ProbesConfig::default(),
            snapshot: SnapshotConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

/// Joins a path onto a base URL without doubling or dropping slashes.
fn join_path(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values; the config path itself is not a field
            .merge(Env::prefixed("CLUSTERSCOPE_").ignore(&["config"]).split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> anyhow::Result<()> {
        let origin = &self.upstream.origin;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("Config validation: upstream.origin must be an http(s) URL, got '{origin}'");
        }
        if origin.path() != "/" || origin.query().is_some() {
            anyhow::bail!("Config validation: upstream.origin must not carry a path or query, got '{origin}'");
        }

        if self.upstream.prefixes.is_empty() {
            anyhow::bail!("Config validation: upstream.prefixes must not be empty");
        }
        for prefix in &self.upstream.prefixes {
            if prefix.len() < 2 || !prefix.starts_with('/') {
                anyhow::bail!("Config validation: route prefix '{prefix}' must start with '/' and name a path");
            }
        }
        for (i, a) in self.upstream.prefixes.iter().enumerate() {
            for b in self.upstream.prefixes.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    anyhow::bail!("Config validation: route prefixes '{a}' and '{b}' overlap");
                }
            }
        }
        if self.upstream.request_timeout.is_zero() {
            anyhow::bail!("Config validation: upstream.request_timeout must be greater than zero");
        }

        if self.probes.interval.is_zero() || self.probes.timeout.is_zero() {
            anyhow::bail!("Config validation: probes.interval and probes.timeout must be greater than zero");
        }
        if self.probes.timeout > self.probes.interval {
            anyhow::bail!(
                "Config validation: probes.timeout ({:?}) cannot be greater than probes.interval ({:?})",
                self.probes.timeout,
                self.probes.interval
            );
        }
        let mut seen = HashSet::new();
        for target in &self.probes.services {
            if target.name.trim().is_empty() {
                anyhow::bail!("Config validation: probe service names must not be empty");
            }
            if !seen.insert(target.name.as_str()) {
                anyhow::bail!("Config validation: probe service '{}' is listed twice", target.name);
            }
        }

        if self.snapshot.interval.is_zero() || self.snapshot.timeout.is_zero() {
            anyhow::bail!("Config validation: snapshot.interval and snapshot.timeout must be greater than zero");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL probes for `target` are issued against, without a trailing slash.
    pub fn service_base_url(&self, target: &ServiceTarget) -> String {
        match &target.url {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => join_path(&self.upstream.origin, &target.name),
        }
    }

    /// Full URL of the aggregator's consolidated health document.
    pub fn aggregator_health_url(&self) -> String {
        match &self.snapshot.aggregator_url {
            Some(base) => join_path(base, "diagnostics/health"),
            None => join_path(&self.upstream.origin, "community-service/diagnostics/health"),
        }
    }
}
