//! Process settings loaded via OrthoConfig, plus logging bootstrap.
//!
//! Values come from `INTERLINK_*` environment variables, configuration files
//! and command-line flags, layered by OrthoConfig. Downstream service
//! addresses are not part of this struct: they are read from `*_BASE_URL`
//! variables by [`ServiceRegistry::from_vars`](crate::domain::ServiceRegistry::from_vars).

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use tracing::{Span, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::domain::client::DEFAULT_TIMEOUT;

const DEFAULT_SERVICE_VERSION: &str = "dev";
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const UNNAMED_SERVICE: &str = "unnamed";

/// Identity, logging and client defaults for one service process.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "INTERLINK")]
pub struct InterlinkSettings {
    /// This service's name, announced to peers in `X-Service-Name`.
    pub service_name: Option<String>,
    /// Deployed version, recorded on the service span.
    pub service_version: Option<String>,
    /// Deployment environment label.
    pub environment: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    /// Emit one JSON object per log line.
    pub json_logs: Option<bool>,
    /// Default outbound call timeout in milliseconds.
    pub http_timeout_ms: Option<u64>,
}

impl InterlinkSettings {
    /// Configured service name, if any.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Configured version, falling back to `dev`.
    #[must_use]
    pub fn service_version(&self) -> &str {
        self.service_version
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_VERSION)
    }

    /// Configured environment, falling back to `development`.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// Configured log filter, falling back to `info`.
    #[must_use]
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Whether logs are JSON formatted. Defaults to `true`.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.json_logs.unwrap_or(true)
    }

    /// Default timeout applied by service clients.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout_ms
            .map_or(DEFAULT_TIMEOUT, Duration::from_millis)
    }

    /// Process-wide `service` span recording `service`, `environment` and
    /// `version`.
    ///
    /// Records emitted inside it, or inside request spans parented to it via
    /// [`Observability::with_parent_span`](crate::inbound::http::Observability::with_parent_span),
    /// carry the deployment identity. Create it after [`init_logging`]; a
    /// span opened before a subscriber exists is disabled.
    #[must_use]
    pub fn service_span(&self) -> Span {
        info_span!(
            "service",
            service = self.service_name().unwrap_or(UNNAMED_SERVICE),
            environment = self.environment(),
            version = self.service_version()
        )
    }
}

/// Install the global `tracing` subscriber described by `settings`.
///
/// `RUST_LOG` takes precedence over the configured level. A subscriber that
/// is already installed is left in place and the failure is logged.
pub fn init_logging(settings: &InterlinkSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.log_level()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let builder = fmt().with_env_filter(filter);
    let outcome = if settings.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = outcome {
        warn!(error = %e, "tracing init failed");
    }
}
