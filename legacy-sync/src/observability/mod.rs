//! Observability (structured logging)
//!
//! Attempt-level log events are emitted by [`crate::sync::AttemptContext`];
//! this module installs the subscriber that formats them.

use crate::config::{LogFormat, LoggingSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter in debug builds
pub const DEBUG_FILTER: &str = "debug,legacy_sync=trace,sqlx=warn";

/// Default filter in release builds
pub const RELEASE_FILTER: &str = "info";

/// Initialize the global tracing subscriber
///
/// Filter precedence: `RUST_LOG`, then `settings.filter`, then a build-profile
/// default. Output is pretty-printed or JSON according to `settings.format`.
///
/// # Example
///
/// ```rust,no_run
/// use legacy_sync::config::LoggingSettings;
/// use legacy_sync::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init(&LoggingSettings::default())?;
/// tracing::info!("Legacy sync started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global subscriber
/// is already installed.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directive(settings))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match settings.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}

/// Filter directive used when `RUST_LOG` is unset
#[must_use]
pub fn filter_directive(settings: &LoggingSettings) -> &str {
    settings.filter.as_deref().unwrap_or(if cfg!(debug_assertions) {
        DEBUG_FILTER
    } else {
        RELEASE_FILTER
    })
}
