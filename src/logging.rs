//! Logging set-up
//!
//! The environment picks the format and default level:
//!
//! | env     | format | level |
//! |---------|--------|-------|
//! | `local` | text   | debug |
//! | `dev`   | JSON   | debug |
//! | `prod`  | JSON   | info  |
//!
//! `RUST_LOG` overrides the level when set.

use crate::config::Environment;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Default filter directive for an environment
pub fn default_level(env: Environment) -> &'static str {
    match env {
        Environment::Local | Environment::Dev => "debug",
        Environment::Prod => "info",
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(env: Environment) -> Result<(), TryInitError> {
    let level = default_level(env);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match env {
        Environment::Local => registry
            .with(fmt::layer().with_target(true))
            .try_init()?,
        Environment::Dev | Environment::Prod => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
    }

    tracing::debug!(env = ?env, "Logging initialized");
    Ok(())
}
