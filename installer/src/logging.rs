//! Diagnostic log subscriber setup.
//!
//! Library code logs through the `log` facade. The binary installs a
//! `tracing-subscriber` formatter on stderr that also receives `log`
//! records. `LM_TAP_LOG` overrides the level chosen from `-v`/`-q`, using
//! the usual `EnvFilter` directive syntax.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "LM_TAP_LOG";

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// `LM_TAP_LOG` holds an invalid directive.
    #[error("invalid {LOG_ENV} filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber was already installed.
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Level name for a `-v` count, or `error` when quiet.
#[must_use]
pub fn level_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Default filter directives for the installer's own targets.
#[must_use]
pub fn default_directives(verbosity: u8, quiet: bool) -> String {
    let level = level_for(verbosity, quiet);
    format!("warn,lm_tap_installer={level},lm_tap={level}")
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`LoggingError`] if `LM_TAP_LOG` cannot be parsed or a
/// subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool) -> Result<(), LoggingError> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::try_new(default_directives(verbosity, quiet))?,
    };
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .without_time();
    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}
