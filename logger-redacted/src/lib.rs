//! Tracing setup with PII redaction for the Freeflow authorization service
//!
//! - [`init_tracing`] installs a `tracing-subscriber` registry with an
//!   `EnvFilter` (`RUST_LOG` wins over the configured level) and a `fmt`
//!   layer, human-readable or JSON
//! - [`PiiRedactor`] scrubs emails, phone numbers, IP addresses and bearer
//!   tokens from free text before it is logged; values are replaced by a
//!   short hash so repeated occurrences can still be correlated
//!
//! # Example
//!
//! ```rust
//! use logger_redacted::{init_tracing, LoggerConfig, PiiRedactor};
//!
//! init_tracing(&LoggerConfig::default()).ok();
//!
//! let redactor = PiiRedactor::default();
//! let line = redactor.redact("grant failed for jane@example.com from 10.0.0.7");
//! assert!(!line.contains("jane@example.com"));
//! tracing::warn!("{}", line);
//! ```

pub mod config;
pub mod redactor;

pub use config::*;
pub use redactor::*;

use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = config.default_directives();
            EnvFilter::try_new(&directives).map_err(|_| LoggerError::InvalidFilter(directives))?
        }
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .try_init()
            .map_err(|e| LoggerError::Init(e.to_string()))
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init()
            .map_err(|e| LoggerError::Init(e.to_string()))
    }
}
