//! Layered configuration for the Freeflow authorization service
//!
//! Sources, lowest precedence first:
//! - built-in defaults ([`ServiceConfig::default`])
//! - an optional YAML or TOML file (chosen by extension)
//! - `FREEFLOW_` prefixed environment variables, `__` separating sections
//!
//! The merged result is validated before it is returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! let config = config_engine::load(Some(Path::new("freeflow.yaml")))?;
//! println!("listening on {}", config.server.bind_address());
//! # Ok::<(), config_engine::ConfigError>(())
//! ```

pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use error::*;
pub use loader::{layered_sources, load, ENV_PREFIX};
pub use settings::*;
