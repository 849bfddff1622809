//! Common error handling utilities for the Freeflow authorization service
//!
//! Provides the process-level error type, stable error codes, and
//! correlatable error reports used at the HTTP boundary.
//!
//! # Example
//!
//! ```rust
//! use error_common::{ErrorReport, FreeflowError};
//!
//! fn bind(port: u16) -> Result<(), FreeflowError> {
//!     if port == 0 {
//!         return Err(FreeflowError::ConfigError("port must be non-zero".into()));
//!     }
//!     Ok(())
//! }
//!
//! if let Err(e) = bind(0) {
//!     let report = ErrorReport::new("config_error", e.code(), e.to_string());
//!     report.log(true);
//! }
//! ```

pub mod types;
pub mod codes;
pub mod reporting;

pub use types::*;
pub use reporting::*;
