//! Zanzibar-style authorization engine for Freeflow
//!
//! This crate implements relationship-based access control (ReBAC):
//! - Relationship tuples as the single source of truth
//! - Per-namespace rewrite rules (direct, computed, union, intersection,
//!   tuple-to-userset)
//! - Bounded, cycle-safe expansion of derived relations
//! - A guarded write path: changing an object's tuples requires the
//!   configured grant relation on that object
//!
//! # Core Concepts
//!
//! - **Namespace**: a resource type (`project`, `folder`, `document`, ...)
//! - **Subject**: a concrete principal, or a userset such as `team:t1#member`
//! - **Relation**: a named relationship (`owner`, `editor`, `viewer`)
//! - **Tuple**: `namespace:object_id#relation@subject`
//!
//! # Example
//!
//! ```rust
//! use auth_zanzibar::*;
//! use auth_zanzibar::repository::InMemoryTupleStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> auth_zanzibar::Result<()> {
//! let service = AuthorizationService::new(
//!     Arc::new(InMemoryTupleStore::new()),
//!     Arc::new(NamespaceRegistry::freeflow_default()),
//!     AuthorizationConfig::default(),
//! );
//!
//! // The creator of a project is recorded as its owner
//! let owner = TupleKey::new("project", "p1", "owner", &Subject::user("alice"));
//! service.provision_tuple(WriteTupleRequest::new(owner, "system")).await?;
//!
//! // The owner shares it
//! let viewer = TupleKey::new("project", "p1", "viewer", &Subject::user("bob"));
//! service.write_tuple(WriteTupleRequest::new(viewer, "alice")).await?;
//!
//! let request = CheckRequest::new("project", "p1", "viewer", &Subject::user("bob"));
//! assert!(service.check(&request).await?.allowed);
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod engine;
pub mod repository;
pub mod schema;
pub mod check;
pub mod expand;
pub mod error;

pub use models::*;
pub use engine::*;
pub use schema::*;
pub use expand::{Diagnostic, Expansion, ExpansionLimits};
pub use error::*;
