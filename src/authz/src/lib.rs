//! # Scopegraph Authorization Core
//!
//! Scope expansion through role assumption.
//!
//! A scope is a permission string; a trailing `*` makes it a prefix
//! pattern. Holding `assume:<roleId>` grants every scope of that role, and
//! roles may assume other roles, including through wildcards and cycles.
//! This crate compiles a role set into a [`Resolver`] that answers "what
//! else does this scope grant" in time linear in the length of the scope.
//!
//! ## Features
//!
//! - **Scope algebra** with normalization and linear-time merge
//! - **Role matcher** compiled into a trie with structurally shared role sets
//! - **Fixed-point expansion** over arbitrary implication graphs
//! - **Scope resolver service** with atomic reloads, client loading and an
//!   LRU expansion cache
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use scopegraph_authz::{
//!     InMemoryClientStore, InMemoryRoleStore, ResolverConfig, Role, ScopeResolver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roles = InMemoryRoleStore::with_roles([
//!         Role::new("repo:ci-*", ["queue:create-task:ci", "assume:worker"]),
//!         Role::new("worker", ["queue:claim-work:*"]),
//!     ]);
//!
//!     let resolver = ScopeResolver::new(
//!         ResolverConfig::default(),
//!         Arc::new(roles),
//!         Arc::new(InMemoryClientStore::new()),
//!     )?;
//!     resolver.reload().await?;
//!
//!     let scopes = resolver.expand(&["assume:repo:ci-build"])?;
//!     assert!(scopes.contains(&"queue:claim-work:*".to_string()));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod roles;
pub mod scope;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::ResolverConfig;
pub use engine::{CacheStats, MetricsCollector, ResolverMetrics, ScopeResolver};
pub use error::{AuthzError, Result};
pub use roles::{Matcher, Resolver, TraversalOrder};
pub use scope::ScopeSet;
pub use store::{ClientStore, InMemoryClientStore, InMemoryRoleStore, RoleStore};
pub use types::{Client, ClientId, ResolvedClient, Role, RoleId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
