//! Role resolution module
//!
//! Provides the role-assumption matcher and the fixed-point expander that
//! together produce a [`Resolver`]: a pure function from a scope to the
//! normalized set of scopes that scope additionally grants.
//!
//! # Features
//!
//! - **Wildcard roles**: a role id ending in `*` is assumable by every
//!   `assume:` scope sharing its prefix
//! - **Linear queries**: a scope is scanned once through a trie, independent
//!   of the number of roles
//! - **Structural sharing**: role sets are pooled and refer back to earlier
//!   entries instead of being copied
//! - **Cycles**: roles may assume each other in any shape, including cycles
//!
//! # Example
//!
//! ```rust
//! use scopegraph_authz::{Resolver, Role};
//!
//! let resolver = Resolver::build(&[
//!     Role::new("worker-*", ["queue:claim-work"]),
//!     Role::new("worker-gpu", ["assume:gpu-access"]),
//!     Role::new("gpu-access", ["device:gpu"]),
//! ]);
//!
//! let granted = resolver.resolve("assume:worker-gpu");
//! assert_eq!(granted, ["assume:gpu-access", "device:gpu", "queue:claim-work"]);
//! ```

pub mod expander;
pub mod matcher;


pub use expander::{Resolver, TraversalOrder};
pub use matcher::{
    Matcher, Pool, PoolEntry, PoolIndex, ASSUME_PREFIX, EMPTY, MAX_ROLE_ID_LEN,
};
