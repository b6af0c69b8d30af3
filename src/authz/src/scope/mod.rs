/// Scope algebra module
///
/// A scope is an opaque permission string. A trailing `*` turns it into a
/// pattern covering every string that shares the prefix before the `*`.
/// This module provides the satisfaction relation, the merge order, and a
/// linear-time merge that keeps collections normalized.
///
/// # Examples
///
/// ```
/// use scopegraph_authz::scope::{merge, normalize, satisfies};
///
/// assert!(satisfies("queue:*", "queue:create-task:aws"));
///
/// let a = normalize(["queue:create-task:aws", "assume:worker-*"]);
/// let b = normalize(["queue:*"]);
/// assert_eq!(merge(&a, &b), vec!["assume:worker-*", "queue:*"]);
/// ```

mod algebra;


pub use algebra::{
    compare, is_wildcard, merge, merge_all, normalize, satisfies, set_satisfies, sort_scopes,
};

/// A normalized scope collection
pub type ScopeSet = Vec<String>;
