//! Fixed-point expansion of role implication
//!
//! A role implies another when one of its own scopes can assume it. The
//! implication graph may contain cycles; every role's expanded scopes are
//! the least set closed under it:
//!
//! ```text
//! expanded(R) = merge(R.scopes, ⋃ expanded(R') for R' in implied(R))
//! ```
//!
//! Each role is taken as a traversal root in turn. A depth-first walk marks
//! roles with the current epoch; a role already marked is either an
//! ancestor on the walk (a cycle) or already merged through another path,
//! and is skipped. Roles finished as earlier roots are merged directly.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::matcher::Matcher;
use crate::scope::{self, ScopeSet};
use crate::types::Role;

/// Order in which roles are taken as traversal roots
///
/// Results do not depend on the order; a shuffled order avoids quadratic
/// work on long implication chains listed head first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Random permutation per build
    #[default]
    Shuffled,
    /// Sorted role order
    Sorted,
}

#[derive(Debug)]
struct Node {
    scopes: ScopeSet,
    implied: Vec<usize>,
    seen: u64,
    expanded: Option<ScopeSet>,
}

/// Stack frame of the depth-first walk
struct Frame {
    role: usize,
    next: usize,
    scopes: ScopeSet,
}

/// Computes expanded scopes for every role of a [`Matcher`]
struct Expander {
    nodes: Vec<Node>,
    epoch: u64,
}

impl Expander {
    /// `scopes[i]` are the normalized scopes of `matcher.role_ids()[i]`
    fn new(matcher: &Matcher, scopes: Vec<ScopeSet>) -> Self {
        let mut buffer = Vec::new();
        let nodes = scopes
            .into_iter()
            .enumerate()
            .map(|(role, scopes)| {
                buffer.clear();
                for s in &scopes {
                    matcher.pool().collect_into(matcher.resolve(s), &mut buffer);
                }
                buffer.sort_unstable();
                buffer.dedup();
                let implied = buffer.iter().copied().filter(|&r| r != role).collect();
                Node {
                    scopes,
                    implied,
                    seen: 0,
                    expanded: None,
                }
            })
            .collect();

        Self { nodes, epoch: 0 }
    }

    fn run(mut self, order: TraversalOrder) -> Vec<ScopeSet> {
        let mut roots: Vec<usize> = (0..self.nodes.len()).collect();
        if order == TraversalOrder::Shuffled {
            roots.shuffle(&mut rand::thread_rng());
        }

        for root in roots {
            let expanded = self.expand_root(root);
            let node = &mut self.nodes[root];
            node.expanded = Some(expanded);
            node.implied = Vec::new();
        }

        self.nodes
            .into_iter()
            .map(|node| node.expanded.unwrap_or(node.scopes))
            .collect()
    }

    fn expand_root(&mut self, root: usize) -> ScopeSet {
        self.epoch += 1;
        let epoch = self.epoch;
        self.nodes[root].seen = epoch;

        let mut stack = vec![Frame {
            role: root,
            next: 0,
            scopes: self.nodes[root].scopes.clone(),
        }];
        let mut result = ScopeSet::new();

        while let Some(frame) = stack.last_mut() {
            match self.nodes[frame.role].implied.get(frame.next).copied() {
                Some(r) => {
                    frame.next += 1;
                    let node = &mut self.nodes[r];
                    if node.seen == epoch {
                        continue;
                    }
                    node.seen = epoch;
                    if let Some(done) = &node.expanded {
                        frame.scopes = scope::merge(&frame.scopes, done);
                    } else {
                        let scopes = node.scopes.clone();
                        stack.push(Frame {
                            role: r,
                            next: 0,
                            scopes,
                        });
                    }
                }
                None => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.scopes = scope::merge(&parent.scopes, &done.scopes),
                            None => result = done.scopes,
                        }
                    }
                }
            }
        }

        result
    }
}

/// Immutable scope resolver built from a role set
///
/// Maps any scope to the normalized set of scopes it additionally grants
/// through role assumption. Safe to share across threads without locking.
///
/// # Example
///
/// ```
/// use scopegraph_authz::{Resolver, Role};
///
/// let resolver = Resolver::build(&[
///     Role::new("a", ["x", "assume:b"]),
///     Role::new("b", ["y", "assume:a"]),
/// ]);
///
/// assert_eq!(resolver.resolve("assume:a"), ["assume:a", "assume:b", "x", "y"]);
/// assert!(resolver.resolve("queue:create-task:x").is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    matcher: Matcher,
    expanded: Vec<ScopeSet>,
    scope_sets: Vec<ScopeSet>,
    index: HashMap<String, usize>,
}

impl Resolver {
    /// Builds a resolver with the default traversal order
    pub fn build(roles: &[Role]) -> Self {
        Self::build_with(roles, TraversalOrder::default())
    }

    /// Builds a resolver, taking fixed-point roots in `order`
    pub fn build_with(roles: &[Role], order: TraversalOrder) -> Self {
        let started = Instant::now();

        let mut by_id: HashMap<&str, ScopeSet> = HashMap::with_capacity(roles.len());
        for role in roles {
            let scopes = scope::normalize(role.scopes.iter().cloned());
            match by_id.entry(role.role_id.as_str()) {
                Entry::Occupied(mut existing) => {
                    warn!("Duplicate roleId '{}', merging its scopes", role.role_id);
                    let merged = scope::merge(existing.get(), &scopes);
                    *existing.get_mut() = merged;
                }
                Entry::Vacant(slot) => {
                    slot.insert(scopes);
                }
            }
        }

        let matcher = Matcher::build(by_id.keys().map(|id| id.to_string()));
        let scopes: Vec<ScopeSet> = matcher
            .role_ids()
            .iter()
            .map(|id| by_id.remove(id.as_str()).unwrap_or_default())
            .collect();

        let expanded = Expander::new(&matcher, scopes).run(order);

        // Entries only refer backwards, so each one can reuse its tail
        let pool = matcher.pool();
        let mut scope_sets: Vec<ScopeSet> = Vec::with_capacity(pool.len());
        for (index, entry) in pool.entries().enumerate() {
            let mut scopes = match entry.implied {
                Some(implied) => {
                    assert!(implied < index, "pool entry {index} refers forward to {implied}");
                    scope_sets[implied].clone()
                }
                None => ScopeSet::new(),
            };
            for &role in &entry.roles {
                scopes = scope::merge(&scopes, &expanded[role]);
            }
            scope_sets.push(scopes);
        }

        let index = matcher
            .role_ids()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        debug!(
            "Built resolver: {} roles, {} states, {} pool entries in {:?}",
            matcher.role_ids().len(),
            matcher.state_count(),
            pool.len(),
            started.elapsed()
        );

        Self {
            matcher,
            expanded,
            scope_sets,
            index,
        }
    }

    /// Scopes additionally granted by holding `scope`
    pub fn resolve(&self, scope: &str) -> &[String] {
        &self.scope_sets[self.matcher.resolve(scope)]
    }

    /// Union of the grants of every scope in `scopes`
    pub fn resolve_all<S: AsRef<str>>(&self, scopes: &[S]) -> ScopeSet {
        let mut indexes: Vec<usize> = scopes
            .iter()
            .map(|s| self.matcher.resolve(s.as_ref()))
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        scope::merge_all(indexes.into_iter().map(|i| self.scope_sets[i].as_slice()))
    }

    /// Normalized `scopes` together with everything they grant
    ///
    /// Expanded role scopes are closed under implication, so a single
    /// pass is already a fixed point.
    pub fn expand<S: AsRef<str>>(&self, scopes: &[S]) -> ScopeSet {
        let input = scope::normalize(scopes.iter().map(|s| s.as_ref().to_string()));
        let granted = self.resolve_all(&input);
        scope::merge(&input, &granted)
    }

    /// Expanded scopes of the role with exactly this identifier
    pub fn expanded_scopes(&self, role_id: &str) -> Option<&[String]> {
        self.index
            .get(role_id)
            .map(|&i| self.expanded[i].as_slice())
    }

    /// Compiled matcher
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Number of distinct roles
    pub fn role_count(&self) -> usize {
        self.expanded.len()
    }

    /// Number of pool entries
    pub fn pool_len(&self) -> usize {
        self.scope_sets.len()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::build(&[])
    }
}
