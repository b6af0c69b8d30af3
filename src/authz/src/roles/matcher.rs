//! Role-assumption matcher
//!
//! Compiles a role set into a byte-driven trie that answers "which roles can
//! this scope assume" in time proportional to the length of the scope.
//!
//! Role identifiers are sorted with [`scope::compare`](crate::scope::compare),
//! so a wildcard role sits directly before the literal roles it covers and
//! every trie state corresponds to a contiguous range of the sorted list.
//! The sets of roles granted at each state live in an append-only [`Pool`];
//! an entry may point back at an earlier entry instead of copying it.

use crate::scope;

/// Index into the [`Pool`]
pub type PoolIndex = usize;

/// Pool entry that always holds the empty role set
pub const EMPTY: PoolIndex = 0;

/// Scopes must carry this prefix to name a role
pub const ASSUME_PREFIX: &str = "assume:";

/// Longest role identifier, in bytes, the builder accepts
///
/// Trie generation recurses once per byte of the longest identifier.
pub const MAX_ROLE_ID_LEN: usize = 1024;

type StateId = usize;

const ROOT: StateId = 0;

/// One record of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    /// Roles owned by this entry, as indexes into [`Matcher::role_ids`]
    pub roles: Vec<usize>,

    /// Earlier entry whose roles are also part of this set
    pub implied: Option<PoolIndex>,
}

/// Append-only arena of role sets with back-references
#[derive(Debug, Clone)]
pub struct Pool {
    entries: Vec<PoolEntry>,
}

impl Pool {
    fn new() -> Self {
        Self {
            entries: vec![PoolEntry {
                roles: Vec::new(),
                implied: None,
            }],
        }
    }

    /// Appends `roles` plus everything in `implied`, returning the new index
    ///
    /// # Panics
    ///
    /// If `implied` does not precede the new entry.
    fn push(&mut self, roles: Vec<usize>, implied: PoolIndex) -> PoolIndex {
        let index = self.entries.len();
        assert!(
            implied < index,
            "pool entry {index} refers forward to {implied}"
        );
        self.entries.push(PoolEntry {
            roles,
            implied: (implied != EMPTY).then_some(implied),
        });
        index
    }

    /// Number of entries, including the empty set at index 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; the empty set occupies index 0
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `index`
    pub fn get(&self, index: PoolIndex) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    /// Iterates over all entries in index order
    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }

    /// Appends every role in the set at `index` to `out`, following back-references
    pub fn collect_into(&self, mut index: PoolIndex, out: &mut Vec<usize>) {
        loop {
            let entry = &self.entries[index];
            out.extend_from_slice(&entry.roles);
            match entry.implied {
                Some(next) => index = next,
                None => break,
            }
        }
    }

    /// Checks that every back-reference points strictly backwards
    pub fn is_consistent(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(index, entry)| entry.implied.map_or(true, |implied| implied < index))
    }
}

/// Trie state
#[derive(Debug, Clone)]
struct State {
    /// Granted if the scanned scope ends at this state
    end: PoolIndex,

    /// Granted if the next byte has no transition
    default: PoolIndex,

    /// Transitions sorted by byte
    edges: Vec<(u8, StateId)>,
}

impl State {
    fn new(end: PoolIndex, default: PoolIndex) -> Self {
        Self {
            end,
            default,
            edges: Vec::new(),
        }
    }

    fn next(&self, byte: u8) -> Option<StateId> {
        self.edges
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| self.edges[i].1)
    }

    fn set_edge(&mut self, byte: u8, to: StateId) {
        match self.edges.binary_search_by_key(&byte, |&(b, _)| b) {
            Ok(i) => self.edges[i].1 = to,
            Err(i) => self.edges.insert(i, (byte, to)),
        }
    }
}

/// Compiled role-assumption automaton
///
/// # Example
///
/// ```
/// use scopegraph_authz::roles::Matcher;
///
/// let matcher = Matcher::build(["worker-*", "other"]);
/// let granted = matcher.role_ids_in(matcher.resolve("assume:worker-foo"));
/// assert_eq!(granted, vec!["worker-*"]);
/// assert!(matcher.role_ids_in(matcher.resolve("assume:nobody")).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Matcher {
    role_ids: Vec<String>,
    states: Vec<State>,
    pool: Pool,
}

impl Matcher {
    /// Builds the automaton for a set of role identifiers
    ///
    /// Identifiers are sorted and deduplicated; pool entries refer to
    /// positions in [`role_ids`](Self::role_ids). Identifiers must be at
    /// most [`MAX_ROLE_ID_LEN`] bytes long.
    pub fn build<I, S>(role_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut role_ids: Vec<String> = role_ids.into_iter().map(Into::into).collect();
        scope::sort_scopes(&mut role_ids);
        debug_assert!(
            role_ids.iter().all(|id| id.len() <= MAX_ROLE_ID_LEN),
            "role id longer than {MAX_ROLE_ID_LEN} bytes"
        );

        let mut builder = Builder {
            states: Vec::new(),
            pool: Pool::new(),
        };
        let ids: Vec<&[u8]> = role_ids.iter().map(|id| id.as_bytes()).collect();
        builder.generate(&ids, 0, ids.len(), 0, EMPTY);

        Self {
            role_ids,
            states: builder.states,
            pool: builder.pool,
        }
    }

    /// Sorted role identifiers
    pub fn role_ids(&self) -> &[String] {
        &self.role_ids
    }

    /// Pool of role sets
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Number of trie states
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Returns the pool index of the roles `scope` can assume
    ///
    /// Only scopes under `assume:` reach roles, except wildcards broad
    /// enough to cover `assume:` itself (`*`, `a*`, ..., `assume*`), which
    /// reach every role.
    pub fn resolve(&self, scope: &str) -> PoolIndex {
        if let Some(rest) = scope.strip_prefix(ASSUME_PREFIX) {
            return self.scan(rest.as_bytes());
        }
        match scope.strip_suffix('*') {
            Some(prefix) if "assume".starts_with(prefix) => self.scan(b"*"),
            _ => EMPTY,
        }
    }

    fn scan(&self, input: &[u8]) -> PoolIndex {
        let mut state = &self.states[ROOT];
        for &byte in input {
            match state.next(byte) {
                Some(next) => state = &self.states[next],
                None => return state.default,
            }
        }
        state.end
    }

    /// Roles in the set at `index`, as indexes into [`role_ids`](Self::role_ids)
    pub fn roles_in(&self, index: PoolIndex) -> Vec<usize> {
        let mut roles = Vec::new();
        self.pool.collect_into(index, &mut roles);
        roles
    }

    /// Role identifiers in the set at `index`
    pub fn role_ids_in(&self, index: PoolIndex) -> Vec<&str> {
        self.roles_in(index)
            .into_iter()
            .map(|i| self.role_ids[i].as_str())
            .collect()
    }
}

struct Builder {
    states: Vec<State>,
    pool: Pool,
}

impl Builder {
    fn state(&mut self, end: PoolIndex, default: PoolIndex) -> StateId {
        self.states.push(State::new(end, default));
        self.states.len() - 1
    }

    /// Builds the state matching byte `k` of `ids[i..n]`, given that the
    /// roles in pool entry `implied` are already granted
    ///
    /// Every state built over a non-empty range gets a `*` edge whose `end`
    /// is the set of all roles in the range.
    fn generate(
        &mut self,
        ids: &[&[u8]],
        i: usize,
        n: usize,
        k: usize,
        mut implied: PoolIndex,
    ) -> StateId {
        let id = self.state(implied, implied);
        if i >= n {
            return id;
        }
        let mut j = i;

        // A wildcard role ending here is granted to everything below
        if ids[j].len() == k + 1 && ids[j][k] == b'*' {
            implied = self.pool.push(vec![j], implied);
            self.states[id].end = implied;
            self.states[id].default = implied;
            j += 1;
            if j >= n {
                let star = self.state(implied, implied);
                self.states[id].set_edge(b'*', star);
                return id;
            }
        }
        let after_implied = j;
        let mut splits = 0;

        // A literal role ending exactly here
        if ids[j].len() == k {
            let end = self.pool.push(vec![j], implied);
            self.states[id].end = end;
            j += 1;
            splits += 1;
            if j >= n {
                let star = self.state(end, implied);
                self.states[id].set_edge(b'*', star);
                return id;
            }
        }

        let mut start = j;
        let mut current = ids[j][k];
        for m in j..n {
            let c = ids[m][k];
            if c != current {
                let child = self.generate(ids, start, m, k + 1, implied);
                self.states[id].set_edge(current, child);
                current = c;
                start = m;
                splits += 1;
            }
        }
        let last = self.generate(ids, start, n, k + 1, implied);
        self.states[id].set_edge(current, last);

        // A trailing `*` in the query grants the whole range
        let star = match self.states[id].next(b'*') {
            Some(star) => star,
            None => {
                let star = self.state(implied, implied);
                self.states[id].set_edge(b'*', star);
                star
            }
        };
        let child_star = self.states[last].next(b'*');
        let star_end = match child_star {
            // Single transition: the range is exactly the child's range
            Some(child_star) if splits == 0 => self.states[child_star].end,
            _ => self.pool.push((after_implied..n).collect(), implied),
        };
        self.states[star].end = star_end;

        id
    }
}
