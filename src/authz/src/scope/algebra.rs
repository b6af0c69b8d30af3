//! Ordering and redundancy-free merging of wildcard scope collections
//!
//! All functions operate on plain `&str` scopes. A collection is
//! *normalized* when it is sorted by [`compare`], free of duplicates, and no
//! member satisfies a different member.

use std::cmp::Ordering;

/// Returns true if `scope` ends in `*`
#[inline]
pub fn is_wildcard(scope: &str) -> bool {
    scope.ends_with('*')
}

/// Returns true if holding `have` grants `want`
///
/// Reflexive and transitive: `a*` satisfies `a`, `ab` and `ab*`, but `a`
/// satisfies only `a`.
///
/// # Examples
///
/// ```
/// use scopegraph_authz::scope::satisfies;
///
/// assert!(satisfies("queue:*", "queue:create-task"));
/// assert!(satisfies("queue:*", "queue:*"));
/// assert!(!satisfies("queue:create-task", "queue:*"));
/// ```
#[inline]
pub fn satisfies(have: &str, want: &str) -> bool {
    if have == want {
        return true;
    }
    match have.strip_suffix('*') {
        Some(prefix) => want.starts_with(prefix),
        None => false,
    }
}

/// Returns true if some member of `set` satisfies `want`
pub fn set_satisfies<S: AsRef<str>>(set: &[S], want: &str) -> bool {
    set.iter().any(|have| satisfies(have.as_ref(), want))
}

/// Splits a scope into its literal prefix and whether it was a wildcard
#[inline]
fn split(scope: &str) -> (&[u8], bool) {
    match scope.strip_suffix('*') {
        Some(prefix) => (prefix.as_bytes(), true),
        None => (scope.as_bytes(), false),
    }
}

/// Total order placing a wildcard immediately before its literal prefix
///
/// `*` < `` < `(` and `a*` < `a` < `a*b` < `aa` < `ab` < `b`. Everything a
/// wildcard satisfies sorts directly after it, which is what lets
/// [`merge`] normalize in a single pass.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (prefix_a, wild_a) = split(a);
    let (prefix_b, wild_b) = split(b);
    prefix_a
        .cmp(prefix_b)
        .then_with(|| wild_b.cmp(&wild_a))
}

/// Sorts scopes in place by [`compare`] and drops exact duplicates
pub fn sort_scopes(scopes: &mut Vec<String>) {
    scopes.sort_unstable_by(|a, b| compare(a, b));
    scopes.dedup();
}

/// Appends `scope` and advances `pos` past everything it makes redundant
#[inline]
fn emit_and_skip(out: &mut Vec<String>, scope: &str, rest: &[String], pos: &mut usize) {
    out.push(scope.to_string());
    if let Some(prefix) = scope.strip_suffix('*') {
        while *pos < rest.len() && rest[*pos].starts_with(prefix) {
            *pos += 1;
        }
    }
}

/// Merges two sorted, normalized collections into their normalized union
///
/// Runs in `O(|a| + |b|)`. Whenever a wildcard is emitted, every following
/// entry of either input that it satisfies is skipped.
///
/// # Examples
///
/// ```
/// use scopegraph_authz::scope::merge;
///
/// let a = vec!["a*".to_string()];
/// let b = vec!["ab".to_string(), "ac".to_string(), "b".to_string()];
/// assert_eq!(merge(&a, &b), vec!["a*".to_string(), "b".to_string()]);
/// ```
pub fn merge(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let scope = match compare(&a[i], &b[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
                &a[i - 1]
            }
            Ordering::Less => {
                i += 1;
                &a[i - 1]
            }
            Ordering::Greater => {
                j += 1;
                &b[j - 1]
            }
        };
        out.push(scope.clone());
        if let Some(prefix) = scope.strip_suffix('*') {
            while i < a.len() && a[i].starts_with(prefix) {
                i += 1;
            }
            while j < b.len() && b[j].starts_with(prefix) {
                j += 1;
            }
        }
    }

    // One side is exhausted; the skip rule still applies within the tail.
    for (rest, mut pos) in [(a, i), (b, j)] {
        while pos < rest.len() {
            pos += 1;
            emit_and_skip(&mut out, &rest[pos - 1], rest, &mut pos);
        }
    }

    out
}

/// Merges any number of normalized collections
pub fn merge_all<'a, I>(sets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    sets.into_iter()
        .fold(Vec::new(), |acc, set| merge(&acc, set))
}

/// Normalizes an arbitrary collection: sort, dedup, and drop satisfied scopes
///
/// # Examples
///
/// ```
/// use scopegraph_authz::scope::normalize;
///
/// let scopes = normalize(["b*", "ab", "aa", "a", "a*"]);
/// assert_eq!(scopes, vec!["a*".to_string(), "b*".to_string()]);
/// ```
pub fn normalize<I, S>(scopes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted: Vec<String> = scopes.into_iter().map(Into::into).collect();
    sort_scopes(&mut sorted);
    merge(&sorted, &[])
}
