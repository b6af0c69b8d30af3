//! Integration tests for the scope resolver service
//!
//! Tests cover:
//! - Loading roles and clients from stores
//! - Incremental role and client reloads
//! - Client loading errors
//! - Expansion caching across rebuilds
//! - Periodic background reloads
//! - Readers running concurrently with reloads

use async_trait::async_trait;
use chrono::{Duration, Utc};
use scopegraph_authz::{
    AuthzError, Client, ClientStore, InMemoryClientStore, InMemoryRoleStore, ResolverConfig,
    Result, Role, RoleStore, ScopeResolver,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn in_an_hour() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(1)
}

struct Fixture {
    roles: Arc<InMemoryRoleStore>,
    clients: Arc<InMemoryClientStore>,
    resolver: Arc<ScopeResolver>,
}

async fn fixture(roles: Vec<Role>, clients: Vec<Client>) -> Fixture {
    init_tracing();
    let roles = Arc::new(InMemoryRoleStore::with_roles(roles));
    let clients = Arc::new(InMemoryClientStore::with_clients(clients));
    let resolver = ScopeResolver::new(
        ResolverConfig::default(),
        Arc::clone(&roles) as Arc<dyn RoleStore>,
        Arc::clone(&clients) as Arc<dyn ClientStore>,
    )
    .unwrap();
    resolver.reload().await.unwrap();

    Fixture {
        roles,
        clients,
        resolver: Arc::new(resolver),
    }
}

/// Role store that can be switched into failure
struct FlakyRoleStore {
    inner: InMemoryRoleStore,
    failing: AtomicBool,
}

#[async_trait]
impl RoleStore for FlakyRoleStore {
    async fn list(&self) -> Result<Vec<Role>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthzError::Store("role table unavailable".to_string()));
        }
        self.inner.list().await
    }

    async fn get(&self, role_id: &str) -> Result<Option<Role>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthzError::Store("role table unavailable".to_string()));
        }
        self.inner.get(role_id).await
    }
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_reload_and_resolve() {
    let f = fixture(
        vec![
            Role::new("repo:ci-*", ["assume:worker", "queue:create-task:ci"]),
            Role::new("worker", ["queue:claim-work:*"]),
        ],
        vec![],
    )
    .await;

    assert!(f.resolver.is_loaded());
    assert_eq!(
        f.resolver.resolve("assume:repo:ci-build").unwrap(),
        ["assume:worker", "queue:claim-work:*", "queue:create-task:ci"]
    );
    assert!(f.resolver.resolve("assume:repo:prod").unwrap().is_empty());
    assert_eq!(
        f.resolver.expanded_role_scopes("worker").unwrap(),
        Some(vec!["queue:claim-work:*".to_string()])
    );
    assert_eq!(f.resolver.expanded_role_scopes("repo:ci-build").unwrap(), None);
}

#[tokio::test]
async fn test_expand_assume_prefix_wildcards() {
    let f = fixture(
        vec![Role::new("a", ["x"]), Role::new("b", ["y"])],
        vec![],
    )
    .await;

    for scope in ["*", "a*", "as*", "assume*", "assume:*"] {
        let expanded = f.resolver.expand(&[scope]).unwrap();
        let expected = scopegraph_authz::scope::normalize([scope, "x", "y"]);
        assert_eq!(expanded, expected, "expanding {scope}");
    }

    assert_eq!(f.resolver.expand(&["b*"]).unwrap(), ["b*"]);
    assert_eq!(f.resolver.expand(&["assume"]).unwrap(), ["assume"]);
}

#[tokio::test]
async fn test_expand_keeps_input_and_normalizes() {
    let f = fixture(vec![Role::new("a", ["q:1", "r"])], vec![]).await;

    assert_eq!(
        f.resolver.expand(&["assume:a", "q:*", "q:2"]).unwrap(),
        ["assume:a", "q:*", "r"]
    );
    assert!(f.resolver.expand::<&str>(&[]).unwrap().is_empty());
}

// ============================================================================
// Client Loading
// ============================================================================

#[tokio::test]
async fn test_load_client() {
    let f = fixture(
        vec![Role::new("project:docs", ["secrets:get:docs"])],
        vec![Client::new("docs-bot", ["assume:project:docs"], in_an_hour())],
    )
    .await;

    let client = f.resolver.load_client("docs-bot").unwrap();
    assert_eq!(client.client_id, "docs-bot");
    assert_eq!(client.unexpanded_scopes, ["assume:project:docs"]);
    assert_eq!(
        client.expanded_scopes,
        ["assume:project:docs", "secrets:get:docs"]
    );

    // Expanded once per snapshot
    let again = f.resolver.load_client("docs-bot").unwrap();
    assert!(Arc::ptr_eq(&client, &again));
}

#[tokio::test]
async fn test_load_client_errors() {
    let f = fixture(
        vec![],
        vec![
            Client::new("disabled", ["a"], in_an_hour()).disabled(),
            Client::new("expired", ["a"], Utc::now() - Duration::minutes(5)),
        ],
    )
    .await;

    assert!(matches!(
        f.resolver.load_client("missing"),
        Err(AuthzError::ClientNotFound(id)) if id == "missing"
    ));
    assert!(matches!(
        f.resolver.load_client("disabled"),
        Err(AuthzError::ClientDisabled(_))
    ));
    assert!(matches!(
        f.resolver.load_client("expired"),
        Err(AuthzError::ClientExpired(_))
    ));
}

#[tokio::test]
async fn test_reload_client_upserts_and_removes() {
    let f = fixture(vec![Role::new("a", ["x"])], vec![]).await;

    f.clients
        .put(Client::new("c", ["assume:a"], in_an_hour()))
        .await;
    assert!(matches!(
        f.resolver.load_client("c"),
        Err(AuthzError::ClientNotFound(_))
    ));

    f.resolver.reload_client("c").await.unwrap();
    assert_eq!(f.resolver.load_client("c").unwrap().expanded_scopes, ["assume:a", "x"]);

    f.clients
        .put(Client::new("c", ["assume:a", "extra"], in_an_hour()))
        .await;
    f.resolver.reload_client("c").await.unwrap();
    assert_eq!(
        f.resolver.load_client("c").unwrap().expanded_scopes,
        ["assume:a", "extra", "x"]
    );

    f.clients.delete("c").await;
    f.resolver.reload_client("c").await.unwrap();
    assert!(matches!(
        f.resolver.load_client("c"),
        Err(AuthzError::ClientNotFound(_))
    ));
}

// ============================================================================
// Role Reloads
// ============================================================================

#[tokio::test]
async fn test_reload_role_upserts_and_removes() {
    let f = fixture(
        vec![Role::new("a", ["assume:b"]), Role::new("b", ["x"])],
        vec![],
    )
    .await;
    assert_eq!(f.resolver.resolve("assume:a").unwrap(), ["assume:b", "x"]);

    f.roles.put(Role::new("b", ["y"])).await;
    f.resolver.reload_role("b").await.unwrap();
    assert_eq!(f.resolver.resolve("assume:a").unwrap(), ["assume:b", "y"]);

    f.roles.put(Role::new("c*", ["z"])).await;
    f.resolver.reload_role("c*").await.unwrap();
    assert_eq!(f.resolver.resolve("assume:cat").unwrap(), ["z"]);

    f.roles.delete("b").await;
    f.resolver.reload_role("b").await.unwrap();
    assert_eq!(f.resolver.resolve("assume:a").unwrap(), ["assume:b"]);
    assert_eq!(f.resolver.metrics().rebuilds, 4);
}

#[tokio::test]
async fn test_reload_roles_keeps_clients() {
    let f = fixture(
        vec![Role::new("a", ["x"])],
        vec![Client::new("c", ["assume:a"], in_an_hour())],
    )
    .await;

    // A client added to the store is not picked up by a role reload
    f.clients
        .put(Client::new("d", ["assume:a"], in_an_hour()))
        .await;
    f.roles.put(Role::new("a", ["y"])).await;
    f.resolver.reload_roles().await.unwrap();

    assert_eq!(f.resolver.load_client("c").unwrap().expanded_scopes, ["assume:a", "y"]);
    assert!(matches!(
        f.resolver.load_client("d"),
        Err(AuthzError::ClientNotFound(_))
    ));
}

#[tokio::test]
async fn test_partial_reload_before_first_load_loads_everything() {
    init_tracing();
    let roles = Arc::new(InMemoryRoleStore::with_roles([Role::new("a", ["x"])]));
    let clients = Arc::new(InMemoryClientStore::with_clients([Client::new(
        "c",
        ["assume:a"],
        in_an_hour(),
    )]));
    let resolver = ScopeResolver::new(ResolverConfig::default(), roles, clients).unwrap();

    resolver.reload_role("a").await.unwrap();
    assert_eq!(resolver.resolve("assume:a").unwrap(), ["x"]);
    assert_eq!(resolver.load_client("c").unwrap().expanded_scopes, ["assume:a", "x"]);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_snapshot() {
    init_tracing();
    let store = Arc::new(FlakyRoleStore {
        inner: InMemoryRoleStore::with_roles([Role::new("a", ["x"])]),
        failing: AtomicBool::new(false),
    });
    let resolver = ScopeResolver::new(
        ResolverConfig::default(),
        Arc::clone(&store) as Arc<dyn RoleStore>,
        Arc::new(InMemoryClientStore::new()),
    )
    .unwrap();

    store.failing.store(true, Ordering::SeqCst);
    assert!(matches!(resolver.reload().await, Err(AuthzError::Store(_))));
    assert!(!resolver.is_loaded());

    store.failing.store(false, Ordering::SeqCst);
    resolver.reload().await.unwrap();
    let built_at = resolver.built_at().unwrap();

    store.inner.put(Role::new("a", ["y"])).await;
    store.failing.store(true, Ordering::SeqCst);
    assert!(matches!(resolver.reload_roles().await, Err(AuthzError::Store(_))));
    assert!(matches!(resolver.reload_role("a").await, Err(AuthzError::Store(_))));

    assert_eq!(resolver.resolve("assume:a").unwrap(), ["x"]);
    assert_eq!(resolver.built_at().unwrap(), built_at);
    assert_eq!(resolver.metrics().error_count, 3);
}

// ============================================================================
// Periodic Reload
// ============================================================================

fn periodic_config() -> ResolverConfig {
    ResolverConfig {
        reload_interval_secs: 60,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_periodic_reload_picks_up_store_changes() {
    init_tracing();
    let roles = Arc::new(InMemoryRoleStore::with_roles([Role::new("a", ["x"])]));
    let resolver = Arc::new(
        ScopeResolver::new(
            periodic_config(),
            Arc::clone(&roles) as Arc<dyn RoleStore>,
            Arc::new(InMemoryClientStore::new()),
        )
        .unwrap(),
    );
    resolver.reload().await.unwrap();
    let handle = Arc::clone(&resolver).spawn_periodic_reload();

    roles.put(Role::new("a", ["y"])).await;
    roles.put(Role::new("b", ["assume:a"])).await;
    assert_eq!(resolver.resolve("assume:a").unwrap(), ["x"]);

    for _ in 0..10 {
        if resolver.expanded_role_scopes("b").unwrap().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }

    assert_eq!(resolver.resolve("assume:a").unwrap(), ["y"]);
    assert_eq!(
        resolver.expanded_role_scopes("b").unwrap(),
        Some(vec!["assume:a".to_string(), "y".to_string()])
    );
    assert!(resolver.metrics().rebuilds >= 2);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_reload_failure_keeps_snapshot() {
    init_tracing();
    let store = Arc::new(FlakyRoleStore {
        inner: InMemoryRoleStore::with_roles([Role::new("a", ["x"])]),
        failing: AtomicBool::new(false),
    });
    let resolver = Arc::new(
        ScopeResolver::new(
            periodic_config(),
            Arc::clone(&store) as Arc<dyn RoleStore>,
            Arc::new(InMemoryClientStore::new()),
        )
        .unwrap(),
    );
    resolver.reload().await.unwrap();

    store.inner.put(Role::new("a", ["y"])).await;
    store.failing.store(true, Ordering::SeqCst);
    let handle = Arc::clone(&resolver).spawn_periodic_reload();

    for _ in 0..10 {
        if resolver.metrics().error_count > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }

    assert!(resolver.metrics().error_count > 0);
    assert_eq!(resolver.resolve("assume:a").unwrap(), ["x"]);
    assert!(!handle.is_finished());

    store.failing.store(false, Ordering::SeqCst);
    for _ in 0..10 {
        if resolver.resolve("assume:a").unwrap() == ["y"] {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }
    assert_eq!(resolver.resolve("assume:a").unwrap(), ["y"]);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_reload_stops_with_resolver() {
    let f = fixture(vec![Role::new("a", ["x"])], vec![]).await;
    let handle = Arc::clone(&f.resolver).spawn_periodic_reload();

    drop(f);
    tokio::time::timeout(std::time::Duration::from_secs(600), handle)
        .await
        .unwrap()
        .unwrap();
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_rebuild_starts_with_empty_cache() {
    let f = fixture(vec![Role::new("a", ["x"])], vec![]).await;

    f.resolver.expand(&["assume:a"]).unwrap();
    f.resolver.expand(&["assume:a", "other"]).unwrap();
    let stats = f.resolver.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));

    f.roles.put(Role::new("a", ["y"])).await;
    f.resolver.reload_role("a").await.unwrap();

    let stats = f.resolver.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses, stats.entries), (0, 0, 0));
    assert_eq!(f.resolver.expand(&["assume:a"]).unwrap(), ["assume:a", "y"]);

    // Totals survive rebuilds
    let metrics = f.resolver.metrics();
    assert_eq!((metrics.cache_hits, metrics.cache_misses), (1, 2));
}

#[tokio::test]
async fn test_metrics_export() {
    let f = fixture(vec![Role::new("a", ["x"]), Role::new("b*", ["y"])], vec![]).await;

    let metrics = f.resolver.metrics();
    assert_eq!(metrics.rebuilds, 1);
    assert_eq!(metrics.roles, 2);
    assert!(metrics.states > 0);

    let prometheus = f.resolver.metrics_collector().export_prometheus();
    assert!(prometheus.contains("scopegraph_rebuilds_total 1"));
    assert!(prometheus.contains("scopegraph_roles 2"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_snapshots_during_reloads() {
    let f = fixture(
        vec![Role::new("a", ["assume:b", "x1"]), Role::new("b", ["y1"])],
        vec![],
    )
    .await;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let resolver = Arc::clone(&f.resolver);
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let scopes = resolver.expand(&["assume:a"]).unwrap();
                let has_x1 = scopes.contains(&"x1".to_string());
                let has_y1 = scopes.contains(&"y1".to_string());
                // Both roles change together, a mix would be a torn read
                assert_eq!(has_x1, has_y1, "torn snapshot: {scopes:?}");
                tokio::task::yield_now().await;
            }
        }));
    }

    for generation in 0..20 {
        let suffix = if generation % 2 == 0 { "2" } else { "1" };
        f.roles
            .put(Role::new("a", ["assume:b".to_string(), format!("x{suffix}")]))
            .await;
        f.roles.put(Role::new("b", [format!("y{suffix}")])).await;
        f.resolver.reload_roles().await.unwrap();
    }

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(f.resolver.metrics().rebuilds, 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reloads_are_serialized() {
    let f = fixture(vec![Role::new("a", ["x"])], vec![]).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let resolver = Arc::clone(&f.resolver);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                resolver.reload().await
            } else {
                resolver.reload_role("a").await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(f.resolver.metrics().rebuilds, 11);
    assert_eq!(f.resolver.resolve("assume:a").unwrap(), ["x"]);
}
