//! Scope resolver service
//!
//! Owns the current [`Resolver`] together with the client table, keeps them
//! in sync with the role and client stores, and answers expansion queries.

pub mod cache;
pub mod metrics;

pub use cache::{is_assume_relevant, CacheStats, ExpansionCache};
pub use metrics::{MetricsCollector, ResolverMetrics};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::error::{AuthzError, Result};
use crate::roles::{Resolver, TraversalOrder, MAX_ROLE_ID_LEN};
use crate::scope::{self, ScopeSet};
use crate::store::{ClientStore, RoleStore};
use crate::types::{Client, ClientId, ResolvedClient, Role};

/// Immutable state published by a reload
struct Snapshot {
    resolver: Arc<Resolver>,
    roles: Arc<Vec<Role>>,
    clients: HashMap<ClientId, Client>,

    /// Lazily expanded clients
    resolved: DashMap<ClientId, Arc<ResolvedClient>>,

    /// Shared by every snapshot built on the same resolver
    cache: Option<Arc<ExpansionCache>>,

    built_at: DateTime<Utc>,
}

impl Snapshot {
    fn expand<S: AsRef<str>>(&self, scopes: &[S], metrics: &MetricsCollector) -> ScopeSet {
        let input = scope::normalize(scopes.iter().map(|s| s.as_ref().to_string()));
        let queue: Vec<&String> = input.iter().filter(|s| is_assume_relevant(s)).collect();
        if queue.is_empty() {
            return input;
        }

        let Some(cache) = &self.cache else {
            let granted = self.resolver.resolve_all(&queue);
            return scope::merge(&granted, &input);
        };

        let key = ExpansionCache::compute_key(&queue);
        if let Some(granted) = cache.get(&key) {
            metrics.record_cache_hit();
            debug!("Expansion cache hit for {} assume scopes", queue.len());
            return scope::merge(&granted, &input);
        }
        metrics.record_cache_miss();

        let granted = self.resolver.resolve_all(&queue);
        let expanded = scope::merge(&granted, &input);
        cache.put(key, granted);
        expanded
    }
}

/// Scope resolver service
///
/// Starts out unbuilt; every query fails with [`AuthzError::NotLoaded`]
/// until the first successful [`reload`](Self::reload). Reloads run one at
/// a time and publish a new snapshot with a single pointer swap, so readers
/// always see one consistent resolver and client table.
///
/// # Architecture
///
/// ```text
/// RoleStore ──┐
///             ├─ reload ─→ Resolver::build (blocking thread) ─→ Snapshot swap
/// ClientStore ┘                                                    │
///                        resolve / expand / load_client ←──────────┘
///                                  ↓
///                        [ExpansionCache]   [Metrics]
/// ```
pub struct ScopeResolver {
    config: ResolverConfig,
    roles: Arc<dyn RoleStore>,
    clients: Arc<dyn ClientStore>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    reload_lock: Mutex<()>,
    metrics: Arc<MetricsCollector>,
}

impl ScopeResolver {
    /// Create an unbuilt scope resolver over the given stores
    ///
    /// # Errors
    ///
    /// [`AuthzError::Config`] if `config` fails validation.
    pub fn new(
        config: ResolverConfig,
        roles: Arc<dyn RoleStore>,
        clients: Arc<dyn ClientStore>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "ScopeResolver initialized with cache={} (capacity {}), shuffle_traversal={}, reload_interval={}s",
            config.cache_enabled(),
            config.cache_capacity,
            config.shuffle_traversal,
            config.reload_interval_secs
        );

        Ok(Self {
            config,
            roles,
            clients,
            snapshot: RwLock::new(None),
            reload_lock: Mutex::new(()),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Whether a role set has been loaded
    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// When the current snapshot was published
    pub fn built_at(&self) -> Result<DateTime<Utc>> {
        Ok(self.current()?.built_at)
    }

    /// Fetch all roles and clients and rebuild
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        self.reload_all()
            .await
            .map_err(|e| self.failed("reload", e))
    }

    /// Spawn a task running a full [`reload`](Self::reload) every
    /// [`reload_interval`](ResolverConfig::reload_interval)
    ///
    /// Catches store changes whose targeted reload never arrived. A failed
    /// reload is logged and the previous snapshot stays published. The task
    /// ends once the last other `Arc` to the resolver is dropped.
    pub fn spawn_periodic_reload(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.reload_interval();
        let resolver = Arc::downgrade(&self);
        drop(self);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(resolver) = resolver.upgrade() else {
                    debug!("Scope resolver dropped, stopping periodic reload");
                    break;
                };
                match resolver.reload().await {
                    Ok(()) => debug!("Periodic reload completed"),
                    Err(e) => warn!("Periodic reload failed: {}", e),
                }
            }
        })
    }

    /// Refetch all roles, keeping the current clients
    ///
    /// Performs a full [`reload`](Self::reload) when nothing is loaded yet.
    pub async fn reload_roles(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        let result = match self.loaded() {
            Some(current) => match self.roles.list().await {
                Ok(roles) => self.rebuild(roles, current.clients.clone()).await,
                Err(e) => Err(e),
            },
            None => self.reload_all().await,
        };
        result.map_err(|e| self.failed("reload_roles", e))
    }

    /// Refetch one role and rebuild
    ///
    /// The role is replaced when the store still has it and removed
    /// otherwise. Performs a full [`reload`](Self::reload) when nothing is
    /// loaded yet.
    pub async fn reload_role(&self, role_id: &str) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        let result = match self.loaded() {
            Some(current) => match self.roles.get(role_id).await {
                Ok(fetched) => {
                    let mut roles: Vec<Role> = current
                        .roles
                        .iter()
                        .filter(|r| r.role_id != role_id)
                        .cloned()
                        .collect();
                    match fetched {
                        Some(role) => roles.push(role),
                        None => debug!("Role '{}' no longer exists, removing it", role_id),
                    }
                    self.rebuild(roles, current.clients.clone()).await
                }
                Err(e) => Err(e),
            },
            None => self.reload_all().await,
        };
        result.map_err(|e| self.failed("reload_role", e))
    }

    /// Refetch one client
    ///
    /// Roles are unchanged, so the current resolver and its expansion cache
    /// are reused. Performs a full [`reload`](Self::reload) when nothing is
    /// loaded yet.
    ///
    /// # Errors
    ///
    /// [`AuthzError::InvalidInput`] for an empty client id.
    pub async fn reload_client(&self, client_id: &str) -> Result<()> {
        if client_id.is_empty() {
            return Err(AuthzError::InvalidInput("clientId must not be empty".to_string()));
        }

        let _guard = self.reload_lock.lock().await;
        let Some(current) = self.loaded() else {
            return self
                .reload_all()
                .await
                .map_err(|e| self.failed("reload_client", e));
        };

        let fetched = self
            .clients
            .get(client_id)
            .await
            .map_err(|e| self.failed("reload_client", e))?;

        let mut clients = current.clients.clone();
        match fetched {
            Some(client) => {
                clients.insert(client_id.to_string(), client);
            }
            None => {
                clients.remove(client_id);
                debug!("Client '{}' no longer exists, removing it", client_id);
            }
        }

        let resolved: DashMap<ClientId, Arc<ResolvedClient>> = current
            .resolved
            .iter()
            .filter(|entry| entry.key() != client_id)
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        self.metrics.record_client_reload(clients.len());
        self.publish(Snapshot {
            resolver: Arc::clone(&current.resolver),
            roles: Arc::clone(&current.roles),
            clients,
            resolved,
            cache: current.cache.clone(),
            built_at: Utc::now(),
        });
        Ok(())
    }

    /// Scopes additionally granted by holding `scope`
    pub fn resolve(&self, scope: &str) -> Result<ScopeSet> {
        Ok(self.current()?.resolver.resolve(scope).to_vec())
    }

    /// Normalized `scopes` together with everything they grant
    pub fn expand<S: AsRef<str>>(&self, scopes: &[S]) -> Result<ScopeSet> {
        Ok(self.current()?.expand(scopes, &self.metrics))
    }

    /// Expanded scopes of the role with exactly this identifier
    pub fn expanded_role_scopes(&self, role_id: &str) -> Result<Option<ScopeSet>> {
        Ok(self
            .current()?
            .resolver
            .expanded_scopes(role_id)
            .map(<[String]>::to_vec))
    }

    /// Current resolver
    pub fn resolver(&self) -> Result<Arc<Resolver>> {
        Ok(Arc::clone(&self.current()?.resolver))
    }

    /// Load a client with its expanded scopes
    ///
    /// Expansion happens on first load and is reused until the next reload.
    ///
    /// # Errors
    ///
    /// [`AuthzError::ClientNotFound`], [`AuthzError::ClientDisabled`] or
    /// [`AuthzError::ClientExpired`] when the client cannot be used.
    pub fn load_client(&self, client_id: &str) -> Result<Arc<ResolvedClient>> {
        let snapshot = self.current()?;

        let client = snapshot
            .clients
            .get(client_id)
            .ok_or_else(|| AuthzError::ClientNotFound(client_id.to_string()))?;
        if client.disabled {
            return Err(AuthzError::ClientDisabled(client_id.to_string()));
        }
        if client.is_expired_at(Utc::now()) {
            return Err(AuthzError::ClientExpired(client_id.to_string()));
        }

        if let Some(resolved) = snapshot.resolved.get(client_id) {
            return Ok(Arc::clone(resolved.value()));
        }

        let resolved = Arc::new(ResolvedClient {
            client_id: client.client_id.clone(),
            unexpanded_scopes: client.scopes.clone(),
            expanded_scopes: snapshot.expand(&client.scopes, &self.metrics),
            expires: client.expires,
        });
        let entry = snapshot
            .resolved
            .entry(client_id.to_string())
            .or_insert(resolved);
        Ok(Arc::clone(entry.value()))
    }

    /// Statistics of the current expansion cache
    ///
    /// All zero when caching is disabled.
    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self
            .current()?
            .cache
            .as_ref()
            .map(|cache| cache.stats())
            .unwrap_or_default())
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> ResolverMetrics {
        self.metrics.get_metrics()
    }

    /// Metrics collector, for export
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    fn loaded(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    fn current(&self) -> Result<Arc<Snapshot>> {
        self.loaded().ok_or(AuthzError::NotLoaded)
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }

    fn failed(&self, operation: &str, err: AuthzError) -> AuthzError {
        self.metrics.record_error();
        warn!("{} failed, keeping the previous snapshot: {}", operation, err);
        err
    }

    async fn reload_all(&self) -> Result<()> {
        debug!("Loading clients and roles");
        let (roles, clients) = tokio::try_join!(self.roles.list(), self.clients.list())?;
        let clients = clients
            .into_iter()
            .map(|client| (client.client_id.clone(), client))
            .collect();
        self.rebuild(roles, clients).await
    }

    /// Build a resolver on a blocking thread and publish it with `clients`
    async fn rebuild(&self, roles: Vec<Role>, clients: HashMap<ClientId, Client>) -> Result<()> {
        if let Some(role) = roles.iter().find(|r| r.role_id.len() > MAX_ROLE_ID_LEN) {
            return Err(AuthzError::InvalidInput(format!(
                "role id '{}...' is longer than {} bytes",
                role.role_id.chars().take(32).collect::<String>(),
                MAX_ROLE_ID_LEN
            )));
        }

        let order = if self.config.shuffle_traversal {
            TraversalOrder::Shuffled
        } else {
            TraversalOrder::Sorted
        };

        let started = Instant::now();
        let roles = Arc::new(roles);
        let build_roles = Arc::clone(&roles);
        let resolver = tokio::task::spawn_blocking(move || Resolver::build_with(&build_roles, order))
            .await
            .map_err(|e| AuthzError::Internal(format!("resolver build task failed: {e}")))?;
        let elapsed = started.elapsed();

        self.metrics.record_rebuild(elapsed, &resolver, clients.len());
        info!(
            "Rebuilt scope resolver: {} roles, {} pool entries, {} clients in {:?}",
            resolver.role_count(),
            resolver.pool_len(),
            clients.len(),
            elapsed
        );

        let cache = self
            .config
            .cache_enabled()
            .then(|| Arc::new(ExpansionCache::new(self.config.cache_capacity)));

        self.publish(Snapshot {
            resolver: Arc::new(resolver),
            roles,
            clients,
            resolved: DashMap::new(),
            cache,
            built_at: Utc::now(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver")
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
