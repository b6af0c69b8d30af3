//! Core role and client types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role identifier, may end in `*` to cover every identifier with that prefix
pub type RoleId = String;

/// Client identifier
pub type ClientId = String;

/// Named bundle of scopes granted to holders of `assume:<roleId>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Role identifier (e.g., "worker-pool:build", "project:ci-*")
    pub role_id: RoleId,

    /// Scopes granted by the role; normalized when the resolver is built
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Role {
    /// Create a new role
    pub fn new<I, S>(role_id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role_id: role_id.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// The scope a caller must hold to assume this role
    pub fn assume_scope(&self) -> String {
        format!("assume:{}", self.role_id)
    }
}

/// Client credentials as supplied by the client store
///
/// Only the fields that influence scope expansion are carried here;
/// secrets stay with the credential verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Client identifier
    pub client_id: ClientId,

    /// The client's own, unexpanded scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Disabled clients cannot be loaded
    #[serde(default)]
    pub disabled: bool,

    /// Expiration timestamp
    pub expires: DateTime<Utc>,
}

impl Client {
    /// Create a new enabled client
    pub fn new<I, S>(client_id: impl Into<String>, scopes: I, expires: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            disabled: false,
            expires,
        }
    }

    /// Mark the client as disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Whether the client has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires < now
    }
}

/// A loaded client together with its fully expanded scopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedClient {
    /// Client identifier
    pub client_id: ClientId,

    /// Scopes as stored for the client
    pub unexpanded_scopes: Vec<String>,

    /// Normalized scopes including everything granted through roles
    pub expanded_scopes: Vec<String>,

    /// Expiration timestamp
    pub expires: DateTime<Utc>,
}
