//! Error types for the scope resolution engine

use thiserror::Error;

/// Scope resolution engine errors
///
/// The scope algebra, matcher and expander are total over well-formed
/// input and never produce these; they come from the service layer and
/// its collaborators.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No role set has been loaded yet
    #[error("Scope resolver has not been loaded")]
    NotLoaded,

    /// Client is unknown
    #[error("Client with clientId '{0}' not found")]
    ClientNotFound(String),

    /// Client exists but is disabled
    #[error("Client with clientId '{0}' is disabled")]
    ClientDisabled(String),

    /// Client exists but has expired
    #[error("Client with clientId '{0}' has expired")]
    ClientExpired(String),

    /// Role or client store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for scope resolution operations
pub type Result<T> = std::result::Result<T, AuthzError>;
