//! Error taxonomy for the router.
//!
//! A single enum carries a discriminator the retry policy can match on
//! directly, rather than forcing callers to downcast or inspect exception
//! types.

use thiserror::Error;

/// Errors surfaced by [`crate::Deployment`] and [`crate::Switchboard`].
#[derive(Debug, Clone, Error)]
pub enum SwitchboardError {
    /// Construction-time or request-time misconfiguration. Never retried.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// No deployment is currently healthy for the requested model.
    #[error("No eligible deployments for model {model}")]
    NoEligibleDeployments {
        /// The model that had no healthy candidates.
        model: String,
    },

    /// Upstream signaled quota exhaustion. The deployment is marked down;
    /// retried once on a different deployment.
    #[error("Rate limited by deployment {deployment}")]
    RateLimited {
        /// The deployment that rejected the request.
        deployment: String,
    },

    /// Timeout, connection failure, 5xx, or any other unclassified upstream
    /// fault. The deployment is marked down; retried once.
    #[error("Transient upstream error from deployment {deployment}: {message}")]
    TransientUpstreamError {
        /// The deployment the error originated from.
        deployment: String,
        /// Upstream-provided detail, if any.
        message: String,
    },

    /// A 4xx upstream response other than rate-limiting (malformed request,
    /// auth failure, etc). Surfaced as-is, never retried, never marks the
    /// deployment down.
    #[error("Client fault from deployment {deployment}: {message}")]
    ClientFault {
        /// The deployment the error originated from.
        deployment: String,
        /// Upstream-provided detail, if any.
        message: String,
    },

    /// Cooperative cancellation. Propagated unchanged; no mark-down, no
    /// retry.
    #[error("Request cancelled")]
    Cancelled,
}

impl SwitchboardError {
    /// The discriminator the failover policy matches on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchboardError::ConfigError(_) => ErrorKind::ConfigError,
            SwitchboardError::NoEligibleDeployments { .. } => ErrorKind::NoEligibleDeployments,
            SwitchboardError::RateLimited { .. } => ErrorKind::RateLimited,
            SwitchboardError::TransientUpstreamError { .. } => ErrorKind::TransientUpstreamError,
            SwitchboardError::ClientFault { .. } => ErrorKind::ClientFault,
            SwitchboardError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the failover loop should attempt another deployment.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited | ErrorKind::TransientUpstreamError)
    }
}

/// Discriminator for [`SwitchboardError`], used to drive retry decisions
/// without matching on the full error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigError,
    NoEligibleDeployments,
    RateLimited,
    TransientUpstreamError,
    ClientFault,
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SwitchboardError>;
