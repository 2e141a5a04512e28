//! # Kernel Errors
//!
//! One taxonomy for everything that can go wrong between reading the
//! configuration and serving the first request.
//!
//! | Error | Raised at | Effect |
//! |-------|-----------|--------|
//! | `Configuration` | construction | process must not start |
//! | `Registration`, `PluginShape`, `Path`, `ReservedName` | the registration call | call aborted, registry intact |
//! | `AlreadyMaterialized` | any mutation after lock | call aborted |
//! | `NamespaceCollision`, `Resource` | materialization | boot aborted |

use crate::kernel::LifecycleState;
use crate::ports::{IdentityError, ResourceError};
use crate::supervisor::SupervisorError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Invalid configuration field '{field}': {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("Registration rejected: {0}")]
    Registration(String),

    #[error("Plugin '{plugin}' has wrong shape: {reason}")]
    PluginShape { plugin: String, reason: String },

    #[error("Middleware path '{0}' must start with '/'")]
    Path(String),

    #[error("Kernel is already materialized, contributions can no longer change")]
    AlreadyMaterialized,

    #[error("Namespace collision: namespace '{namespace}' already has field '{field}'")]
    NamespaceCollision { namespace: String, field: String },

    #[error("Model name '{0}' is reserved")]
    ReservedName(String),

    #[error("Plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("Route installation failed: {0}")]
    RouteConflict(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Server(String),

    #[error("Invalid start mode '{0}': expected nothing, 'app' or a positive port number")]
    InvalidStartMode(String),

    #[error("Illegal lifecycle transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl KernelError {
    /// True for errors raised synchronously by a registration call, which
    /// leave the registry exactly as it was.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::Registration(_)
                | Self::PluginShape { .. }
                | Self::Path(_)
                | Self::ReservedName(_)
                | Self::PluginNotFound(_)
                | Self::AlreadyMaterialized
        )
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(plugin: &str, reason: impl Into<String>) -> Self {
        Self::PluginShape {
            plugin: plugin.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the kernel.
pub type KernelResult<T> = Result<T, KernelError>;
