//! # Kernel Telemetry
//!
//! Installs the process-wide `tracing` subscriber used by the kernel and its
//! worker processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KERNEL_SERVICE_NAME` | `plexus-kernel` | Service name attached to startup logs |
//! | `KERNEL_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `KERNEL_JSON_LOGS` | `false` | Emit one JSON object per line |
//! | `KERNEL_LOG_TARGET` | `true` | Include the module target |
//! | `KERNEL_LOG_THREAD_IDS` | `false` | Include thread ids |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_telemetry};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Span helper carrying the worker slot, used by cluster workers.
#[macro_export]
macro_rules! worker_span {
    ($slot:expr) => {
        tracing::info_span!("kernel_worker", slot = $slot)
    };
}
