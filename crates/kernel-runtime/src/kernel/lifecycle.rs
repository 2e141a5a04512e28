//! Kernel lifecycle states and start modes.

use crate::error::{KernelError, KernelResult};
use std::fmt;
use std::num::NonZeroU16;
use std::str::FromStr;

/// Where a kernel is in its life. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Constructed,
    AcceptingContributions,
    Materializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    fn can_advance_to(self, next: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Constructed, AcceptingContributions)
                | (AcceptingContributions, Materializing)
                | (Materializing, Running)
                | (Materializing, Stopped)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    /// Move to `next`, refusing backward or skipping moves.
    pub fn advance(&mut self, next: Self) -> KernelResult<()> {
        if !self.can_advance_to(next) {
            return Err(KernelError::IllegalTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

/// How a started kernel binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// No network listener.
    Headless,
    /// The port from configuration.
    #[default]
    DefaultPort,
    Port(NonZeroU16),
}

impl StartMode {
    /// Marker selecting headless mode.
    pub const HEADLESS_MARKER: &'static str = "app";

    /// `""` → default port, `"app"` → headless, digits → that port.
    pub fn parse(input: &str) -> KernelResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::DefaultPort);
        }
        if trimmed == Self::HEADLESS_MARKER {
            return Ok(Self::Headless);
        }
        trimmed
            .parse::<NonZeroU16>()
            .map(Self::Port)
            .map_err(|_| KernelError::InvalidStartMode(input.to_string()))
    }

    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Headless)
    }

    /// The port to bind, or `None` when headless.
    pub fn resolve_port(&self, configured: u16) -> Option<u16> {
        match self {
            Self::Headless => None,
            Self::DefaultPort => Some(configured),
            Self::Port(port) => Some(port.get()),
        }
    }
}

impl FromStr for StartMode {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Headless => f.write_str(Self::HEADLESS_MARKER),
            Self::DefaultPort => f.write_str("default"),
            Self::Port(port) => write!(f, "{port}"),
        }
    }
}
