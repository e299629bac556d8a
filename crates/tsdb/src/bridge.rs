//! Panic bridge and engine log forwarding.
//!
//! The engine reports fatal conditions through its own channel, independent of
//! any single cursor. [`PanicState`] captures the first such report and every
//! binding entry point consults it before touching the engine.
//!
//! ```rust,ignore
//! use alopex_tsdb::bridge::PanicState;
//!
//! let state = PanicState::new();
//! assert!(state.try_set("engine corrupt"));
//! assert!(!state.try_set("something else"));
//! assert_eq!(state.snapshot().as_deref(), Some("engine corrupt"));
//! ```

use crate::error::{Result, TsdbError};
use std::sync::OnceLock;
use tracing::{error, info, trace};

/// Target used for messages forwarded from the engine's log channel.
pub const ENGINE_LOG_TARGET: &str = "alopex_tsdb::engine";

/// Set-once record of an engine panic.
///
/// Shared through an `Arc` between the engine and every binding resource.
/// The first message wins; later reports are ignored.
#[derive(Debug, Default)]
pub struct PanicState {
    message: OnceLock<String>,
}

impl PanicState {
    /// Creates a state with no panic recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a panic message. Returns false if a panic was already recorded.
    pub fn try_set(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        match self.message.set(message) {
            Ok(()) => {
                error!(
                    target: ENGINE_LOG_TARGET,
                    "Engine panic recorded: {}",
                    self.message.get().map(String::as_str).unwrap_or_default()
                );
                true
            }
            Err(ignored) => {
                trace!(target: ENGINE_LOG_TARGET, "Ignoring subsequent panic: {}", ignored);
                false
            }
        }
    }

    /// Records a panic message, keeping the first one if already set.
    pub fn record_panic(&self, message: impl Into<String>) {
        self.try_set(message);
    }

    /// Returns true once a panic has been recorded.
    pub fn has_panic(&self) -> bool {
        self.message.get().is_some()
    }

    /// Returns the recorded panic message, if any.
    pub fn snapshot(&self) -> Option<String> {
        self.message.get().cloned()
    }

    /// Fails with [`TsdbError::Panic`] if a panic has been recorded.
    pub fn check(&self) -> Result<()> {
        match self.message.get() {
            Some(message) => Err(TsdbError::Panic(message.clone())),
            None => Ok(()),
        }
    }
}

/// Severity of a message on the engine's log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLogLevel {
    /// Errors.
    Error,
    /// Informational messages.
    Info,
    /// Verbose tracing.
    Trace,
}

/// Forwards a message from the engine's log channel to `tracing`.
pub fn forward_engine_log(level: EngineLogLevel, message: &str) {
    match level {
        EngineLogLevel::Error => error!(target: ENGINE_LOG_TARGET, "{}", message),
        EngineLogLevel::Info => info!(target: ENGINE_LOG_TARGET, "{}", message),
        EngineLogLevel::Trace => trace!(target: ENGINE_LOG_TARGET, "{}", message),
    }
}
