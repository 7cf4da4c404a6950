//! Engine configuration surface (§4.12).
//!
//! # Why
//! Even a crate whose core is "just" a close protocol needs a documented,
//! testable place for the handful of knobs that vary per deployment: the
//! engine's diagnostic id, and how loud shutdown logging should be. Plain
//! data plus a builder keeps those knobs out of the engine's hot path while
//! still letting a host override them from the environment.
//!
//! # How
//! [`EngineConfig::from_env`] reads `RELAY_ENGINE_*` variables as overrides
//! on top of [`EngineConfigBuilder`] defaults; precedence is builder value
//! (if explicitly set) > environment > default, matching the layered
//! configuration posture used elsewhere in the surrounding codebase.

use std::env;

use tracing::Level;

use crate::ids::EngineId;

const ENV_DIAGNOSTICS_LEVEL: &str = "RELAY_ENGINE_SHUTDOWN_DIAGNOSTICS_LEVEL";
const ENV_QUEUE_CAPACITY_HINT: &str = "RELAY_ENGINE_QUEUE_CAPACITY_HINT";

/// Runtime configuration for one [`crate::engine::Engine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    id: EngineId,
    /// Level at which routine shutdown-progress events (close requested,
    /// child closed, quiescence reached) are emitted. Contract violations
    /// and post failures always log at their own fixed level regardless of
    /// this setting (§4.10).
    shutdown_diagnostics_level: Level,
    /// Diagnostic-only expectation for an owned runloop's queue depth; the
    /// queue itself stays logically unbounded (§5). Exceeding this is not
    /// an error — it is only a hint future backpressure counters can
    /// compare actual depth against.
    queue_capacity_hint: Option<usize>,
}

impl EngineConfig {
    /// Start building a configuration for an explicitly-named engine.
    pub fn builder(id: EngineId) -> EngineConfigBuilder {
        EngineConfigBuilder {
            id,
            shutdown_diagnostics_level: None,
            queue_capacity_hint: None,
        }
    }

    /// Build directly from environment variables, generating an id since
    /// none is supplied. Unset or unparsable variables fall back to
    /// defaults.
    pub fn from_env() -> Self {
        Self::builder(EngineId::generate()).apply_env().build()
    }

    pub fn id(&self) -> &EngineId {
        &self.id
    }

    pub fn shutdown_diagnostics_level(&self) -> Level {
        self.shutdown_diagnostics_level
    }

    pub fn queue_capacity_hint(&self) -> Option<usize> {
        self.queue_capacity_hint
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder(EngineId::generate()).build()
    }
}

/// Builder for [`EngineConfig`]; see module docs for precedence rules.
pub struct EngineConfigBuilder {
    id: EngineId,
    shutdown_diagnostics_level: Option<Level>,
    queue_capacity_hint: Option<usize>,
}

impl EngineConfigBuilder {
    pub fn shutdown_diagnostics_level(mut self, level: Level) -> Self {
        self.shutdown_diagnostics_level = Some(level);
        self
    }

    pub fn queue_capacity_hint(mut self, hint: usize) -> Self {
        self.queue_capacity_hint = Some(hint);
        self
    }

    /// Fill in any field not already set explicitly from the matching
    /// `RELAY_ENGINE_*` environment variable. Called automatically by
    /// [`EngineConfig::from_env`]; callers composing their own precedence
    /// chain may call it directly.
    pub fn apply_env(mut self) -> Self {
        if self.shutdown_diagnostics_level.is_none() {
            if let Ok(raw) = env::var(ENV_DIAGNOSTICS_LEVEL) {
                if let Ok(level) = raw.parse::<Level>() {
                    self.shutdown_diagnostics_level = Some(level);
                }
            }
        }
        if self.queue_capacity_hint.is_none() {
            if let Ok(raw) = env::var(ENV_QUEUE_CAPACITY_HINT) {
                if let Ok(hint) = raw.parse::<usize>() {
                    self.queue_capacity_hint = Some(hint);
                }
            }
        }
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            id: self.id,
            shutdown_diagnostics_level: self.shutdown_diagnostics_level.unwrap_or(Level::DEBUG),
            queue_capacity_hint: self.queue_capacity_hint,
        }
    }
}
