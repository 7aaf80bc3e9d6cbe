//! Staged degradation
//!
//! A three-level state machine that steps retrieval and creation behavior
//! down under sustained failure instead of failing the caller. Severity
//! only increases on failure; a successful health check resets to `Full`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Operating mode the subsystem adopts under failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    /// Semantic retrieval and memory creation both enabled
    #[default]
    Full,
    /// Retrieval falls back to recency scans; creation restricted to
    /// high-importance records
    Limited,
    /// Retrieval returns empty; no new records are created
    Minimal,
}

impl DegradationLevel {
    fn step_up(self) -> Self {
        match self {
            DegradationLevel::Full => DegradationLevel::Limited,
            DegradationLevel::Limited | DegradationLevel::Minimal => DegradationLevel::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationLevel::Full => "full",
            DegradationLevel::Limited => "limited",
            DegradationLevel::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degradation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Minimum estimated importance for creation at `Limited`
    pub creation_floor: f32,
    /// Bounded internal retries before a failure steps the level
    pub max_transient_retries: u32,
    /// Base delay for exponential backoff between retries
    pub backoff_base_ms: u64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            creation_floor: 0.7,
            max_transient_retries: 2,
            backoff_base_ms: 50,
        }
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    level: DegradationLevel,
    consecutive_failures: u32,
    total_step_ups: u64,
}

/// Observes failures and walks the level machine
pub struct DegradationController {
    config: DegradationConfig,
    state: Mutex<ControllerState>,
}

impl Default for DegradationController {
    fn default() -> Self {
        Self::new(DegradationConfig::default())
    }
}

impl DegradationController {
    pub fn new(config: DegradationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }

    pub fn level(&self) -> DegradationLevel {
        self.state.lock().level
    }

    /// Record an unhandled failure; severity increases one level (capped)
    /// and the new level is returned so the caller can retry once at it.
    pub fn record_failure(&self, operation: &str) -> DegradationLevel {
        let mut state = self.state.lock();
        let previous = state.level;
        state.level = state.level.step_up();
        state.consecutive_failures += 1;
        if state.level != previous {
            state.total_step_ups += 1;
            tracing::warn!(
                operation,
                from = %previous,
                to = %state.level,
                "memory subsystem degraded"
            );
        }
        state.level
    }

    /// Record a successful operation. Does not change the level; recovery
    /// is only via an explicit health check.
    pub fn record_success(&self) {
        self.state.lock().consecutive_failures = 0;
    }

    /// Manual reset to `Full` after a successful health check
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.level != DegradationLevel::Full {
            tracing::info!(from = %state.level, "memory subsystem restored to full");
        }
        state.level = DegradationLevel::Full;
        state.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Whether a record with this estimated importance may be created at
    /// the current level.
    pub fn allows_creation(&self, estimated_importance: f32) -> bool {
        match self.level() {
            DegradationLevel::Full => true,
            DegradationLevel::Limited => estimated_importance > self.config.creation_floor,
            DegradationLevel::Minimal => false,
        }
    }
}
