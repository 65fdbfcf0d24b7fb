//! Form configuration.

use crate::error::FormResult;
use crate::validation::RunMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Debounce applied to field validation when no rule sets its own.
pub const DEFAULT_DEBOUNCE_MS: u64 = 160;

/// When queued change notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Deliver on the next turn of the async runtime, coalescing every change
    /// made before the current task yields. Falls back to `Immediate` when no
    /// runtime is running.
    #[default]
    Deferred,
    /// Deliver at the end of every top-level operation.
    Immediate,
    /// Deliver only when [`crate::Form::flush`] is called.
    Manual,
}

/// Configuration for a [`crate::Form`].
///
/// Every field has a default, so configuration text only needs to name what
/// it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Values the form starts from; also the baseline for dirty tracking.
    pub initial_values: Value,
    /// Debounce in milliseconds used when no applicable rule sets one.
    pub default_debounce_ms: u64,
    /// Keep a field's value in the store after it unregisters.
    pub preserve: bool,
    /// Notification delivery policy.
    pub flush_policy: FlushPolicy,
    /// How a field's rules are run when the caller does not choose.
    pub validate_mode: RunMode,
    /// Reject computed fields that would close a dependency cycle.
    pub strict_dependencies: bool,
    /// Only validate dirty fields on submit.
    pub submit_dirty_only: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            initial_values: Value::Object(Default::default()),
            default_debounce_ms: DEFAULT_DEBOUNCE_MS,
            preserve: false,
            flush_policy: FlushPolicy::default(),
            validate_mode: RunMode::default(),
            strict_dependencies: false,
            submit_dirty_only: false,
        }
    }
}

impl FormConfig {
    /// Parse configuration from JSON text.
    pub fn from_json_str(text: &str) -> FormResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_initial_values(mut self, values: Value) -> Self {
        self.initial_values = values;
        self
    }

    pub fn with_default_debounce_ms(mut self, ms: u64) -> Self {
        self.default_debounce_ms = ms;
        self
    }

    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_validate_mode(mut self, mode: RunMode) -> Self {
        self.validate_mode = mode;
        self
    }

    pub fn with_strict_dependencies(mut self, strict: bool) -> Self {
        self.strict_dependencies = strict;
        self
    }

    pub fn with_submit_dirty_only(mut self, dirty_only: bool) -> Self {
        self.submit_dirty_only = dirty_only;
        self
    }
}
