//! Field validation: rules, checks and run modes.

mod check;
mod rule;
mod runner;

pub use check::{coerce_to_number, coerce_to_string, is_empty_value, parse_date_ms, RuleChecker, TypeCheck};
pub use rule::{Limit, Rule, RuleOutcome, RuleType, RunMode, Transform};
pub use runner::{run_rules, RuleReport};

use crate::error::ValidatorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Custom check run after a rule's built-in checks.
///
/// Return `Ok(Some(message))` to fail the rule with `message`, `Ok(None)`
/// to pass. `Err` means the validator itself could not run; the field then
/// shows the error text as its only error.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        rule: &Rule,
        value: &Value,
        values: &Value,
    ) -> Result<Option<String>, ValidatorError>;
}

/// Validator backed by a synchronous closure `(value, all_values)`.
pub struct FnValidator<F>(F);

/// Wrap a synchronous closure as a [`Validator`].
pub fn validator_fn<F>(f: F) -> FnValidator<F>
where
    F: Fn(&Value, &Value) -> Option<String> + Send + Sync + 'static,
{
    FnValidator(f)
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, &Value) -> Option<String> + Send + Sync + 'static,
{
    async fn validate(
        &self,
        _rule: &Rule,
        value: &Value,
        values: &Value,
    ) -> Result<Option<String>, ValidatorError> {
        Ok((self.0)(value, values))
    }
}

/// Validator backed by an async closure taking owned `(value, all_values)`.
pub struct AsyncFnValidator<F>(F);

/// Wrap an async closure as a [`Validator`].
pub fn async_validator<F, Fut>(f: F) -> AsyncFnValidator<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, ValidatorError>> + Send + 'static,
{
    AsyncFnValidator(f)
}

#[async_trait]
impl<F, Fut> Validator for AsyncFnValidator<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, ValidatorError>> + Send + 'static,
{
    async fn validate(
        &self,
        _rule: &Rule,
        value: &Value,
        values: &Value,
    ) -> Result<Option<String>, ValidatorError> {
        (self.0)(value.clone(), values.clone()).await
    }
}

/// Options for a validation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateOptions {
    /// Run mode; the form's configured mode when unset.
    pub mode: Option<RunMode>,
    /// Triggers that caused this validation. Empty runs every rule.
    pub trigger: Vec<String>,
    /// When validating several fields with no explicit list, only the dirty
    /// ones. Ignored for single-field validation.
    pub dirty: bool,
}

impl ValidateOptions {
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger.push(trigger.into());
        self
    }

    pub fn dirty_only(mut self) -> Self {
        self.dirty = true;
        self
    }
}

/// Outcome of validating one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// No errors (warnings allowed).
    Valid,
    /// At least one error.
    Invalid,
    /// Superseded by a newer run, or cancelled by a reset; nothing was
    /// written.
    Stale,
}

impl ValidationStatus {
    pub fn is_valid(self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }
}
