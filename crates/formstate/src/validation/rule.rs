//! Validation rule description.

use super::Validator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Which built-in type checks a rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Length and pattern checks.
    #[default]
    String,
    /// Numeric range and equality.
    Number,
    /// Integers, with optional range.
    Integer,
    /// Finite non-integer numbers.
    Float,
    Boolean,
    /// Date strings or millisecond timestamps, with optional range.
    Date,
    /// Membership in [`Rule::enum_values`].
    Enum,
    Email,
    /// `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA`, `#` optional.
    Hex,
    /// A compilable regular expression.
    Regexp,
    Url,
}

/// How the rules of one field are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One at a time, stopping at the first error.
    Serial,
    /// Concurrently, settling at the first error.
    ParallelFirst,
    /// Concurrently, collecting every error and warning.
    #[default]
    ParallelAll,
}

/// A numeric or date bound for `min`/`max`.
#[derive(Debug, Clone, PartialEq)]
pub enum Limit {
    Number(f64),
    /// A date string, or a number written as text.
    Text(String),
}

impl From<f64> for Limit {
    fn from(n: f64) -> Self {
        Limit::Number(n)
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        Limit::Number(n as f64)
    }
}

impl From<i32> for Limit {
    fn from(n: i32) -> Self {
        Limit::Number(f64::from(n))
    }
}

impl From<&str> for Limit {
    fn from(s: &str) -> Self {
        Limit::Text(s.to_owned())
    }
}

impl From<String> for Limit {
    fn from(s: String) -> Self {
        Limit::Text(s)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Number(n) => f.write_str(&super::check::format_number(*n)),
            Limit::Text(s) => f.write_str(s),
        }
    }
}

/// Value transform applied before a rule's checks.
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One validation rule for a field.
///
/// Rules are built with the `with_*` methods:
///
/// ```
/// use formstate::{Rule, RuleType};
///
/// let rule = Rule::of_type(RuleType::Number)
///     .with_required()
///     .with_min(0)
///     .with_max(120)
///     .with_message("Age must be between 0 and 120");
/// assert!(rule.required);
/// ```
#[derive(Clone, Default)]
pub struct Rule {
    pub rule_type: RuleType,
    pub required: bool,
    /// Reject strings that are only whitespace (with `required`).
    pub whitespace: bool,
    /// Skip every check when the value is empty and not required.
    /// Unset means `true`.
    pub skip_if_empty: Option<bool>,
    pub min: Option<Limit>,
    pub max: Option<Limit>,
    /// Exact string length, or exact number for numeric rules.
    pub len: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub enum_values: Vec<Value>,
    /// Replaces the built-in failure message.
    pub message: Option<String>,
    pub validator: Option<Arc<dyn Validator>>,
    /// Triggers this rule runs on. Empty means every trigger.
    pub validate_trigger: Vec<String>,
    pub debounce_ms: Option<u64>,
    /// Report failures as warnings.
    pub warning_only: bool,
    pub transform: Option<Transform>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("rule_type", &self.rule_type)
            .field("required", &self.required)
            .field("whitespace", &self.whitespace)
            .field("skip_if_empty", &self.skip_if_empty)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("len", &self.len)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("enum_values", &self.enum_values)
            .field("message", &self.message)
            .field("validator", &self.validator.is_some())
            .field("validate_trigger", &self.validate_trigger)
            .field("debounce_ms", &self.debounce_ms)
            .field("warning_only", &self.warning_only)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    /// A string rule that only requires a non-empty value.
    pub fn required() -> Self {
        Self::default().with_required()
    }

    pub fn of_type(rule_type: RuleType) -> Self {
        Self {
            rule_type,
            ..Self::default()
        }
    }

    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_whitespace(mut self) -> Self {
        self.whitespace = true;
        self
    }

    pub fn with_skip_if_empty(mut self, skip: bool) -> Self {
        self.skip_if_empty = Some(skip);
        self
    }

    pub fn with_min(mut self, min: impl Into<Limit>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn with_max(mut self, max: impl Into<Limit>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn with_len(mut self, len: impl Into<f64>) -> Self {
        self.len = Some(len.into());
        self
    }

    pub fn with_min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn with_max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_enum(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = values.into_iter().collect();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Add a trigger this rule runs on.
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.validate_trigger.push(trigger.into());
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    pub fn warning_only(mut self) -> Self {
        self.warning_only = true;
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub(crate) fn skips_empty(&self) -> bool {
        self.skip_if_empty != Some(false)
    }

    /// True if the rule runs for any of `triggers`. No triggers on either
    /// side means it runs.
    pub fn applies_to(&self, triggers: &[String]) -> bool {
        triggers.is_empty()
            || self.validate_trigger.is_empty()
            || self.validate_trigger.iter().any(|t| triggers.contains(t))
    }

    /// Failure outcome honoring `message` and `warning_only`.
    pub(crate) fn fail(&self, default: impl Into<String>) -> RuleOutcome {
        let text = self.message.clone().unwrap_or_else(|| default.into());
        if self.warning_only {
            RuleOutcome::warning(text)
        } else {
            RuleOutcome::error(text)
        }
    }
}

/// Result of checking one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl RuleOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            warning: None,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            error: None,
            warning: Some(text.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.warning.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_to_triggers() {
        let any = Rule::required();
        assert!(any.applies_to(&["blur".into()]));
        let blur = Rule::required().with_trigger("blur");
        assert!(blur.applies_to(&[]));
        assert!(blur.applies_to(&["change".into(), "blur".into()]));
        assert!(!blur.applies_to(&["change".into()]));
    }

    #[test]
    fn test_fail_honors_message_and_warning_only() {
        let rule = Rule::required();
        assert_eq!(rule.fail("x"), RuleOutcome::error("x"));
        let rule = Rule::required().with_message("custom").warning_only();
        assert_eq!(rule.fail("x"), RuleOutcome::warning("custom"));
    }

    #[test]
    fn test_limit_display_drops_trailing_zero() {
        assert_eq!(Limit::from(5).to_string(), "5");
        assert_eq!(Limit::from(2.5).to_string(), "2.5");
        assert_eq!(Limit::from("2024-01-01").to_string(), "2024-01-01");
    }
}
