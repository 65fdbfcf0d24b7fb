//! Built-in rule checks.
//!
//! A rule is checked in three stages: the base stage (required, whitespace,
//! empty skipping), the type checks registered for the rule's
//! [`RuleType`], then the rule's custom validator. The first failure wins.

use super::rule::{Limit, Rule, RuleOutcome, RuleType};
use crate::error::ValidatorError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use formstate_tree::values_equal;
use futures::FutureExt;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

/// A type check: `(rule, value, all_values) -> outcome`.
pub type TypeCheck = Arc<dyn Fn(&Rule, &Value, &Value) -> RuleOutcome + Send + Sync>;

/// Registry of type checks, one list per [`RuleType`].
#[derive(Clone)]
pub struct RuleChecker {
    types: HashMap<RuleType, Vec<TypeCheck>>,
}

impl fmt::Debug for RuleChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<_> = self.types.iter().map(|(t, c)| (*t, c.len())).collect();
        counts.sort_by_key(|(t, _)| format!("{t:?}"));
        f.debug_struct("RuleChecker").field("types", &counts).finish()
    }
}

impl Default for RuleChecker {
    fn default() -> Self {
        let mut checker = Self::empty();
        checker.register_type(RuleType::String, vec![Arc::new(check_string) as TypeCheck]);
        checker.register_type(RuleType::Number, vec![Arc::new(check_number) as TypeCheck]);
        checker.register_type(RuleType::Integer, vec![Arc::new(check_integer) as TypeCheck]);
        checker.register_type(RuleType::Float, vec![Arc::new(check_float) as TypeCheck]);
        checker.register_type(RuleType::Date, vec![Arc::new(check_date) as TypeCheck]);
        checker.register_type(RuleType::Enum, vec![Arc::new(check_enum) as TypeCheck]);
        checker.register_type(RuleType::Boolean, vec![Arc::new(check_boolean) as TypeCheck]);
        checker.register_type(RuleType::Email, vec![Arc::new(check_email) as TypeCheck]);
        checker.register_type(RuleType::Hex, vec![Arc::new(check_hex) as TypeCheck]);
        checker.register_type(RuleType::Regexp, vec![Arc::new(check_regexp) as TypeCheck]);
        checker.register_type(RuleType::Url, vec![Arc::new(check_url) as TypeCheck]);
        checker
    }
}

enum Base {
    Fail(RuleOutcome),
    Skip,
    Continue,
}

impl RuleChecker {
    /// A checker with no type checks; only base checks and custom
    /// validators run.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Replace the checks for `rule_type`.
    pub fn register_type(&mut self, rule_type: RuleType, checks: Vec<TypeCheck>) {
        self.types.insert(rule_type, checks);
    }

    /// Check one rule against a value.
    ///
    /// `Err` means the custom validator failed to run (or panicked), not
    /// that the value is invalid.
    pub async fn check(
        &self,
        value: &Value,
        rule: &Rule,
        values: &Value,
    ) -> Result<RuleOutcome, ValidatorError> {
        let transformed;
        let value = match &rule.transform {
            Some(transform) => {
                transformed = transform(value);
                &transformed
            }
            None => value,
        };

        match base_check(rule, value) {
            Base::Fail(outcome) => return Ok(outcome),
            Base::Skip => return Ok(RuleOutcome::ok()),
            Base::Continue => {}
        }

        if let Some(checks) = self.types.get(&rule.rule_type) {
            for check in checks {
                let outcome = check(rule, value, values);
                if !outcome.is_ok() {
                    return Ok(outcome);
                }
            }
        }

        let Some(validator) = &rule.validator else {
            return Ok(RuleOutcome::ok());
        };
        let run = AssertUnwindSafe(validator.validate(rule, value, values)).catch_unwind();
        match run.await {
            Ok(Ok(Some(message))) if !message.is_empty() => Ok(if rule.warning_only {
                RuleOutcome::warning(message)
            } else {
                RuleOutcome::error(message)
            }),
            Ok(Ok(_)) => Ok(RuleOutcome::ok()),
            Ok(Err(err)) => Err(err),
            Err(panic) => Err(ValidatorError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "validator panicked".to_owned()
    }
}

/// Null, the empty string and the empty array are empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn base_check(rule: &Rule, value: &Value) -> Base {
    if rule.required {
        if is_empty_value(value) {
            return Base::Fail(rule.fail("This field is required"));
        }
        if rule.whitespace {
            if let Value::String(s) = value {
                if !s.is_empty() && s.trim().is_empty() {
                    return Base::Fail(rule.fail("Only whitespace is not allowed"));
                }
            }
        }
    } else if rule.skips_empty() && is_empty_value(value) {
        return Base::Skip;
    }
    Base::Continue
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

fn check_string(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let len = length_of(value);
    if let Some(min) = rule.min_length {
        if len.is_some_and(|l| l < min) || (value.is_null() && min > 0) {
            return rule.fail(format!("Min length is {min}"));
        }
    }
    if let Some(max) = rule.max_length {
        if len.is_some_and(|l| l > max) {
            return rule.fail(format!("Max length is {max}"));
        }
    }
    if let Some(exact) = rule.len {
        if len.map(|l| l as f64) != Some(exact) {
            return rule.fail(format!("Length must be {}", format_number(exact)));
        }
    }
    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(&coerce_to_string(value)) {
            return rule.fail("Pattern not match");
        }
    }
    RuleOutcome::ok()
}

fn check_range(rule: &Rule, num: f64) -> Option<RuleOutcome> {
    if let Some(min) = &rule.min {
        if min.as_number().is_some_and(|m| num < m) {
            return Some(rule.fail(format!("Min is {min}")));
        }
    }
    if let Some(max) = &rule.max {
        if max.as_number().is_some_and(|m| num > m) {
            return Some(rule.fail(format!("Max is {max}")));
        }
    }
    None
}

fn check_number(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let num = coerce_to_number(value);
    if !num.is_finite() {
        return rule.fail("Must be a number");
    }
    if let Some(outcome) = check_range(rule, num) {
        return outcome;
    }
    if let Some(exact) = rule.len {
        if num != exact {
            return rule.fail(format!("Must equal {}", format_number(exact)));
        }
    }
    RuleOutcome::ok()
}

fn check_integer(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let num = coerce_to_number(value);
    if !num.is_finite() || num.fract() != 0.0 {
        return rule.fail("Must be an integer");
    }
    check_range(rule, num).unwrap_or_default()
}

fn check_float(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let num = coerce_to_number(value);
    if !num.is_finite() || num.fract() == 0.0 {
        return rule.fail("Must be a float");
    }
    RuleOutcome::ok()
}

fn check_date(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let ms = match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_date_ms(s),
        _ => None,
    };
    let Some(ms) = ms else {
        return rule.fail("Must be a valid Date");
    };
    if rule
        .min
        .as_ref()
        .and_then(Limit::as_date_ms)
        .is_some_and(|min| ms < min)
    {
        return rule.fail("Date is earlier than minimum");
    }
    if rule
        .max
        .as_ref()
        .and_then(Limit::as_date_ms)
        .is_some_and(|max| ms > max)
    {
        return rule.fail("Date is later than maximum");
    }
    RuleOutcome::ok()
}

fn check_enum(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    if rule.enum_values.is_empty() || rule.enum_values.iter().any(|v| values_equal(v, value)) {
        RuleOutcome::ok()
    } else {
        rule.fail("Value is not in enum")
    }
}

fn check_boolean(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    if value.is_boolean() {
        RuleOutcome::ok()
    } else {
        rule.fail("Must be a boolean")
    }
}

static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
static HEX_RE: OnceLock<Option<Regex>> = OnceLock::new();
static URL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn matches_cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

fn check_email(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let text = coerce_to_string(value);
    if matches_cached(&EMAIL_RE, r"^[^\s@]+@[^\s@]+\.[^\s@]+$", &text) {
        RuleOutcome::ok()
    } else {
        rule.fail("Must be a valid email")
    }
}

fn check_hex(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    let text = coerce_to_string(value);
    if matches_cached(
        &HEX_RE,
        r"^#?(?:[A-Fa-f0-9]{3,4}|[A-Fa-f0-9]{6}|[A-Fa-f0-9]{8})$",
        &text,
    ) {
        RuleOutcome::ok()
    } else {
        rule.fail("Must be a valid hex color")
    }
}

fn check_regexp(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    match value {
        Value::String(s) if Regex::new(s).is_ok() => RuleOutcome::ok(),
        _ => rule.fail("Must be a valid regular expression"),
    }
}

const HOSTED_SCHEMES: [&str; 5] = ["http", "https", "ws", "wss", "ftp"];

fn check_url(rule: &Rule, value: &Value, _: &Value) -> RuleOutcome {
    if is_url(&coerce_to_string(value)) {
        RuleOutcome::ok()
    } else {
        rule.fail("Must be a valid URL")
    }
}

/// Absolute URL: a scheme, and for web schemes a non-empty host.
pub fn is_url(text: &str) -> bool {
    let text = text.trim();
    if !matches_cached(&URL_RE, r"^[A-Za-z][A-Za-z0-9+.\-]*:\S*$", text) {
        return false;
    }
    let Some((scheme, rest)) = text.split_once(':') else {
        return false;
    };
    if HOSTED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        let Some(authority) = rest.strip_prefix("//") else {
            return false;
        };
        let host = authority
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        let host = host.rsplit('@').next().unwrap_or_default();
        return !host.is_empty() && !host.starts_with(':');
    }
    true
}

impl Limit {
    /// Numeric reading of the bound; text bounds are coerced.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Limit::Number(n) => *n,
            Limit::Text(s) => parse_number_text(s),
        };
        (!n.is_nan()).then_some(n)
    }

    /// Millisecond timestamp reading of the bound.
    pub fn as_date_ms(&self) -> Option<f64> {
        match self {
            Limit::Number(n) => n.is_finite().then_some(*n),
            Limit::Text(s) => parse_date_ms(s),
        }
    }
}

/// Parse a date or date-time string to a UTC millisecond timestamp.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD`, and date-times without an
/// offset (read as UTC).
pub fn parse_date_ms(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis() as f64);
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis() as f64);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp_millis() as f64);
    }
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64)
}

/// Loose numeric reading of a value: null and the empty string are 0,
/// booleans are 0/1, numeric text is parsed, anything else is NaN.
pub fn coerce_to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_number_text(s),
        Value::Array(_) => parse_number_text(&coerce_to_string(value)),
        Value::Object(_) => f64::NAN,
    }
}

fn parse_number_text(text: &str) -> f64 {
    let t = text.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64);
        }
    }
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

/// Text reading of a value, as used by pattern and format checks.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

/// Render a number without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sync_check(rule: &Rule, value: Value) -> RuleOutcome {
        futures::executor::block_on(RuleChecker::default().check(&value, rule, &json!({})))
            .expect("no custom validator")
    }

    fn err(text: &str) -> RuleOutcome {
        RuleOutcome::error(text)
    }

    #[test]
    fn test_required_and_whitespace() {
        let rule = Rule::required().with_whitespace();
        assert_eq!(sync_check(&rule, json!("")), err("This field is required"));
        assert_eq!(sync_check(&rule, json!([])), err("This field is required"));
        assert_eq!(sync_check(&rule, Value::Null), err("This field is required"));
        assert_eq!(sync_check(&rule, json!("   ")), err("Only whitespace is not allowed"));
        assert!(sync_check(&rule, json!(" x ")).is_ok());
    }

    #[test]
    fn test_empty_optional_value_skips_every_check() {
        let rule = Rule::of_type(RuleType::Email).with_min_length(3);
        assert!(sync_check(&rule, json!("")).is_ok());
        let strict = rule.with_skip_if_empty(false);
        assert_eq!(sync_check(&strict, json!("")), err("Must be a valid email"));
    }

    #[test]
    fn test_string_lengths_and_pattern() {
        let rule = Rule::new().with_min_length(2).with_max_length(4);
        assert_eq!(sync_check(&rule, json!("a")), err("Min length is 2"));
        assert_eq!(sync_check(&rule, json!("abcde")), err("Max length is 4"));
        assert!(sync_check(&rule, json!("abc")).is_ok());

        let rule = Rule::new().with_len(3);
        assert_eq!(sync_check(&rule, json!("ab")), err("Length must be 3"));
        assert_eq!(sync_check(&rule, json!(123)), err("Length must be 3"));

        let rule = Rule::new().with_pattern(Regex::new(r"^\d+$").unwrap());
        assert_eq!(sync_check(&rule, json!("12a")), err("Pattern not match"));
        assert!(sync_check(&rule, json!(42)).is_ok());
    }

    #[test]
    fn test_number_coercion_and_range() {
        let rule = Rule::of_type(RuleType::Number).with_min(1).with_max(10);
        assert_eq!(sync_check(&rule, json!("abc")), err("Must be a number"));
        assert_eq!(sync_check(&rule, json!("0")), err("Min is 1"));
        assert_eq!(sync_check(&rule, json!(11)), err("Max is 10"));
        assert!(sync_check(&rule, json!(" 5 ")).is_ok());
        assert!(sync_check(&rule, json!(true)).is_ok());

        let exact = Rule::of_type(RuleType::Number).with_len(3);
        assert_eq!(sync_check(&exact, json!(4)), err("Must equal 3"));
    }

    #[test]
    fn test_integer_and_float() {
        let int = Rule::of_type(RuleType::Integer).with_max(5);
        assert_eq!(sync_check(&int, json!(1.5)), err("Must be an integer"));
        assert_eq!(sync_check(&int, json!(6)), err("Max is 5"));
        assert!(sync_check(&int, json!("4")).is_ok());

        let float = Rule::of_type(RuleType::Float);
        assert_eq!(sync_check(&float, json!(2)), err("Must be a float"));
        assert!(sync_check(&float, json!(2.25)).is_ok());
    }

    #[test]
    fn test_date_bounds() {
        let rule = Rule::of_type(RuleType::Date)
            .with_min("2024-01-01")
            .with_max("2024-12-31T23:59:59Z");
        assert_eq!(sync_check(&rule, json!("not a date")), err("Must be a valid Date"));
        assert_eq!(sync_check(&rule, json!("2023-12-31")), err("Date is earlier than minimum"));
        assert_eq!(sync_check(&rule, json!("2025-01-01")), err("Date is later than maximum"));
        assert!(sync_check(&rule, json!("2024-06-01 12:00:00")).is_ok());
        assert!(sync_check(&rule, json!(1_717_243_200_000_i64)).is_ok());
    }

    #[test]
    fn test_enum_uses_structural_equality() {
        let rule = Rule::of_type(RuleType::Enum).with_enum([json!(1), json!({"a": [1]})]);
        assert!(sync_check(&rule, json!(1.0)).is_ok());
        assert!(sync_check(&rule, json!({"a": [1]})).is_ok());
        assert_eq!(sync_check(&rule, json!(2)), err("Value is not in enum"));
        assert!(sync_check(&Rule::of_type(RuleType::Enum), json!("x")).is_ok());
    }

    #[test]
    fn test_format_checks() {
        let check = |t, v| sync_check(&Rule::of_type(t), v);
        assert!(check(RuleType::Boolean, json!(false)).is_ok());
        assert_eq!(check(RuleType::Boolean, json!("true")), err("Must be a boolean"));
        assert!(check(RuleType::Email, json!("a@b.co")).is_ok());
        assert_eq!(check(RuleType::Email, json!("a@b")), err("Must be a valid email"));
        assert!(check(RuleType::Hex, json!("#a1F")).is_ok());
        assert!(check(RuleType::Hex, json!("a1b2c3d4")).is_ok());
        assert_eq!(check(RuleType::Hex, json!("#12345")), err("Must be a valid hex color"));
        assert!(check(RuleType::Regexp, json!("^a+$")).is_ok());
        assert_eq!(
            check(RuleType::Regexp, json!("(")),
            err("Must be a valid regular expression")
        );
        assert!(check(RuleType::Url, json!("https://example.com/x?y")).is_ok());
        assert!(check(RuleType::Url, json!("mailto:someone@example.com")).is_ok());
        assert_eq!(check(RuleType::Url, json!("http://")), err("Must be a valid URL"));
        assert_eq!(check(RuleType::Url, json!("example.com")), err("Must be a valid URL"));
    }

    #[test]
    fn test_message_override_and_warning_only() {
        let rule = Rule::of_type(RuleType::Number)
            .with_min(10)
            .with_message("too small")
            .warning_only();
        assert_eq!(sync_check(&rule, json!(1)), RuleOutcome::warning("too small"));
    }

    #[test]
    fn test_transform_runs_first() {
        let rule = Rule::required().with_transform(|v| json!(v.as_str().unwrap_or("").trim()));
        assert_eq!(sync_check(&rule, json!("   ")), err("This field is required"));
    }

    #[test]
    fn test_number_text_parsing() {
        assert_eq!(parse_number_text(""), 0.0);
        assert_eq!(parse_number_text("0x10"), 16.0);
        assert_eq!(parse_number_text("1e3"), 1000.0);
        assert!(parse_number_text("inf").is_nan());
        assert!(parse_number_text("nan").is_nan());
        assert_eq!(parse_number_text("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(coerce_to_number(&json!([])), 0.0);
        assert_eq!(coerce_to_number(&json!(["7"])), 7.0);
        assert!(coerce_to_number(&json!([1, 2])).is_nan());
    }
}
