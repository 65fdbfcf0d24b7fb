//! Running a field's rule list under a [`RunMode`].

use super::check::RuleChecker;
use super::rule::{Rule, RunMode};
use crate::error::ValidatorError;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

/// Errors and warnings collected from a rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check `rules` against `value`.
///
/// - `Serial` stops at the first error.
/// - `ParallelFirst` settles as soon as any rule errors; the rest are dropped.
/// - `ParallelAll` collects everything, in rule order.
///
/// A validator failure fails the whole run.
pub async fn run_rules(
    checker: &RuleChecker,
    value: &Value,
    rules: &[Rule],
    mode: RunMode,
    values: &Value,
) -> Result<RuleReport, ValidatorError> {
    let mut report = RuleReport::default();
    if rules.is_empty() {
        return Ok(report);
    }

    match mode {
        RunMode::Serial => {
            for rule in rules {
                let outcome = checker.check(value, rule, values).await?;
                report.warnings.extend(outcome.warning);
                if let Some(error) = outcome.error {
                    if !rule.warning_only {
                        report.errors.push(error);
                        break;
                    }
                }
            }
        }
        RunMode::ParallelFirst => {
            let mut pending: FuturesUnordered<_> = rules
                .iter()
                .map(|rule| async move {
                    (checker.check(value, rule, values).await, rule.warning_only)
                })
                .collect();
            while let Some((outcome, warning_only)) = pending.next().await {
                let outcome = outcome?;
                report.warnings.extend(outcome.warning);
                if let Some(error) = outcome.error {
                    if !warning_only {
                        report.errors.push(error);
                        break;
                    }
                }
            }
        }
        RunMode::ParallelAll => {
            let outcomes =
                futures::future::join_all(rules.iter().map(|rule| checker.check(value, rule, values)))
                    .await;
            for (rule, outcome) in rules.iter().zip(outcomes) {
                let outcome = outcome?;
                report.warnings.extend(outcome.warning);
                if let Some(error) = outcome.error {
                    if !rule.warning_only {
                        report.errors.push(error);
                    }
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{validator_fn, RuleType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rules() -> Vec<Rule> {
        vec![
            Rule::of_type(RuleType::Number).with_min(10).warning_only(),
            Rule::of_type(RuleType::Number).with_max(3),
            Rule::of_type(RuleType::Number).with_len(2),
        ]
    }

    #[tokio::test]
    async fn test_serial_stops_at_first_error() {
        let report = run_rules(&RuleChecker::default(), &json!(5), &rules(), RunMode::Serial, &json!({}))
            .await
            .unwrap();
        assert_eq!(report.warnings, vec!["Min is 10"]);
        assert_eq!(report.errors, vec!["Max is 3"]);
    }

    #[tokio::test]
    async fn test_parallel_all_collects_in_rule_order() {
        let report =
            run_rules(&RuleChecker::default(), &json!(5), &rules(), RunMode::ParallelAll, &json!({}))
                .await
                .unwrap();
        assert_eq!(report.warnings, vec!["Min is 10"]);
        assert_eq!(report.errors, vec!["Max is 3", "Must equal 2"]);
    }

    #[tokio::test]
    async fn test_parallel_first_reports_one_error() {
        let report =
            run_rules(&RuleChecker::default(), &json!(5), &rules(), RunMode::ParallelFirst, &json!({}))
                .await
                .unwrap();
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_validator_error_fails_the_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let rules = vec![
            Rule::new().with_validator(validator_fn(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                None
            })),
            Rule::new().with_validator(crate::validation::async_validator(|_, _| async {
                Err(ValidatorError::failed("backend unavailable"))
            })),
        ];
        let err = run_rules(&RuleChecker::default(), &json!("x"), &rules, RunMode::ParallelAll, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_validator_is_contained() {
        let rules = vec![Rule::new().with_validator(validator_fn(|_, _| panic!("boom")))];
        let err = run_rules(&RuleChecker::default(), &json!("x"), &rules, RunMode::Serial, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, ValidatorError::Panicked("boom".into()));
    }
}
