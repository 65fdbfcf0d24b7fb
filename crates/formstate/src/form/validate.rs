//! Field validation: debounce, run-token staleness and result bookkeeping.

use super::state::FormState;
use super::Form;
use crate::mask::ChangeMask;
use crate::validation::{run_rules, Rule, RuleReport, ValidateOptions, ValidationStatus};
use formstate_tree::{Path, Value};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Plan {
    Done(ValidationStatus),
    Run {
        rules: Vec<Rule>,
        debounce_ms: u64,
        cancel: Option<CancellationToken>,
    },
}

impl FormState {
    /// Leave the validating state without touching errors. Returns the mask
    /// bit to notify with.
    fn settle(&mut self, path: &Path) -> ChangeMask {
        if self.validating.remove(path) {
            self.validated.insert(path.clone());
            ChangeMask::VALIDATING | ChangeMask::VALIDATED
        } else {
            ChangeMask::empty()
        }
    }

    fn plan_validation(&mut self, path: &Path, trigger: &[String], default_debounce_ms: u64) -> Plan {
        let all = self.rules.get(path).cloned().unwrap_or_default();
        if all.is_empty() {
            let mut mask = self.settle(path);
            if self.errors.remove(path).is_some() {
                mask |= ChangeMask::ERRORS;
            }
            if self.warnings.remove(path).is_some() {
                mask |= ChangeMask::WARNINGS;
            }
            if !mask.is_empty() {
                self.enqueue(path, mask);
                self.fields_changed(std::slice::from_ref(path));
            }
            return Plan::Done(ValidationStatus::Valid);
        }

        let rules: Vec<Rule> = all.into_iter().filter(|r| r.applies_to(trigger)).collect();
        if rules.is_empty() {
            let mask = self.settle(path);
            if !mask.is_empty() {
                self.enqueue(path, mask);
            }
            return Plan::Done(if self.errors.contains_key(path) {
                ValidationStatus::Invalid
            } else {
                ValidationStatus::Valid
            });
        }

        let debounce_ms = rules
            .iter()
            .filter_map(|r| r.debounce_ms)
            .min()
            .unwrap_or(default_debounce_ms);
        let cancel = if debounce_ms > 0 {
            let token = CancellationToken::new();
            if let Some(previous) = self.debounces.insert(path.clone(), token.clone()) {
                previous.cancel();
            }
            Some(token)
        } else {
            if let Some(previous) = self.debounces.remove(path) {
                previous.cancel();
            }
            None
        };
        Plan::Run {
            rules,
            debounce_ms,
            cancel,
        }
    }

    /// Claim a new run token and snapshot what the rules read.
    fn start_validation(&mut self, path: &Path) -> (u64, Value, Arc<Value>) {
        let token = {
            let slot = self.tokens.entry(path.clone()).or_insert(0);
            *slot += 1;
            *slot
        };
        if self.validating.insert(path.clone()) {
            self.validated.remove(path);
            self.enqueue(path, ChangeMask::VALIDATING);
            self.fields_changed(std::slice::from_ref(path));
        }
        (
            token,
            self.value_at(path).unwrap_or(Value::Null),
            self.store.clone(),
        )
    }

    fn finish_validation(&mut self, path: &Path, token: u64, report: RuleReport) -> ValidationStatus {
        if self.tokens.get(path) != Some(&token) {
            tracing::trace!(path = %path, token, "discarding stale validation result");
            return ValidationStatus::Stale;
        }
        let RuleReport { errors, warnings } = report;
        let status = if errors.is_empty() {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        };

        let mut mask = self.settle(path);
        if replace_messages(&mut self.errors, path, errors) {
            mask |= ChangeMask::ERRORS;
        }
        if replace_messages(&mut self.warnings, path, warnings) {
            mask |= ChangeMask::WARNINGS;
        }
        if !mask.is_empty() {
            self.enqueue(path, mask);
            self.fields_changed(std::slice::from_ref(path));
        }
        status
    }

    fn validation_targets(&self, paths: Option<Vec<Path>>, dirty_only: bool) -> Vec<Path> {
        match paths {
            Some(paths) if !paths.is_empty() => {
                if dirty_only {
                    paths.into_iter().filter(|p| self.dirty.contains(p)).collect()
                } else {
                    paths
                }
            }
            _ if dirty_only => self.dirty.iter().cloned().collect(),
            _ => self.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

/// Store `next` as the messages for `path`; an empty list removes the entry.
fn replace_messages(
    map: &mut std::collections::BTreeMap<Path, Vec<String>>,
    path: &Path,
    next: Vec<String>,
) -> bool {
    let changed = map.get(path).map_or(!next.is_empty(), |prev| *prev != next);
    if changed {
        if next.is_empty() {
            map.remove(path);
        } else {
            map.insert(path.clone(), next);
        }
    }
    changed
}

impl Form {
    /// Validate one field, bypassing middleware.
    ///
    /// Returns [`ValidationStatus::Stale`] when a newer run for the same
    /// field started meanwhile, or the run was cancelled by a reset. A stale
    /// run writes nothing.
    pub(crate) async fn run_field_validation(
        &self,
        path: Path,
        opts: ValidateOptions,
    ) -> ValidationStatus {
        let default_debounce_ms = self.config().default_debounce_ms;
        let plan = self.with_state(|st| st.plan_validation(&path, &opts.trigger, default_debounce_ms));
        let (rules, debounce_ms, cancel) = match plan {
            Plan::Done(status) => return status,
            Plan::Run {
                rules,
                debounce_ms,
                cancel,
            } => (rules, debounce_ms, cancel),
        };

        if let Some(cancel) = cancel {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(path = %path, "debounced validation superseded");
                    return ValidationStatus::Stale;
                }
                _ = tokio::time::sleep(Duration::from_millis(debounce_ms)) => {}
            }
        }

        let mode = opts.mode.unwrap_or(self.config().validate_mode);
        let (token, value, values) = self.with_state(|st| st.start_validation(&path));
        let report = match run_rules(self.checker(), &value, &rules, mode, &values).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "validator failed");
                RuleReport {
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                }
            }
        };
        self.with_state(|st| st.finish_validation(&path, token, report))
    }

    /// Validate several fields concurrently, bypassing middleware.
    ///
    /// With no explicit list every registered field is validated, or every
    /// dirty path when `opts.dirty` is set. All targets enter the validating
    /// state in one notification batch, and the results settle in another.
    pub(crate) async fn run_fields_validation(
        &self,
        paths: Option<Vec<Path>>,
        opts: ValidateOptions,
    ) -> bool {
        let targets = self.with_state(|st| {
            let targets = st.validation_targets(paths, opts.dirty);
            st.begin();
            for path in &targets {
                if st.validating.insert(path.clone()) {
                    st.validated.remove(path);
                    st.enqueue(path, ChangeMask::VALIDATING);
                }
            }
            st.commit();
            targets
        });
        if targets.is_empty() {
            return true;
        }
        tracing::debug!(fields = targets.len(), "validating fields");

        let guard = self.transaction_guard();
        let results = join_all(
            targets
                .into_iter()
                .map(|path| self.run_field_validation(path, opts.clone())),
        )
        .await;
        guard.commit();
        results.into_iter().all(ValidationStatus::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> Path {
        Path::from(text)
    }

    #[test]
    fn test_replace_messages_tracks_changes() {
        let mut map = std::collections::BTreeMap::new();
        assert!(!replace_messages(&mut map, &path("a"), vec![]));
        assert!(replace_messages(&mut map, &path("a"), vec!["bad".into()]));
        assert!(!replace_messages(&mut map, &path("a"), vec!["bad".into()]));
        assert!(replace_messages(&mut map, &path("a"), vec![]));
        assert!(map.is_empty());
    }

    #[test]
    fn test_no_rules_clears_errors() {
        let mut st = FormState::new(serde_json::json!({}), false);
        st.errors.insert(path("a"), vec!["old".into()]);
        st.validating.insert(path("a"));
        let plan = st.plan_validation(&path("a"), &[], 0);
        assert!(matches!(plan, Plan::Done(ValidationStatus::Valid)));
        assert!(st.errors.is_empty());
        assert!(st.validated.contains(&path("a")));
        let pending = st.scheduler.drain().into_entries();
        assert_eq!(pending.len(), 1);
        assert!(pending[0]
            .1
            .contains(ChangeMask::ERRORS | ChangeMask::VALIDATING | ChangeMask::VALIDATED));
    }

    #[test]
    fn test_trigger_mismatch_reports_current_errors() {
        let mut st = FormState::new(serde_json::json!({}), false);
        st.rules
            .insert(path("a"), vec![Rule::required().with_trigger("blur")]);
        st.errors.insert(path("a"), vec!["old".into()]);
        let plan = st.plan_validation(&path("a"), &["change".to_owned()], 0);
        assert!(matches!(plan, Plan::Done(ValidationStatus::Invalid)));
        assert_eq!(st.errors[&path("a")], vec!["old".to_owned()]);
    }

    #[test]
    fn test_newer_run_makes_older_stale() {
        let mut st = FormState::new(serde_json::json!({"a": 1}), false);
        let (first, _, _) = st.start_validation(&path("a"));
        let (second, _, _) = st.start_validation(&path("a"));
        let bad = RuleReport {
            errors: vec!["bad".into()],
            warnings: vec![],
        };
        assert_eq!(
            st.finish_validation(&path("a"), first, bad),
            ValidationStatus::Stale
        );
        assert!(st.errors.is_empty());
        assert_eq!(
            st.finish_validation(&path("a"), second, RuleReport::default()),
            ValidationStatus::Valid
        );
        assert!(st.validated.contains(&path("a")));
        assert!(!st.validating.contains(&path("a")));
    }

    #[test]
    fn test_debounce_plan_cancels_previous() {
        let mut st = FormState::new(serde_json::json!({}), false);
        st.rules.insert(path("a"), vec![Rule::required().with_debounce_ms(50)]);
        let Plan::Run { cancel: Some(first), debounce_ms, .. } = st.plan_validation(&path("a"), &[], 0) else {
            panic!("expected a debounced run");
        };
        assert_eq!(debounce_ms, 50);
        let _second = st.plan_validation(&path("a"), &[], 0);
        assert!(first.is_cancelled());
    }

    #[test]
    fn test_dirty_targets() {
        let mut st = FormState::new(serde_json::json!({}), false);
        st.dirty.insert(path("b"));
        assert_eq!(st.validation_targets(None, true), vec![path("b")]);
        assert_eq!(
            st.validation_targets(Some(vec![path("a"), path("b")]), true),
            vec![path("b")]
        );
        assert_eq!(
            st.validation_targets(Some(vec![path("a")]), false),
            vec![path("a")]
        );
    }
}
