//! Adapter for whole-form schema validators.

use super::{Middleware, MiddlewareContext, Next};
use crate::action::{Action, DispatchOutcome};
use crate::validation::ValidationStatus;
use async_trait::async_trait;
use formstate_tree::{Path, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key under which issues without a path are reported.
pub const ROOT_ISSUE_KEY: &str = "root";

/// One problem reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Offending field; `None` for form-level issues.
    pub path: Option<Path>,
    pub message: String,
}

impl Issue {
    pub fn at(path: impl Into<Path>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn form(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

/// Validates the whole value tree at once.
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    /// Check `values`. `paths` names the fields being validated, empty for
    /// the whole form; implementations may report issues anywhere.
    async fn resolve(&self, values: &Value, paths: &[Path]) -> Vec<Issue>;
}

/// Replaces field-rule validation with a [`SchemaResolver`].
///
/// Validation actions never reach the base handler. The resolver's issues
/// are grouped by path and applied with a `SetExternalErrors` action; the
/// requested fields without issues are cleared, and a clean whole-form run
/// clears every error.
pub struct ResolverMiddleware {
    resolver: Arc<dyn SchemaResolver>,
}

impl ResolverMiddleware {
    pub fn new(resolver: impl SchemaResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

fn issue_path(issue: &Issue) -> Path {
    issue
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| Path::from(ROOT_ISSUE_KEY))
}

/// Error entries for `targets` (cleared unless an issue names them) plus
/// every issue grouped by path, in first-seen order.
fn group_issues(targets: &[Path], issues: &[Issue]) -> Vec<(Path, Vec<String>)> {
    let mut order: Vec<Path> = targets.to_vec();
    let mut grouped: BTreeMap<Path, Vec<String>> = BTreeMap::new();
    for issue in issues {
        let path = issue_path(issue);
        if !order.contains(&path) {
            order.push(path.clone());
        }
        grouped.entry(path).or_default().push(issue.message.clone());
    }
    order
        .into_iter()
        .map(|p| {
            let messages = grouped.remove(&p).unwrap_or_default();
            (p, messages)
        })
        .collect()
}

#[async_trait]
impl Middleware for ResolverMiddleware {
    fn id(&self) -> &str {
        "schema_resolver"
    }

    async fn handle(&self, ctx: &MiddlewareContext, action: Action, next: Next<'_>) -> DispatchOutcome {
        let (targets, single) = match action {
            Action::ValidateField { path, .. } => (vec![path], true),
            Action::ValidateFields { paths, .. } => (paths.unwrap_or_default(), false),
            other => return next.run(other).await,
        };

        let values = ctx.get_state();
        let issues = self.resolver.resolve(&values, &targets).await;
        tracing::debug!(
            fields = targets.len(),
            issues = issues.len(),
            "schema resolver finished"
        );

        let relevant = |issue: &Issue| {
            targets.is_empty() || targets.iter().any(|t| issue_path(issue).is_under(t))
        };
        let valid = !issues.iter().any(relevant);

        let entries = if issues.is_empty() && targets.is_empty() {
            Vec::new()
        } else {
            group_issues(&targets, &issues)
        };
        ctx.dispatch(Action::SetExternalErrors { entries }).await;

        if single {
            DispatchOutcome::Field(if valid {
                ValidationStatus::Valid
            } else {
                ValidationStatus::Invalid
            })
        } else {
            DispatchOutcome::Fields(valid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_issues_keeps_targets_and_root() {
        let targets = vec![Path::from("name"), Path::from("age")];
        let issues = vec![
            Issue::at("age", "too young"),
            Issue::form("passwords differ"),
            Issue::at("age", "not a number"),
        ];
        let entries = group_issues(&targets, &issues);
        assert_eq!(
            entries,
            vec![
                (Path::from("name"), vec![]),
                (
                    Path::from("age"),
                    vec!["too young".to_owned(), "not a number".to_owned()]
                ),
                (Path::from("root"), vec!["passwords differ".to_owned()]),
            ]
        );
    }
}
