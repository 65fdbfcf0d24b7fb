//! Actions carried through the middleware pipeline.

use crate::array::ArrayOp;
use crate::validation::{ValidateOptions, ValidationStatus};
use formstate_tree::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to change or validate form state.
///
/// Every facade mutation and validation call is expressed as an `Action` and
/// dispatched through the registered middlewares before the engine applies
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetFieldValue {
        path: Path,
        value: Value,
        #[serde(default)]
        validate: bool,
    },
    /// Merge a partial value tree into the store.
    SetFieldsValue {
        values: Value,
        #[serde(default)]
        validate: bool,
    },
    /// Reset the listed paths to their initial values. Empty resets all.
    Reset {
        #[serde(default)]
        paths: Vec<Path>,
    },
    ValidateField {
        path: Path,
        #[serde(default)]
        opts: ValidateOptions,
    },
    /// Validate the listed fields, or every registered field when `None`.
    ValidateFields {
        #[serde(default)]
        paths: Option<Vec<Path>>,
        #[serde(default)]
        opts: ValidateOptions,
    },
    ArrayOp {
        path: Path,
        op: ArrayOp,
    },
    /// Replace errors from an outside validator. An empty list clears every
    /// error; an entry with no messages clears that path.
    SetExternalErrors {
        entries: Vec<(Path, Vec<String>)>,
    },
}

impl Action {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetFieldValue { .. } => "set_field_value",
            Action::SetFieldsValue { .. } => "set_fields_value",
            Action::Reset { .. } => "reset",
            Action::ValidateField { .. } => "validate_field",
            Action::ValidateFields { .. } => "validate_fields",
            Action::ArrayOp { .. } => "array_op",
            Action::SetExternalErrors { .. } => "set_external_errors",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Action::ValidateField { .. } | Action::ValidateFields { .. }
        )
    }
}

/// What a dispatched action produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A mutation was applied (or ignored).
    Applied,
    /// Result of validating one field.
    Field(ValidationStatus),
    /// Result of validating several fields: true when all are valid.
    Fields(bool),
}

impl DispatchOutcome {
    pub fn is_valid(self) -> bool {
        match self {
            DispatchOutcome::Applied => true,
            DispatchOutcome::Field(status) => status.is_valid(),
            DispatchOutcome::Fields(ok) => ok,
        }
    }
}
