//! Reactive form-state engine.
//!
//! `formstate` keeps a form's values in a path-addressed JSON tree and tracks
//! per-field meta-state around it: touched, dirty, validating, validated,
//! errors and warnings. Changes are announced to listeners in coalesced
//! batches.
//!
//! # Core Concepts
//!
//! - **Form**: clonable handle to one engine instance
//! - **Action / Middleware**: every facade write and validation is an action
//!   that passes through an ordered middleware pipeline
//! - **Rule**: declarative field validation with debounce and staleness
//!   handling for overlapping runs
//! - **ChangeMask**: bit set describing what changed at a path
//! - **Transactions**: hold notifications back until the outermost commit
//! - **Computed fields and effects**: values and side effects derived from
//!   other paths
//!
//! # Quick Start
//!
//! ```
//! use formstate::{ChangeMask, FieldEntity, FlushPolicy, Form, FormConfig, SubscribeOptions};
//! use formstate_tree::Path;
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let form = Form::new(
//!     FormConfig::default()
//!         .with_initial_values(json!({"items": ["a", "b"]}))
//!         .with_flush_policy(FlushPolicy::Manual),
//! );
//! let _items = form.register_field(FieldEntity::new("items"));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _sub = form.subscribe_field(
//!     &[Path::from("items")],
//!     SubscribeOptions::mask(ChangeMask::VALUE),
//!     move |event| sink.lock().unwrap().push(event.value.clone()),
//! );
//!
//! form.append("items", json!("c")).await;
//! form.flush();
//!
//! assert_eq!(*seen.lock().unwrap(), vec![Some(json!(["a", "b", "c"]))]);
//! assert!(form.is_field_dirty("items"));
//! # }
//! ```

pub mod action;
pub mod array;
pub mod config;
pub mod error;
pub mod form;
pub mod graph;
pub mod listener;
pub mod mask;
pub mod middleware;
mod scheduler;
pub mod submit;
mod transaction;
pub mod validation;

pub use action::{Action, DispatchOutcome};
pub use array::{ArrayOp, ArrayRow};
pub use config::{FlushPolicy, FormConfig, DEFAULT_DEBOUNCE_MS};
pub use error::{FormError, FormResult, ValidatorError};
pub use form::{
    Callbacks, FieldEntity, FieldMeta, FieldRegistration, Form, FormHooks, FormStatus,
    Subscription, TransactionGuard,
};
pub use graph::{ComputeFn, EffectFn, NodeId, ReactiveContext};
pub use listener::{FieldEvent, Listener, SubscribeOptions};
pub use mask::ChangeMask;
pub use middleware::{Issue, Middleware, MiddlewareContext, Next, ResolverMiddleware, SchemaResolver, UndoRedo};
pub use submit::{FieldFailure, PreSubmit, SubmitFailure};
pub use validation::{
    async_validator, validator_fn, Limit, Rule, RuleChecker, RuleOutcome, RuleType, RunMode,
    ValidateOptions, ValidationStatus, Validator,
};

pub use formstate_tree::{Path, Value};
