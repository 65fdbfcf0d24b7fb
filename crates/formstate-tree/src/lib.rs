//! Path-addressed JSON value tree for form state.
//!
//! `formstate-tree` is the storage layer underneath the `formstate` engine.
//! It knows nothing about fields, validation or listeners; it only answers
//! "what is at this path" and "what does the tree look like after writing
//! here".
//!
//! # Core Concepts
//!
//! - **Path**: a sequence of key/index segments with one canonical text form
//! - **get / set / unset**: pure reads and writes, plus in-place `_in` variants
//! - **values_equal**: structural comparison used for change detection
//! - **deep_merge / construct / collect_deep_keys**: bulk tree helpers
//!
//! # Quick Start
//!
//! ```
//! use formstate_tree::{get, set, path};
//! use serde_json::json;
//!
//! let values = json!({"user": {"name": "ada"}});
//! let next = set(&values, &path!("user", "emails", 0), json!("a@b.c"));
//!
//! assert_eq!(get(&next, &path!("user", "emails", 0)), Some(&json!("a@b.c")));
//! assert_eq!(get(&values, &path!("user", "emails")), None);
//! ```

mod error;
mod path;
mod tree;

pub use error::{PathError, PathResult};
pub use path::{Path, Seg, UNSAFE_KEYS};
pub use tree::{
    collect_deep_keys, construct, deep_merge, deep_merge_in, get, get_or_null, set, set_in, unset,
    unset_in, values_equal,
};

pub use serde_json::{Map, Value};
