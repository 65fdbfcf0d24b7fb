//! Path-addressed reads and writes on a JSON value tree.
//!
//! The pure functions (`set`, `unset`) leave their input untouched and return
//! a new tree. The `_in` variants mutate in place and report whether anything
//! was written. Writes through an unsafe key are refused and leave the tree
//! unchanged.
//!
//! `serde_json::Value` owns its children, so the pure forms copy the whole
//! input. Callers that hold the tree behind an `Arc` get sharing at the root
//! only: `Arc::make_mut` followed by an `_in` write copies nothing while the
//! tree is uniquely owned, and copies it once when a snapshot is still alive.

use crate::{Path, Seg, UNSAFE_KEYS};
use serde_json::{Map, Value};

/// Read the value at `path`.
///
/// The empty path returns `None`; a form has no value "at the root", only at
/// field paths. An index segment applied to an object reads the stringified
/// key.
///
/// ```
/// use formstate_tree::{get, path};
/// use serde_json::json;
///
/// let doc = json!({"items": [{"name": "a"}]});
/// assert_eq!(get(&doc, &path!("items", 0, "name")), Some(&json!("a")));
/// assert_eq!(get(&doc, &path!("items", 3)), None);
/// ```
pub fn get<'a>(tree: &'a Value, path: &Path) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = tree;
    for seg in path {
        current = child(current, seg)?;
    }
    Some(current)
}

/// Read the value at `path`, or `Null` when absent.
pub fn get_or_null(tree: &Value, path: &Path) -> Value {
    get(tree, path).cloned().unwrap_or(Value::Null)
}

fn child<'a>(node: &'a Value, seg: &Seg) -> Option<&'a Value> {
    match (node, seg) {
        (Value::Array(arr), Seg::Index(i)) => arr.get(*i),
        (Value::Object(map), seg) => map.get(&seg.to_key_string()),
        _ => None,
    }
}

/// Return a copy of `tree` with `value` written at `path` (pure).
///
/// Missing containers are created; the container kind at each level follows
/// the segment that indexes into it (indices create arrays, keys create
/// objects). Arrays are padded with `null` when writing past their end.
///
/// ```
/// use formstate_tree::{set, path};
/// use serde_json::json;
///
/// let doc = json!({});
/// let next = set(&doc, &path!("rows", 1, "qty"), json!(2));
/// assert_eq!(next, json!({"rows": [null, {"qty": 2}]}));
/// assert_eq!(doc, json!({}));
/// ```
pub fn set(tree: &Value, path: &Path, value: Value) -> Value {
    let mut result = tree.clone();
    set_in(&mut result, path, value);
    result
}

/// Write `value` at `path` in place. Returns `false` if the write was refused.
///
/// Writing at the root path replaces the whole tree.
pub fn set_in(tree: &mut Value, path: &Path, value: Value) -> bool {
    if path.has_unsafe_segment() {
        tracing::debug!(path = %path, "refusing write through unsafe key");
        return false;
    }
    if !is_writable(tree, path.segments()) {
        tracing::debug!(path = %path, "refusing keyed write into array");
        return false;
    }
    write_segments(tree, path.segments(), value);
    true
}

// Keyed segments cannot address into an existing array. Everything else is
// either traversable or gets replaced by a fresh container.
fn is_writable(tree: &Value, segs: &[Seg]) -> bool {
    let mut node = Some(tree);
    for seg in segs {
        let Some(current) = node else {
            return true;
        };
        if current.is_array() && seg.is_key() {
            return false;
        }
        node = child(current, seg);
    }
    true
}

fn write_segments(node: &mut Value, segs: &[Seg], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_array() && !node.is_object() {
        *node = empty_container_for(head);
    }

    let slot = match node {
        Value::Array(arr) => {
            let i = head.as_index().unwrap_or(0);
            if i >= arr.len() {
                arr.resize(i + 1, Value::Null);
            }
            &mut arr[i]
        }
        Value::Object(map) => map.entry(head.to_key_string()).or_insert(Value::Null),
        _ => return,
    };

    write_segments(slot, rest, value);
}

fn empty_container_for(seg: &Seg) -> Value {
    match seg {
        Seg::Index(_) => Value::Array(Vec::new()),
        Seg::Key(_) => Value::Object(Map::new()),
    }
}

/// Return a copy of `tree` with the value at `path` removed (pure).
///
/// Removing from an array shifts the following elements down.
pub fn unset(tree: &Value, path: &Path) -> Value {
    let mut result = tree.clone();
    unset_in(&mut result, path);
    result
}

/// Remove the value at `path` in place. Returns `true` if something was
/// removed. The root path cannot be removed.
pub fn unset_in(tree: &mut Value, path: &Path) -> bool {
    if path.has_unsafe_segment() {
        tracing::debug!(path = %path, "refusing removal through unsafe key");
        return false;
    }
    let Some((last, parents)) = path.segments().split_last() else {
        return false;
    };

    let mut node = tree;
    for seg in parents {
        let next = match (node, seg) {
            (Value::Array(arr), Seg::Index(i)) => arr.get_mut(*i),
            (Value::Object(map), seg) => map.get_mut(&seg.to_key_string()),
            _ => None,
        };
        match next {
            Some(n) => node = n,
            None => return false,
        }
    }

    match (node, last) {
        (Value::Array(arr), Seg::Index(i)) if *i < arr.len() => {
            arr.remove(*i);
            true
        }
        (Value::Object(map), seg) => {
            let key = seg.to_key_string();
            if !map.contains_key(&key) {
                return false;
            }
            // Rebuild so the remaining keys keep their insertion order.
            let rebuilt: Map<String, Value> = std::mem::take(map)
                .into_iter()
                .filter(|(k, _)| *k != key)
                .collect();
            *map = rebuilt;
            true
        }
        _ => false,
    }
}

/// Structural equality with numeric comparison by value.
///
/// `1` and `1.0` compare equal; object key order is ignored.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y
                || match (x.as_f64(), y.as_f64()) {
                    (Some(fx), Some(fy)) => fx == fy,
                    _ => false,
                }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, xv)| ym.get(k).is_some_and(|yv| values_equal(xv, yv)))
        }
        _ => a == b,
    }
}

/// Deep-merge `overlay` onto `base`.
///
/// Nested objects merge key by key; every other overlay value (arrays
/// included) replaces the base value outright.
///
/// ```
/// use formstate_tree::deep_merge;
/// use serde_json::json;
///
/// let merged = deep_merge(
///     &json!({"a": {"x": 1, "y": 2}, "tags": [1, 2]}),
///     &json!({"a": {"y": 3}, "tags": [9]}),
/// );
/// assert_eq!(merged, json!({"a": {"x": 1, "y": 3}, "tags": [9]}));
/// ```
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    let mut out = base.clone();
    deep_merge_in(&mut out, overlay);
    out
}

/// Merge `overlay` into `base` in place, with the same rules as
/// [`deep_merge`]. Untouched entries of `base` are not copied.
pub fn deep_merge_in(base: &mut Value, overlay: &Value) {
    if let (Value::Object(bm), Value::Object(om)) = (&mut *base, overlay) {
        for (k, ov) in om {
            if UNSAFE_KEYS.contains(&k.as_str()) {
                tracing::debug!(key = %k, "skipping unsafe key during merge");
                continue;
            }
            match bm.get_mut(k) {
                Some(bv) => deep_merge_in(bv, ov),
                None if ov.is_object() => {
                    let mut fresh = Value::Object(Map::new());
                    deep_merge_in(&mut fresh, ov);
                    bm.insert(k.clone(), fresh);
                }
                None => {
                    bm.insert(k.clone(), ov.clone());
                }
            }
        }
        return;
    }
    *base = overlay.clone();
}

/// Build a nested tree from `(path, value)` pairs.
///
/// ```
/// use formstate_tree::{construct, Path};
/// use serde_json::json;
///
/// let tree = construct([
///     (Path::from("user.name"), json!("ada")),
///     (Path::from("user.tags.0"), json!("x")),
/// ]);
/// assert_eq!(tree, json!({"user": {"name": "ada", "tags": ["x"]}}));
/// ```
pub fn construct<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (Path, Value)>,
{
    let mut tree = Value::Object(Map::new());
    for (path, value) in entries {
        if path.is_empty() {
            continue;
        }
        set_in(&mut tree, &path, value);
    }
    tree
}

/// Enumerate the leaf paths of `value`, each prefixed by `prefix`.
///
/// Scalars and empty containers are leaves.
pub fn collect_deep_keys(value: &Value, prefix: &Path) -> Vec<Path> {
    let mut out = Vec::new();
    collect_into(value, prefix.clone(), &mut out);
    out
}

fn collect_into(value: &Value, at: Path, out: &mut Vec<Path>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                collect_into(v, at.clone().key(k.as_str()), out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, v) in arr.iter().enumerate() {
                collect_into(v, at.clone().index(i), out);
            }
        }
        _ => {
            if !at.is_empty() {
                out.push(at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_get_nested() {
        let doc = json!({"a": {"b": [10, 20]}});
        assert_eq!(get(&doc, &path!("a", "b", 1)), Some(&json!(20)));
        assert_eq!(get(&doc, &path!("a", "c")), None);
        assert_eq!(get(&doc, &path!("a", "b", "x")), None);
        assert_eq!(get(&doc, &Path::root()), None);
    }

    #[test]
    fn test_get_index_on_object_reads_string_key() {
        let doc = json!({"m": {"0": "zero"}});
        assert_eq!(get(&doc, &path!("m", 0)), Some(&json!("zero")));
    }

    #[test]
    fn test_set_creates_containers_by_next_segment() {
        let doc = set(&json!({}), &path!("a", 0, "b"), json!(1));
        assert_eq!(doc, json!({"a": [{"b": 1}]}));
    }

    #[test]
    fn test_set_replaces_scalar_with_container() {
        let doc = set(&json!({"a": 5}), &path!("a", "b"), json!(true));
        assert_eq!(doc, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_set_pads_arrays() {
        let doc = set(&json!({"a": [1]}), &path!("a", 3), json!(4));
        assert_eq!(doc, json!({"a": [1, null, null, 4]}));
    }

    #[test]
    fn test_set_is_pure() {
        let doc = json!({"a": 1});
        let next = set(&doc, &path!("a"), json!(2));
        assert_eq!(doc["a"], 1);
        assert_eq!(next["a"], 2);
    }

    #[test]
    fn test_set_root_replaces_tree() {
        let mut doc = json!({"a": 1});
        assert!(set_in(&mut doc, &Path::root(), json!({"b": 2})));
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn test_unsafe_keys_are_refused() {
        let doc = json!({"a": {}});
        for p in ["__proto__.polluted", "a.constructor", "a.prototype.x"] {
            let mut copy = doc.clone();
            assert!(!set_in(&mut copy, &Path::from(p), json!(1)), "{p}");
            assert_eq!(copy, doc);
            assert!(!unset_in(&mut copy, &Path::from(p)));
        }
    }

    #[test]
    fn test_keyed_write_into_array_is_refused() {
        let mut doc = json!({"list": [1, 2]});
        assert!(!set_in(&mut doc, &path!("list", "name"), json!("x")));
        assert_eq!(doc, json!({"list": [1, 2]}));
    }

    #[test]
    fn test_unset_shifts_arrays() {
        let doc = unset(&json!({"a": [1, 2, 3]}), &path!("a", 0));
        assert_eq!(doc, json!({"a": [2, 3]}));
    }

    #[test]
    fn test_unset_object_key_keeps_order() {
        let doc = unset(&json!({"x": 1, "y": 2, "z": 3}), &path!("x"));
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["y", "z"]);
    }

    #[test]
    fn test_unset_missing_is_noop() {
        let mut doc = json!({"a": [1]});
        assert!(!unset_in(&mut doc, &path!("a", 5)));
        assert!(!unset_in(&mut doc, &path!("b", "c")));
        assert!(!unset_in(&mut doc, &Path::root()));
        assert_eq!(doc, json!({"a": [1]}));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1.0})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn test_deep_merge_skips_unsafe_keys() {
        let merged = deep_merge(&json!({}), &json!({"a": {"__proto__": 1, "b": 2}, "constructor": 3}));
        assert_eq!(merged, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_deep_merge_scalar_base() {
        assert_eq!(deep_merge(&json!(1), &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(deep_merge(&json!({"a": 1}), &json!({})), json!({"a": 1}));
    }

    #[test]
    fn test_deep_merge_in_keeps_untouched_siblings() {
        let mut doc = json!({"user": {"name": "a", "age": 1}, "tags": [1]});
        deep_merge_in(&mut doc, &json!({"user": {"name": "b"}, "tags": [2, 3], "new": {"x": 1}}));
        assert_eq!(
            doc,
            json!({"user": {"name": "b", "age": 1}, "tags": [2, 3], "new": {"x": 1}})
        );
    }

    #[test]
    fn test_collect_deep_keys() {
        let keys = collect_deep_keys(&json!({"a": {"b": 1, "c": []}, "d": [true]}), &Path::root());
        assert_eq!(
            keys,
            vec![path!("a", "b"), path!("a", "c"), path!("d", 0)]
        );
    }

    #[test]
    fn test_collect_deep_keys_with_prefix() {
        let keys = collect_deep_keys(&json!({"x": 1}), &path!("root"));
        assert_eq!(keys, vec![path!("root", "x")]);
    }
}
