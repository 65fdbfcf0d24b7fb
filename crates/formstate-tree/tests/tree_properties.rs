//! Property tests for path-addressed tree writes.

use formstate_tree::{get, set, set_in, unset, values_equal, Path, Seg};
use proptest::prelude::*;
use serde_json::{json, Value};

fn seg_strategy() -> impl Strategy<Value = Seg> {
    prop_oneof![
        "[a-z]{1,4}".prop_map(Seg::key),
        (0usize..4).prop_map(Seg::Index),
    ]
}

fn path_strategy() -> impl Strategy<Value = Path> {
    prop::collection::vec(seg_strategy(), 1..5).prop_map(Path::from_segments)
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z ]{0,8}".prop_map(Value::String),
    ]
}

proptest! {
    #[test]
    fn set_then_get_returns_value(path in path_strategy(), value in scalar_strategy()) {
        let tree = set(&json!({}), &path, value.clone());
        prop_assert_eq!(get(&tree, &path), Some(&value));
    }

    #[test]
    fn set_leaves_input_untouched(path in path_strategy(), value in scalar_strategy()) {
        let base = json!({"keep": {"me": 1}});
        let _ = set(&base, &path, value);
        prop_assert_eq!(base, json!({"keep": {"me": 1}}));
    }

    #[test]
    fn canonical_text_parses_back(path in path_strategy()) {
        let text = path.to_string();
        prop_assert_eq!(Path::from(text.as_str()), path);
    }

    #[test]
    fn sibling_writes_do_not_interfere(
        a in "[a-z]{1,3}",
        b in "[a-z]{1,3}",
        va in scalar_strategy(),
        vb in scalar_strategy(),
    ) {
        prop_assume!(a != b);
        let mut tree = json!({});
        set_in(&mut tree, &Path::root().key(a.as_str()), va.clone());
        set_in(&mut tree, &Path::root().key(b.as_str()), vb);
        prop_assert!(values_equal(get(&tree, &Path::root().key(a.as_str())).unwrap(), &va));
    }
}

#[test]
fn unset_after_set_restores_object_shape() {
    let base = json!({"a": 1});
    let with_b = set(&base, &Path::from("b.c"), json!(2));
    let without_c = unset(&with_b, &Path::from("b.c"));
    assert_eq!(without_c, json!({"a": 1, "b": {}}));
}

#[test]
fn bracket_and_dot_forms_address_same_slot() {
    let tree = set(&json!({}), &Path::from("rows[2]['qty']"), json!(7));
    assert_eq!(get(&tree, &Path::from("rows.2.qty")), Some(&json!(7)));
}
