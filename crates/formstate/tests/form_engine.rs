//! Integration tests for values, meta-state, notifications and arrays.

use formstate::{
    Callbacks, ChangeMask, FieldEntity, FlushPolicy, Form, FormConfig, Path, SubscribeOptions,
    Subscription,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<(String, ChangeMask)>>>;

fn form_with(initial: Value, policy: FlushPolicy) -> Form {
    Form::new(
        FormConfig::default()
            .with_initial_values(initial)
            .with_default_debounce_ms(0)
            .with_flush_policy(policy),
    )
}

fn manual_form(initial: Value) -> Form {
    form_with(initial, FlushPolicy::Manual)
}

fn record(form: &Form, paths: &[&str], options: SubscribeOptions) -> (Events, Subscription) {
    let events: Events = Arc::default();
    let sink = events.clone();
    let paths: Vec<Path> = paths.iter().map(|p| Path::from(*p)).collect();
    let sub = form.subscribe_field(&paths, options, move |event| {
        sink.lock()
            .unwrap()
            .push((event.path.to_string(), event.mask));
    });
    (events, sub)
}

fn keys(form: &Form, path: &str) -> Vec<u64> {
    form.array_fields(path).into_iter().map(|row| row.key).collect()
}

// ============================================================================
// Values and meta-state
// ============================================================================

#[tokio::test]
async fn test_set_field_value_tracks_touched_and_dirty() {
    let form = manual_form(json!({"a": 1}));
    form.set_field_value("a", json!(2)).await;

    assert_eq!(form.get_field_value("a"), Some(json!(2)));
    assert!(form.is_field_touched("a"));
    assert!(form.is_field_dirty("a"));

    form.set_field_value("a", json!(1)).await;
    assert!(form.is_field_touched("a"));
    assert!(!form.is_field_dirty("a"));
}

#[tokio::test]
async fn test_equal_value_is_silent() {
    let form = manual_form(json!({"a": {"b": 1}}));
    let (events, _sub) = record(&form, &["a.b"], SubscribeOptions::default());

    form.set_field_value("a.b", json!(1.0)).await;
    form.flush();

    assert!(events.lock().unwrap().is_empty());
    assert!(!form.is_field_touched("a.b"));
    assert!(!form.is_field_dirty("a.b"));
}

#[tokio::test]
async fn test_dirty_matches_initial_comparison() {
    let form = manual_form(json!({"user": {"tags": ["x"]}}));
    let steps = [json!(["x", "y"]), json!(["x"]), json!([]), json!(["x"])];
    for value in steps {
        form.set_field_value("user.tags", value.clone()).await;
        let expected = value != json!(["x"]);
        assert_eq!(form.is_field_dirty("user.tags"), expected, "after {value}");
    }
}

#[tokio::test]
async fn test_set_fields_value_merges_and_notifies_every_key() {
    let form = manual_form(json!({"user": {"name": "ada", "age": 36}}));
    let (events, _sub) = record(&form, &["user", "user.age"], SubscribeOptions::default());

    form.set_fields_value(json!({"user": {"age": 37}})).await;
    form.flush();

    assert_eq!(*form.values(), json!({"user": {"name": "ada", "age": 37}}));
    let seen: Vec<String> = events.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(seen, vec!["user", "user.age"]);
}

#[tokio::test]
async fn test_set_fields_value_restoring_container_clears_dirty() {
    let form = manual_form(json!({"user": {"name": "a", "age": 1}}));

    form.set_fields_value(json!({"user": {"name": "b"}})).await;
    assert!(form.is_field_dirty("user"));
    assert!(form.is_field_dirty("user.name"));

    form.set_fields_value(json!({"user": {"name": "a"}})).await;
    assert_eq!(*form.values(), json!({"user": {"name": "a", "age": 1}}));
    assert!(!form.is_field_dirty("user"));
    assert!(!form.is_field_dirty("user.name"));
    assert!(form.is_field_touched("user"));
    assert!(!form.form_status().is_dirty);
}

#[tokio::test]
async fn test_nested_write_restoring_parent_clears_its_dirty() {
    let form = manual_form(json!({"user": {"name": "a"}}));
    let (events, _sub) = record(&form, &["user"], SubscribeOptions::mask(ChangeMask::DIRTY));

    form.set_field_value("user", json!({"name": "b"})).await;
    assert!(form.is_field_dirty("user"));

    form.set_field_value("user.name", json!("a")).await;
    assert!(!form.is_field_dirty("user"));
    assert!(!form.form_status().is_dirty);

    form.flush();
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_parent_write_refreshes_child_dirty() {
    let form = manual_form(json!({"user": {"name": "a", "age": 1}}));
    form.set_field_value("user.name", json!("b")).await;
    assert!(form.is_field_dirty("user.name"));

    form.set_field_value("user", json!({"name": "a", "age": 2})).await;
    assert!(!form.is_field_dirty("user.name"));
    assert!(form.is_field_dirty("user"));
}

#[tokio::test]
async fn test_get_fields_value_is_flat() {
    let form = manual_form(json!({"a": {"b": 1}, "c": 2}));
    assert_eq!(
        form.get_fields_value(&[Path::from("a.b"), Path::from("missing")]),
        json!({"a.b": 1, "missing": null})
    );
    assert_eq!(form.get_fields_value(&[]), json!({"a": {"b": 1}, "c": 2}));
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn test_reset_all_restores_initial_snapshot() {
    let form = manual_form(json!({"a": 1, "b": {"c": 2}}));
    form.set_field_value("a", json!(5)).await;
    form.set_fields_value(json!({"b": {"c": 3}})).await;
    form.set_external_errors(vec![(Path::from("a"), vec!["bad".to_owned()])])
        .await;
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());

    form.reset_fields(&[]).await;
    form.flush();

    assert_eq!(*form.values(), json!({"a": 1, "b": {"c": 2}}));
    assert!(!form.is_fields_touched(&[]));
    assert!(!form.is_fields_dirty(&[]));
    assert!(!form.is_fields_validating(&[]));
    assert!(form.get_fields_error(&[]).is_empty());
    assert!(form.form_status().is_valid);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].1.contains(ChangeMask::RESET));
}

#[tokio::test]
async fn test_partial_reset_leaves_other_fields() {
    let form = manual_form(json!({"a": {"x": 1}, "b": 2}));
    form.set_field_value("a.x", json!(9)).await;
    form.set_field_value("b", json!(3)).await;

    form.reset_fields(&[Path::from("a")]).await;

    assert_eq!(*form.values(), json!({"a": {"x": 1}, "b": 3}));
    assert!(!form.is_field_dirty("a.x"));
    assert!(form.is_field_dirty("b"));
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn test_transaction_coalesces_notifications() {
    let form = form_with(json!({"a": 0, "b": 0}), FlushPolicy::Immediate);
    let (events, _sub) = record(&form, &["a", "b"], SubscribeOptions::default());

    form.transaction_async(async {
        form.set_field_value("a", json!(1)).await;
        form.set_field_value("a", json!(2)).await;
        form.set_field_value("b", json!(1)).await;
        Ok::<_, ()>(())
    })
    .await
    .unwrap();

    let full = ChangeMask::VALUE | ChangeMask::TOUCHED | ChangeMask::DIRTY;
    assert_eq!(
        *events.lock().unwrap(),
        vec![("a".to_owned(), full), ("b".to_owned(), full)]
    );
}

#[tokio::test]
async fn test_without_transaction_each_write_notifies() {
    let form = form_with(json!({"a": 0}), FlushPolicy::Immediate);
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());

    form.set_field_value("a", json!(1)).await;
    form.set_field_value("a", json!(2)).await;

    assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_transaction_drops_notifications_but_keeps_values() {
    let form = form_with(json!({"a": 0}), FlushPolicy::Immediate);
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());

    let result: Result<(), &str> = form
        .transaction_async(async {
            form.set_field_value("a", json!(5)).await;
            Err("nope")
        })
        .await;

    assert_eq!(result, Err("nope"));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(form.get_field_value("a"), Some(json!(5)));
}

#[tokio::test]
async fn test_exact_listener_fires_before_prefix_listener() {
    let form = manual_form(json!({"user": {"name": "", "age": 0}}));
    let order = Arc::new(Mutex::new(Vec::new()));

    let sink = order.clone();
    let _prefix = form.subscribe_field(
        &[Path::from("user")],
        SubscribeOptions::default().with_children(),
        move |event| sink.lock().unwrap().push(("prefix", event.mask)),
    );
    let sink = order.clone();
    let _exact = form.subscribe_field(
        &[Path::from("user.name")],
        SubscribeOptions::default(),
        move |event| sink.lock().unwrap().push(("exact", event.mask)),
    );

    form.set_field_value("user.name", json!("ada")).await;
    form.set_field_value("user.age", json!(36)).await;
    form.flush();

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].0, "exact");
    assert_eq!(order[1].0, "prefix");
    assert!(order[1].1.contains(ChangeMask::VALUE));
}

#[tokio::test]
async fn test_mask_filters_events() {
    let form = manual_form(json!({"a": 0}));
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::mask(ChangeMask::ERRORS));

    form.set_field_value("a", json!(1)).await;
    form.flush();
    assert!(events.lock().unwrap().is_empty());

    form.set_external_errors(vec![(Path::from("a"), vec!["bad".to_owned()])])
        .await;
    form.flush();
    assert_eq!(*events.lock().unwrap(), vec![("a".to_owned(), ChangeMask::ERRORS)]);
}

#[tokio::test]
async fn test_dropping_subscription_unsubscribes() {
    let form = manual_form(json!({"a": 0}));
    let (events, sub) = record(&form, &["a"], SubscribeOptions::default());
    drop(sub);

    form.set_field_value("a", json!(1)).await;
    form.flush();
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_all_hears_everything() {
    let form = manual_form(json!({}));
    let (events, _sub) = record(&form, &[], SubscribeOptions::default());

    form.set_field_value("a.b", json!(1)).await;
    form.set_field_value("c", json!(2)).await;
    form.flush();

    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deferred_flush_runs_after_yield() {
    let form = form_with(json!({"a": 0}), FlushPolicy::Deferred);
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());

    form.set_field_value("a", json!(1)).await;
    form.set_field_value("a", json!(2)).await;
    assert!(events.lock().unwrap().is_empty());

    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[test]
fn test_deferred_flush_dropped_with_runtime_is_rescheduled() {
    let form = form_with(json!({"a": 0}), FlushPolicy::Deferred);
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());

    let first = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    first.block_on(form.set_field_value("a", json!(1)));
    drop(first);
    assert!(events.lock().unwrap().is_empty());

    let second = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    second.block_on(async {
        form.set_field_value("a", json!(2)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    });
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_values_change_callback_gets_written_subtree() {
    let form = manual_form(json!({}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    form.set_callbacks(Callbacks::new().on_values_change(move |changed, all| {
        sink.lock().unwrap().push((changed.clone(), all.clone()));
    }));

    form.set_field_value("user.name", json!("ada")).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, json!({"user": {"name": "ada"}}));
    assert_eq!(seen[0].1, json!({"user": {"name": "ada"}}));
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_unregister_removes_value_unless_preserved() {
    let form = manual_form(json!({}));

    let temp = form.register_field(FieldEntity::new("temp").with_initial_value(json!("x")));
    assert_eq!(form.get_field_value("temp"), Some(json!("x")));
    drop(temp);
    assert_eq!(form.get_field_value("temp"), None);

    let kept = form.register_field(
        FieldEntity::new("kept")
            .with_initial_value(json!(1))
            .with_preserve(true),
    );
    drop(kept);
    assert_eq!(form.get_field_value("kept"), Some(json!(1)));
}

#[tokio::test]
async fn test_field_on_change_hears_value_changes() {
    let form = manual_form(json!({"a": 0}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _a = form.register_field(
        FieldEntity::new("a").on_change(move |event| sink.lock().unwrap().push(event.value.clone())),
    );

    form.set_field_value("a", json!(1)).await;
    form.set_external_errors(vec![(Path::from("a"), vec!["bad".to_owned()])])
        .await;
    form.flush();

    assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1))]);
}

#[tokio::test]
async fn test_get_fields_in_registration_order() {
    let form = manual_form(json!({"b": 1, "a": 2}));
    let _b = form.register_field(FieldEntity::new("b"));
    let _a = form.register_field(FieldEntity::new("a"));

    let names: Vec<String> = form
        .get_fields(&[])
        .into_iter()
        .map(|meta| meta.name.to_string())
        .collect();
    assert_eq!(names, vec!["b", "a"]);
}

// ============================================================================
// Arrays
// ============================================================================

#[tokio::test]
async fn test_remove_keeps_keys_of_survivors() {
    let form = manual_form(json!({"items": ["a", "b", "c"]}));
    let before = keys(&form, "items");

    form.remove("items", 1).await;
    assert_eq!(*form.values(), json!({"items": ["a", "c"]}));
    assert_eq!(keys(&form, "items"), vec![before[0], before[2]]);

    form.append("items", json!("d")).await;
    let after = keys(&form, "items");
    assert_eq!(after.len(), 3);
    assert!(!after.contains(&before[1]));

    let rows = form.array_fields("items");
    assert_eq!(rows[2].path, Path::from("items").index(2));
}

#[tokio::test]
async fn test_move_and_back_restores_order_and_keys() {
    let form = manual_form(json!({"items": [1, 2, 3, 4]}));
    let original = keys(&form, "items");

    form.move_item("items", 0, 2).await;
    assert_eq!(form.get_field_value("items"), Some(json!([2, 3, 1, 4])));

    form.move_item("items", 2, 0).await;
    assert_eq!(form.get_field_value("items"), Some(json!([1, 2, 3, 4])));
    assert_eq!(keys(&form, "items"), original);
}

#[tokio::test]
async fn test_swap_and_replace() {
    let form = manual_form(json!({"items": ["a", "b", "c"]}));
    let original = keys(&form, "items");

    form.swap("items", 0, 2).await;
    assert_eq!(form.get_field_value("items"), Some(json!(["c", "b", "a"])));
    assert_eq!(keys(&form, "items"), vec![original[2], original[1], original[0]]);

    form.replace("items", 1, json!("z")).await;
    assert_eq!(form.get_field_value("items"), Some(json!(["c", "z", "a"])));
    assert_eq!(keys(&form, "items")[1], original[1]);
}

#[tokio::test]
async fn test_out_of_range_array_op_is_ignored() {
    let form = manual_form(json!({"items": ["a"]}));
    let (events, _sub) = record(&form, &["items"], SubscribeOptions::default());

    form.remove("items", 5).await;
    form.flush();

    assert_eq!(form.get_field_value("items"), Some(json!(["a"])));
    assert!(events.lock().unwrap().is_empty());
    assert!(!form.is_field_touched("items"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_destroy_clears_meta_and_listeners() {
    let form = manual_form(json!({"a": 0}));
    let (events, _sub) = record(&form, &["a"], SubscribeOptions::default());
    form.set_field_value("a", json!(1)).await;

    form.destroy(false);
    form.set_field_value("a", json!(2)).await;
    form.flush();

    assert!(events.lock().unwrap().is_empty());
    assert_eq!(form.get_field_value("a"), Some(json!(2)));

    form.destroy(true);
    assert_eq!(*form.values(), json!({}));
    assert!(!form.is_fields_dirty(&[]));
}

#[tokio::test]
async fn test_set_initial_values_recomputes_dirty() {
    let form = manual_form(json!({"a": 1}));
    let _a = form.register_field(FieldEntity::new("a"));
    form.set_field_value("a", json!(2)).await;
    assert!(form.is_field_dirty("a"));

    form.set_initial_values(json!({"a": 2, "b": 0}));

    assert!(!form.is_field_dirty("a"));
    assert_eq!(*form.values(), json!({"a": 2, "b": 0}));
    assert_eq!(form.initial_value("b"), Some(json!(0)));
}
