use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("dcoord".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    LOCK_ACQUIRE_METRIC
        .with_label_values(&["database", "acquired"])
        .inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"dcoord_lock_acquire_total"),
        "Missing dcoord_lock_acquire_total"
    );
}

#[test]
fn test_register_is_idempotent() {
    let registry = create_test_registry();
    register_custom_metrics(&registry);

    LOCK_ACK_METRIC.with_label_values(&["global"]).inc();
    let names: Vec<_> = registry
        .gather()
        .iter()
        .map(|m| m.get_name().to_string())
        .filter(|n| n == "dcoord_lock_ack_total")
        .collect();
    assert_eq!(names.len(), 1);
}

#[test]
fn test_counter_increment() {
    // Label unused elsewhere so parallel tests do not interfere
    let counter = MALFORMED_CONTENT_METRIC.with_label_values(&["metrics-test"]);
    counter.reset();

    counter.inc();
    counter.inc();

    let value = counter.get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

#[test]
fn test_histogram_labels() {
    LOCK_ACQUIRE_DURATION_METRIC
        .with_label_values(&["metrics-test-a"])
        .observe(12.0);
    LOCK_ACQUIRE_DURATION_METRIC
        .with_label_values(&["metrics-test-b"])
        .observe(40.0);

    let a_count = LOCK_ACQUIRE_DURATION_METRIC
        .with_label_values(&["metrics-test-a"])
        .get_sample_count();
    let b_count = LOCK_ACQUIRE_DURATION_METRIC
        .with_label_values(&["metrics-test-b"])
        .get_sample_count();

    assert_eq!(a_count, 1);
    assert_eq!(b_count, 1);
}
