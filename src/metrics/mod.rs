use autometrics::prometheus_exporter;
use autometrics::prometheus_exporter::PrometheusResponse;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    /// Lock acquire attempts by scope kind and outcome (acquired, timeout, cancelled, contended)
    pub static ref LOCK_ACQUIRE_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("lock_acquire_total", "Lock acquire attempts by outcome"),
        &["scope_kind", "outcome"]
    )
    .expect("metric can not be created");

    /// Time from lease write to the last required ack, in ms
    pub static ref LOCK_ACQUIRE_DURATION_METRIC: HistogramVec = HistogramVec::new(
        HistogramOpts::new("lock_acquire_duration_ms", "Lock acquire duration in ms")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets")),
        &["scope_kind"]
    )
    .expect("metric can not be created");

    /// Acks written by this instance for foreign lock rounds
    pub static ref LOCK_ACK_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("lock_ack_total", "Acks written for foreign lock rounds"),
        &["scope_kind"]
    )
    .expect("metric can not be created");

    /// Versions written by the versioned persistence service
    pub static ref PERSISTED_VERSION_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("persisted_version_total", "Versions written per item kind"),
        &["kind"]
    )
    .expect("metric can not be created");

    /// Malformed stored content read and treated as absent
    pub static ref MALFORMED_CONTENT_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("malformed_content_total", "Malformed stored values treated as absent"),
        &["node"]
    )
    .expect("metric can not be created");

    /// Store notifications that produced no domain event, or were lost by a lagging subscriber
    pub static ref DROPPED_WATCH_EVENT_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("dropped_watch_event_total", "Watch notifications dropped"),
        &["reason"]
    )
    .expect("metric can not be created");

    /// Online compute nodes as last observed by this instance
    pub static ref ONLINE_INSTANCE_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("online_instance", "Online compute nodes observed"),
        &["instance_type"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Register every coordination metric on `registry`.
///
/// Registering twice on the same registry fails; the error is ignored so the
/// call is idempotent from the embedder's point of view.
pub fn register_custom_metrics(registry: &Registry) {
    let _ = registry.register(Box::new(LOCK_ACQUIRE_METRIC.clone()));
    let _ = registry.register(Box::new(LOCK_ACQUIRE_DURATION_METRIC.clone()));
    let _ = registry.register(Box::new(LOCK_ACK_METRIC.clone()));
    let _ = registry.register(Box::new(PERSISTED_VERSION_METRIC.clone()));
    let _ = registry.register(Box::new(MALFORMED_CONTENT_METRIC.clone()));
    let _ = registry.register(Box::new(DROPPED_WATCH_EVENT_METRIC.clone()));
    let _ = registry.register(Box::new(ONLINE_INSTANCE_METRIC.clone()));
}

/// Text exposition of the crate registry plus autometrics function metrics
pub fn get_metrics_body() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("could not encode custom metrics: {}", e);
    };
    let mut res = String::from_utf8(buffer).unwrap_or_default();

    let autometrics_response: PrometheusResponse = prometheus_exporter::encode_http_response();
    res.push_str(&autometrics_response.into_body());
    res
}
