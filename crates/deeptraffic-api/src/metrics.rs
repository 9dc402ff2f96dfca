//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "deeptraffic_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "deeptraffic_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "deeptraffic_http_requests_in_flight";

    // Inference metrics
    pub const INFERENCE_DURATION_SECONDS: &str = "deeptraffic_inference_duration_seconds";
    pub const INFERENCE_TIMEOUTS_TOTAL: &str = "deeptraffic_inference_timeouts_total";
    pub const DETECTIONS_TOTAL: &str = "deeptraffic_detections_total";

    // Lifecycle metrics
    pub const MODEL_STATE: &str = "deeptraffic_model_state";
    pub const ACTIVE_STREAMS: &str = "deeptraffic_active_streams";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "deeptraffic_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the duration of one model call (`detect` or `explain`).
pub fn record_inference(operation: &str, duration_secs: f64) {
    let labels = [("operation", operation.to_string())];
    histogram!(names::INFERENCE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an inference that exceeded the request timeout.
pub fn record_inference_timeout(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::INFERENCE_TIMEOUTS_TOTAL, &labels).increment(1);
}

/// Record detections returned for one frame, per class.
pub fn record_detections<'a>(counts: impl IntoIterator<Item = (&'a String, &'a u32)>) {
    for (class_name, count) in counts {
        let labels = [("class", class_name.clone())];
        counter!(names::DETECTIONS_TOTAL, &labels).increment(u64::from(*count));
    }
}

/// Update the model lifecycle gauge (0 unloaded, 1 loading, 2 ready).
pub fn set_model_state(value: f64) {
    gauge!(names::MODEL_STATE).set(value);
}

/// Update the tracker session gauge.
pub fn set_active_streams(count: usize) {
    gauge!(names::ACTIVE_STREAMS).set(count as f64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static STREAM_PATH: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^/api/streams/[^/]+").expect("valid stream path pattern")
});

/// Sanitize path for metrics labels (collapse stream ids).
fn sanitize_path(path: &str) -> String {
    STREAM_PATH
        .replace(path, "/api/streams/:stream_id")
        .into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
