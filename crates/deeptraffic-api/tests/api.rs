//! HTTP-level tests driving the router with stub models.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::Engine;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;

use deeptraffic_api::{create_router, ApiConfig, AppState, LoadedModels};
use deeptraffic_vision::{
    encode_frame, ClassNames, DetectParams, Frame, ImageEncoding, ObjectDetector, PixelBox,
    RawDetection, SaliencyMap, SaliencyModel, VisionError, VisionResult,
};

/// Reports a car and a truck at fixed positions on any frame that is not
/// completely black.
struct FixedDetector {
    classes: ClassNames,
}

impl ObjectDetector for FixedDetector {
    fn detect(&self, frame: &Frame, _params: &DetectParams) -> VisionResult<Vec<RawDetection>> {
        if frame.image().pixels().all(|p| p.0 == [0, 0, 0]) {
            return Ok(Vec::new());
        }
        Ok(vec![
            RawDetection {
                bbox: PixelBox::new(10.0, 20.0, 110.0, 80.0),
                class_id: 2,
                confidence: 0.91,
            },
            RawDetection {
                bbox: PixelBox::new(150.0, 100.0, 300.0, 220.0),
                class_id: 7,
                confidence: 0.77,
            },
        ])
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn input_size(&self) -> u32 {
        640
    }
}

/// Holds each frame for a fixed time before reporting one car.
struct SlowDetector {
    delay: Duration,
    classes: ClassNames,
}

impl ObjectDetector for SlowDetector {
    fn detect(&self, _frame: &Frame, _params: &DetectParams) -> VisionResult<Vec<RawDetection>> {
        std::thread::sleep(self.delay);
        Ok(vec![RawDetection {
            bbox: PixelBox::new(10.0, 20.0, 110.0, 80.0),
            class_id: 2,
            confidence: 0.9,
        }])
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn input_size(&self) -> u32 {
        640
    }
}

/// Fails every inference with a server-side error.
struct BrokenDetector {
    classes: ClassNames,
}

impl ObjectDetector for BrokenDetector {
    fn detect(&self, _frame: &Frame, _params: &DetectParams) -> VisionResult<Vec<RawDetection>> {
        Err(VisionError::inference("session exploded"))
    }

    fn class_names(&self) -> &ClassNames {
        &self.classes
    }

    fn input_size(&self) -> u32 {
        640
    }
}

/// Uniform saliency; rejects class ids past the 1000 ImageNet classes.
struct UniformSaliency;

impl SaliencyModel for UniformSaliency {
    fn saliency(&self, _frame: &Frame, target_class: Option<usize>) -> VisionResult<SaliencyMap> {
        if target_class.is_some_and(|c| c >= 1000) {
            return Err(VisionError::invalid_parameter("target_class out of range"));
        }
        SaliencyMap::new(224, 224, vec![0.5; 224 * 224])
    }

    fn name(&self) -> &str {
        "uniform"
    }

    fn warm_up(&self) -> VisionResult<()> {
        Ok(())
    }
}

fn stub_models() -> LoadedModels {
    LoadedModels::new(
        Arc::new(FixedDetector {
            classes: ClassNames::coco(),
        }),
        Arc::new(UniformSaliency),
    )
}

async fn ready_app() -> (Router, AppState) {
    app_with(ApiConfig::default(), stub_models()).await
}

async fn app_with(config: ApiConfig, models: LoadedModels) -> (Router, AppState) {
    let state = AppState::new(config);
    state.lifecycle.install(models).await;
    (create_router(state.clone(), None), state)
}

fn with_detector(detector: impl ObjectDetector + 'static) -> LoadedModels {
    LoadedModels::new(Arc::new(detector), Arc::new(UniformSaliency))
}

fn unloaded_app() -> Router {
    create_router(AppState::new(ApiConfig::default()), None)
}

fn frame_b64(width: u32, height: u32, value: u8) -> String {
    let frame = Frame::new(RgbImage::from_pixel(width, height, Rgb([value, value, value])));
    encode_frame(&frame, ImageEncoding::Png).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn health_reports_unloaded_models() {
    let app = unloaded_app();

    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["model_path"], "best.onnx");
    assert_eq!(body["tracker"], "iou");
    assert_eq!(body["state"], "unloaded");
}

#[tokio::test]
async fn health_reports_ready_models() {
    let (app, _) = ready_app().await;

    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["state"], "ready");
}

#[tokio::test]
async fn model_backed_endpoints_unavailable_until_loaded() {
    let app = unloaded_app();
    let frame = frame_b64(64, 64, 200);

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Model not loaded");

    let (status, _) = post(&app, "/api/explain", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = get(&app, "/api/model-info").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["state"], "unloaded");
}

#[tokio::test]
async fn liveness_probes_always_succeed() {
    let app = unloaded_app();

    for path in ["/health", "/healthz"] {
        let (status, body) = get(&app, path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}

#[tokio::test]
async fn ready_probe_after_load() {
    let (app, _) = ready_app().await;

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn model_info_lists_classes_by_id() {
    let (app, _) = ready_app().await;

    let (status, body) = get(&app, "/api/model-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_name"], "best");
    assert_eq!(body["model_type"], "YOLOv8");
    assert_eq!(body["num_classes"], 80);
    assert_eq!(body["classes"]["2"], "car");
    assert_eq!(body["classes"]["7"], "truck");
    assert_eq!(body["input_size"], 640);
    assert_eq!(body["framework"], "ONNX Runtime");
}

#[tokio::test]
async fn detect_rejects_malformed_base64() {
    let (app, _) = ready_app().await;

    let (status, body) = post(&app, "/api/detect", json!({ "frame": "not-base64!!" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Invalid frame data"));
}

#[tokio::test]
async fn detect_rejects_bytes_that_are_not_an_image() {
    let (app, _) = ready_app().await;
    let payload = base64::engine::general_purpose::STANDARD.encode(b"definitely not a jpeg");

    let (status, _) = post(&app, "/api/detect", json!({ "frame": payload })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detect_rejects_missing_frame_and_bad_parameters() {
    let (app, _) = ready_app().await;

    let (status, _) = post(&app, "/api/detect", json!({ "conf": 0.5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let frame = frame_b64(64, 64, 200);
    let (status, _) = post(&app, "/api/detect", json!({ "frame": frame, "conf": 1.5 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/detect", json!({ "frame": frame, "imgsz": 100 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/api/detect",
        json!({ "frame": frame, "stream_id": "bad id with spaces" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detect_on_blank_frame_returns_nothing() {
    let (app, _) = ready_app().await;
    let frame = frame_b64(640, 640, 0);

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detections"], json!([]));
    assert_eq!(body["vehicle_count"], 0);
    assert_eq!(body["count_by_class"], json!({}));
    assert_eq!(body["frame_width"], 640);
    assert_eq!(body["frame_height"], 640);
    assert_eq!(body["tracker"], "iou");
    assert_eq!(body["stream_id"], "default");
    assert!(body["inference_time_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn detect_normalizes_and_counts() {
    let (app, _) = ready_app().await;
    let frame = frame_b64(320, 240, 200);

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::OK);

    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(body["vehicle_count"], 2);
    assert_eq!(body["count_by_class"]["car"], 1);
    assert_eq!(body["count_by_class"]["truck"], 1);

    let total: u64 = body["count_by_class"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(total, body["vehicle_count"].as_u64().unwrap());

    let car = &detections[0];
    assert_eq!(car["class_name"], "car");
    assert_eq!(car["class_id"], 2);
    assert_eq!(car["confidence"], 0.91);
    // (10,20)-(110,80) in a 320x240 frame
    assert_eq!(car["bbox"]["x"], 0.1875);
    assert_eq!(car["bbox"]["y"], 0.2083);
    assert_eq!(car["bbox"]["width"], 0.3125);
    assert_eq!(car["bbox"]["height"], 0.25);

    for detection in detections {
        for key in ["x", "y", "width", "height"] {
            let v = detection["bbox"][key].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v), "{} out of range: {}", key, v);
        }
    }
}

#[tokio::test]
async fn track_ids_are_stable_within_a_stream() {
    let (app, _) = ready_app().await;
    let frame = frame_b64(320, 240, 200);

    let (_, first) = post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-1" })).await;
    let (_, second) = post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-1" })).await;

    let ids = |body: &Value| -> Vec<i64> {
        body["detections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["track_id"].as_i64().unwrap())
            .collect()
    };

    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn streams_do_not_share_tracks() {
    let (app, state) = ready_app().await;
    let frame = frame_b64(320, 240, 200);

    post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-1" })).await;
    let (_, other) = post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-2" })).await;

    let first_id = other["detections"][0]["track_id"].as_i64().unwrap();
    assert_eq!(first_id, 1);
    assert_eq!(state.trackers.len(), 2);
}

#[tokio::test]
async fn untracked_requests_use_sentinel_ids() {
    let (app, state) = ready_app().await;
    let frame = frame_b64(320, 240, 200);

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame, "track": false })).await;
    assert_eq!(status, StatusCode::OK);
    for detection in body["detections"].as_array().unwrap() {
        assert_eq!(detection["track_id"], -1);
    }
    assert!(state.trackers.is_empty());
}

#[tokio::test]
async fn stream_sessions_can_be_listed_and_deleted() {
    let (app, _) = ready_app().await;
    let frame = frame_b64(320, 240, 200);

    post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-1" })).await;

    let (status, body) = get(&app, "/api/streams").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["streams"][0]["stream_id"], "cam-1");
    assert_eq!(body["streams"][0]["active_tracks"], 2);
    assert_eq!(body["streams"][0]["frames_processed"], 1);

    let (status, _) = send(&app, Method::DELETE, "/api/streams/cam-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::DELETE, "/api/streams/cam-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("cam-1"));

    // A fresh session restarts numbering
    let (_, body) = post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "cam-1" })).await;
    assert_eq!(body["detections"][0]["track_id"], 1);
}

#[tokio::test]
async fn explain_returns_heatmap_at_frame_size() {
    let (app, _) = ready_app().await;
    let frame = frame_b64(200, 120, 90);

    let (status, body) = post(&app, "/api/explain", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["inference_time_ms"].as_f64().unwrap() >= 0.0);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body["heatmap"].as_str().unwrap())
        .unwrap();
    let heatmap = image::load_from_memory(&bytes).unwrap();
    assert_eq!(heatmap.width(), 200);
    assert_eq!(heatmap.height(), 120);
}

#[tokio::test]
async fn explain_rejects_bad_input() {
    let (app, _) = ready_app().await;

    let (status, _) = post(&app, "/api/explain", json!({ "frame": "not-base64!!" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let frame = frame_b64(64, 64, 90);
    let (status, _) = post(&app, "/api/explain", json!({ "frame": frame, "target_class": 5000 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let (app, _) = ready_app().await;

    let request = Request::builder()
        .uri("/api/health")
        .header("X-Request-ID", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "abc-123");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn inference_routes_are_rate_limited_per_client() {
    let config = ApiConfig {
        rate_limit_rps: 1,
        ..ApiConfig::default()
    };
    let app = create_router(AppState::new(config), None);

    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/detect")
            .header("content-type", "application/json")
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::from(json!({ "frame": "" }).to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["retry-after"], "1");

    // Non-inference routes are not limited
    let (status, _) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn detect_accepts_bodies_above_two_mebibytes() {
    let (app, _) = ready_app().await;
    // Whitespace inside the payload is ignored by the decoder
    let frame = format!("{}{}", frame_b64(320, 240, 200), " ".repeat(3 * 1024 * 1024));

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vehicle_count"], 2);
}

#[tokio::test]
async fn bodies_over_the_configured_limit_are_rejected() {
    let config = ApiConfig {
        max_body_size: 64 * 1024,
        ..ApiConfig::default()
    };
    let (app, _) = app_with(config, stub_models()).await;
    let frame = format!("{}{}", frame_b64(32, 32, 200), " ".repeat(128 * 1024));

    let (status, _) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn rejected_requests_leave_tracker_sessions_alone() {
    let (app, state) = ready_app().await;
    let frame = frame_b64(64, 64, 200);

    let rejected = [
        json!({ "frame": "not-base64!!", "stream_id": "ghost" }),
        json!({ "frame": frame, "stream_id": "ghost", "conf": 1.5 }),
        json!({ "frame": frame, "stream_id": "ghost", "imgsz": 100 }),
        json!({ "frame": frame, "stream_id": "bad id with spaces" }),
    ];
    for body in rejected {
        let (status, _) = post(&app, "/api/detect", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    assert!(state.trackers.is_empty());
}

#[tokio::test]
async fn timed_out_detection_does_not_advance_the_stream() {
    let config = ApiConfig {
        inference_timeout: Duration::from_millis(100),
        ..ApiConfig::default()
    };
    let detector = SlowDetector {
        delay: Duration::from_millis(400),
        classes: ClassNames::coco(),
    };
    let (app, state) = app_with(config, with_detector(detector)).await;
    let frame = frame_b64(320, 240, 200);

    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame, "stream_id": "slow" })).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["detail"].as_str().unwrap().contains("timed out"));

    // Let the abandoned job run to completion
    tokio::time::sleep(Duration::from_millis(700)).await;

    for stream in state.trackers.snapshot() {
        assert_eq!(stream.frames_processed, 0);
        assert_eq!(stream.active_tracks, 0);
    }
}

#[tokio::test]
async fn internal_error_detail_hidden_in_production() {
    let broken = || BrokenDetector {
        classes: ClassNames::coco(),
    };
    let frame = frame_b64(64, 64, 200);

    let (app, _) = app_with(ApiConfig::default(), with_detector(broken())).await;
    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("session exploded"));

    let config = ApiConfig {
        environment: "production".to_string(),
        ..ApiConfig::default()
    };
    let (app, _) = app_with(config, with_detector(broken())).await;
    let (status, body) = post(&app, "/api/detect", json!({ "frame": frame })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "An internal error occurred");
}
