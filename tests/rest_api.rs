//! In-process exercise of the REST control adapter.
#![cfg(feature = "rest-api")]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use pulseline::config::{ConfigEntry, ConfigKind, ConfigValue};
use pulseline::node::PerceptorBinding;
use pulseline::pipeline::Pipeline;
use pulseline::rest::router;
use pulseline::sink::SinkBinding;
use pulseline::utils::testing::{CollectingSink, ConfigurablePerceptor};
use serde_json::{Value, json};
use tower::ServiceExt;

fn pipeline_with_stage() -> Pipeline {
    let pipeline = Pipeline::default();
    let schema = vec![
        ConfigEntry::new(
            "threshold",
            "Detection threshold",
            ConfigKind::Float,
            ConfigValue::Float(0.5),
            "",
        )
        .unwrap(),
    ];
    pipeline
        .add_perceptor(
            "detector",
            None,
            PerceptorBinding::new(ConfigurablePerceptor::new(schema)),
        )
        .unwrap();
    pipeline
        .add_output_sink("console", SinkBinding::new(CollectingSink::new()))
        .unwrap();
    pipeline
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn patch(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn listing_routes_report_registered_names() {
    let pipeline = pipeline_with_stage();

    let (status, body) = send(router(pipeline.control()), get("/perceptors")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["detector"]));

    let (status, body) = send(router(pipeline.control()), get("/outputs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["console"]));
}

#[tokio::test]
async fn valid_patch_returns_the_refreshed_config() {
    let pipeline = pipeline_with_stage();
    let (status, body) = send(
        router(pipeline.control()),
        patch("/perceptors/detector/config", json!({ "threshold": 0.75 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], json!("threshold"));
    assert_eq!(body[0]["value"], json!(0.75));
}

#[tokio::test]
async fn invalid_entries_return_bad_request_while_valid_ones_apply() {
    let pipeline = pipeline_with_stage();
    let (status, body) = send(
        router(pipeline.control()),
        patch(
            "/perceptors/detector/config",
            json!({ "threshold": 0.9, "bogus": 1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["setting"], json!("bogus"));

    // The valid entry still took effect.
    let reports = pipeline.control().perceptor_config("detector").unwrap();
    assert_eq!(reports[0].value, json!(0.9));
}

#[tokio::test]
async fn unknown_stage_maps_to_not_found() {
    let pipeline = pipeline_with_stage();
    let (status, _) = send(router(pipeline.control()), get("/perceptors/ghost/config")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        router(pipeline.control()),
        patch("/outputs/ghost/config", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_config_routes_cover_every_stage() {
    let pipeline = pipeline_with_stage();
    let (status, body) = send(router(pipeline.control()), get("/perceptors/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detector"][0]["name"], json!("threshold"));

    let (status, body) = send(
        router(pipeline.control()),
        patch("/perceptors/config", json!({ "detector": { "threshold": 0.25 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detector"][0]["value"], json!(0.25));
}
