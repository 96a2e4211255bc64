//! REST adapter for the control surface (feature `rest-api`).
//!
//! Mounts the control plane behind an axum [`Router`]; the host decides where
//! and how to serve it. Routes mirror the engine's remote-control contract:
//!
//! - `GET  /perceptors` — registered perceptor names
//! - `GET  /outputs` — registered sink names
//! - `GET|PATCH /perceptors/config` — all perceptor configs
//! - `GET|PATCH /perceptors/:name/config` — one perceptor's config
//! - `GET|PATCH /outputs/config` — all sink configs
//! - `GET|PATCH /outputs/:name/config` — one sink's config
//!
//! PATCH bodies are maps of setting name to JSON value (the bulk routes nest
//! them under stage names). Invalid entries come back with `400` while valid
//! entries in the same batch still apply; a successful patch returns the
//! refreshed config report.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::control::{ControlError, ControlPlane, PatchError, PatchOutcome};

/// Build the control router around a pipeline's control plane.
pub fn router(control: ControlPlane) -> Router {
    Router::new()
        .route("/perceptors", get(list_perceptors))
        .route("/outputs", get(list_outputs))
        .route(
            "/perceptors/config",
            get(all_perceptor_configs).patch(patch_all_perceptor_configs),
        )
        .route(
            "/perceptors/:name/config",
            get(perceptor_config).patch(patch_perceptor_config),
        )
        .route(
            "/outputs/config",
            get(all_sink_configs).patch(patch_all_sink_configs),
        )
        .route(
            "/outputs/:name/config",
            get(sink_config).patch(patch_sink_config),
        )
        .with_state(control)
}

async fn list_perceptors(State(control): State<ControlPlane>) -> Response {
    Json(control.perceptor_names()).into_response()
}

async fn list_outputs(State(control): State<ControlPlane>) -> Response {
    Json(control.sink_names()).into_response()
}

async fn all_perceptor_configs(State(control): State<ControlPlane>) -> Response {
    Json(control.all_perceptor_configs()).into_response()
}

async fn perceptor_config(
    State(control): State<ControlPlane>,
    Path(name): Path<String>,
) -> Response {
    match control.perceptor_config(&name) {
        Ok(reports) => Json(reports).into_response(),
        Err(err) => not_found(err),
    }
}

async fn patch_perceptor_config(
    State(control): State<ControlPlane>,
    Path(name): Path<String>,
    Json(patch): Json<FxHashMap<String, Value>>,
) -> Response {
    match control.patch_perceptor_config(&name, &patch) {
        Ok(outcome) if outcome.errors.is_empty() => perceptor_config_refreshed(&control, &name),
        Ok(outcome) => (StatusCode::BAD_REQUEST, Json(outcome.errors)).into_response(),
        Err(err) => not_found(err),
    }
}

async fn patch_all_perceptor_configs(
    State(control): State<ControlPlane>,
    Json(patches): Json<FxHashMap<String, FxHashMap<String, Value>>>,
) -> Response {
    let outcomes = control.patch_all_perceptor_configs(&patches);
    match collect_errors(&outcomes) {
        errors if errors.is_empty() => Json(control.all_perceptor_configs()).into_response(),
        errors => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
    }
}

async fn all_sink_configs(State(control): State<ControlPlane>) -> Response {
    Json(control.all_sink_configs()).into_response()
}

async fn sink_config(State(control): State<ControlPlane>, Path(name): Path<String>) -> Response {
    match control.sink_config(&name) {
        Ok(reports) => Json(reports).into_response(),
        Err(err) => not_found(err),
    }
}

async fn patch_sink_config(
    State(control): State<ControlPlane>,
    Path(name): Path<String>,
    Json(patch): Json<FxHashMap<String, Value>>,
) -> Response {
    match control.patch_sink_config(&name, &patch) {
        Ok(outcome) if outcome.errors.is_empty() => match control.sink_config(&name) {
            Ok(reports) => Json(reports).into_response(),
            Err(err) => not_found(err),
        },
        Ok(outcome) => (StatusCode::BAD_REQUEST, Json(outcome.errors)).into_response(),
        Err(err) => not_found(err),
    }
}

async fn patch_all_sink_configs(
    State(control): State<ControlPlane>,
    Json(patches): Json<FxHashMap<String, FxHashMap<String, Value>>>,
) -> Response {
    let outcomes = control.patch_all_sink_configs(&patches);
    match collect_errors(&outcomes) {
        errors if errors.is_empty() => Json(control.all_sink_configs()).into_response(),
        errors => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
    }
}

fn perceptor_config_refreshed(control: &ControlPlane, name: &str) -> Response {
    match control.perceptor_config(name) {
        Ok(reports) => Json(reports).into_response(),
        Err(err) => not_found(err),
    }
}

fn collect_errors(outcomes: &FxHashMap<String, PatchOutcome>) -> Vec<PatchError> {
    outcomes
        .values()
        .flat_map(|o| o.errors.iter().cloned())
        .collect()
}

fn not_found(err: ControlError) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}
