//! Health and service info endpoints

use axum::{extract::State, Json};
use image_pipeline::MODEL_INPUT_SIZE;
use inference_engine::ClassCatalog;
use serde::Serialize;
use std::sync::Arc;

use crate::{AppState, SERVICE_NAME};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub service: &'static str,
}

/// Advertised endpoints
#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub predict: &'static str,
}

/// Model description
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub classes: ClassCatalog,
    pub input_size: String,
    pub format: &'static str,
    pub loaded: bool,
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: String,
    pub endpoints: Endpoints,
    pub model: ModelInfo,
}

/// Liveness plus model state. Always 200, even without a model.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.service.engine().is_loaded(),
        service: SERVICE_NAME,
    })
}

/// Service description
pub async fn index(State(state): State<Arc<AppState>>) -> Json<IndexResponse> {
    Json(IndexResponse {
        service: "Rice Leaf Disease Detection API",
        version: state.version.clone(),
        endpoints: Endpoints {
            health: "/health",
            predict: "/predict (POST with image file)",
        },
        model: ModelInfo {
            classes: state.service.catalog().clone(),
            input_size: format!("{0}x{0}", MODEL_INPUT_SIZE),
            format: state.model_format(),
            loaded: state.service.engine().is_loaded(),
        },
    })
}
