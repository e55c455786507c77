use crate::{model_service::ModelService, routes::API_VERSION, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
pub struct RootStatus {
    status: &'static str,
    message: &'static str,
    version: &'static str,
    model_path: PathBuf,
    model_loaded: bool,
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    message: &'static str,
    data: HealthData,
}

#[derive(Serialize)]
pub struct HealthData {
    api_version: &'static str,
    model: Option<String>,
    model_info: ModelFileInfo,
}

#[derive(Serialize)]
pub struct ModelFileInfo {
    model_path: PathBuf,
    model_exists: bool,
    model_size_mb: Option<f64>,
    model_loaded: bool,
}

pub async fn root<M: ModelService>(State(state): State<SharedState<M>>) -> Json<RootStatus> {
    Json(RootStatus {
        status: "success",
        message: "Image Classification API is running",
        version: API_VERSION,
        model_path: state.model_config.get_path(),
        model_loaded: state.is_model_loaded(),
    })
}

pub async fn healthcheck<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> Json<HealthStatus> {
    let model_path = state.model_config.get_path();
    let model = state
        .prediction_service
        .as_ref()
        .map(|service| service.model().model_name().to_string());

    Json(HealthStatus {
        status: "success",
        message: "Service is healthy",
        data: HealthData {
            api_version: API_VERSION,
            model,
            model_info: ModelFileInfo {
                model_exists: model_path.exists(),
                model_size_mb: state.model_config.get_size_mb(),
                model_loaded: state.is_model_loaded(),
                model_path,
            },
        },
    })
}
