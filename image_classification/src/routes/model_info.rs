use crate::{
    model_service::ModelService,
    routes::{ApiError, Envelope},
    server::SharedState,
};
use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    model_type: &'static str,
    task: &'static str,
    classes_count: usize,
    model_name: String,
}

#[instrument(skip(state))]
pub async fn model_info<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> Result<Json<Envelope<ModelInfo>>, ApiError> {
    let prediction_service = state.prediction_service()?;
    let model = prediction_service.model();

    Ok(Json(Envelope::success(
        "Model information retrieved",
        ModelInfo {
            model_type: "ONNX Image Classification",
            task: "classify",
            classes_count: model.class_count(),
            model_name: model.model_name().to_string(),
        },
    )))
}
