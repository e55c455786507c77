use crate::{
    model_service::ModelService,
    prediction::{BatchResult, PredictionError, PredictionResult},
    routes::{ApiError, Envelope},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        Query, State,
    },
    response::Json,
};
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

const PREDICT_ROUTE: &str = "/predict";
const PREDICT_SINGLE_ROUTE: &str = "/predict/single";

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub images: Vec<String>,
}

impl ImageRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.images.is_empty() {
            return Err(ApiError::Unprocessable(
                "Images list cannot be empty".to_string(),
            ));
        }
        for (index, image) in self.images.iter().enumerate() {
            if image.trim().is_empty() {
                return Err(ApiError::Unprocessable(format!(
                    "Image at index {} cannot be empty",
                    index
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SingleImageQuery {
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SingleImageRequest {
    pub image: String,
}

/// Picks the image from a JSON body when one is sent, otherwise from the query.
fn extract_single_image(query: SingleImageQuery, body: &Bytes) -> Result<String, ApiError> {
    let image = if body.iter().all(u8::is_ascii_whitespace) {
        query.image
    } else {
        let request: SingleImageRequest = serde_json::from_slice(body)
            .map_err(|e| ApiError::Unprocessable(format!("Invalid request body: {}", e)))?;
        Some(request.image)
    };

    match image {
        None => Err(ApiError::Unprocessable(
            "Field required: image".to_string(),
        )),
        Some(image) if image.trim().is_empty() => Err(ApiError::Unprocessable(
            "Image cannot be empty".to_string(),
        )),
        Some(image) => Ok(image),
    }
}

#[instrument(skip(state, payload))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<Envelope<BatchResult>>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let prediction_service = state.prediction_service()?;

    tracing::info!(
        "Received prediction request for {} image(s)",
        request.images.len()
    );
    let start = Instant::now();
    let result =
        tokio::task::spawn_blocking(move || prediction_service.predict_batch(&request.images))
            .await
            .map_err(|e| ApiError::Internal(format!("Prediction failed: {}", e)))?;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_secs_f64() * 1000.0, PREDICT_ROUTE);
    state
        .metrics
        .record_images(result.successful_predictions, result.failed_predictions);

    if result.all_failed() {
        tracing::error!("All predictions failed");
        return Err(ApiError::AllFailed(Box::new(result)));
    }

    let message = if result.failed_predictions > 0 {
        let message = format!(
            "Images classified with {} error(s)",
            result.failed_predictions
        );
        tracing::warn!("{}", message);
        message
    } else {
        let message = "Images classified successfully".to_string();
        tracing::info!("{}", message);
        message
    };

    Ok(Json(Envelope::success(message, result)))
}

#[instrument(skip(state, query, body))]
pub async fn predict_single<M: ModelService>(
    State(state): State<SharedState<M>>,
    query: Result<Query<SingleImageQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Envelope<PredictionResult>>, ApiError> {
    let Query(query) = query?;
    let image = extract_single_image(query, &body?)?;

    let prediction_service = state.prediction_service()?;

    tracing::info!("Received single image prediction request");
    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || prediction_service.predict_one(&image))
        .await
        .map_err(|e| ApiError::Internal(format!("Prediction failed: {}", e)))?;

    state.metrics.record_prediction_duration(
        start.elapsed().as_secs_f64() * 1000.0,
        PREDICT_SINGLE_ROUTE,
    );

    match outcome {
        Ok(result) => {
            state.metrics.record_images(1, 0);
            Ok(Json(Envelope::success(
                "Image classified successfully",
                result,
            )))
        }
        Err(e) => {
            state.metrics.record_images(0, 1);
            Err(match e {
                PredictionError::Validation(msg) => ApiError::BadRequest(msg),
                PredictionError::Inference(msg) => ApiError::Internal(msg),
            })
        }
    }
}
