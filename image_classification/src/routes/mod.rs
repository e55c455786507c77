mod error;
mod health;
mod metrics;
mod model_info;
mod predict;
mod sensor;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;

pub use error::ApiError;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `{status, message, data}` wrapper shared by the JSON endpoints.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

/// Routes that depend on the model, mounted under the configured API prefix.
pub fn prediction_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/predict", post(predict::predict::<M>))
        .route("/predict/single", post(predict::predict_single::<M>))
        .route("/model/info", get(model_info::model_info::<M>))
}

pub fn service_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(health::root::<M>))
        .route("/health", get(health::healthcheck::<M>))
        .route("/sensor/temp", get(sensor::temperature::<M>))
        .route("/sensor/hum", get(sensor::humidity::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
