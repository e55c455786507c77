use crate::prediction::BatchResult;
use axum::{
    extract::rejection::{BytesRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Prediction service is not available")]
    ServiceUnavailable,
    #[error("{0}")]
    BadRequest(String),
    #[error("All image predictions failed")]
    AllFailed(Box<BatchResult>),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Extractor rejections: an oversized body keeps its 413, anything else is a
    /// malformed request.
    fn from_rejection(status: StatusCode, body_text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(body_text)
        } else {
            ApiError::Unprocessable(body_text)
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, detail) = match self {
            ApiError::ServiceUnavailable => {
                tracing::error!("Prediction service not initialized");
                (StatusCode::SERVICE_UNAVAILABLE, json!(message))
            }
            ApiError::BadRequest(msg) => {
                tracing::error!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, json!(msg))
            }
            ApiError::AllFailed(result) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "status": "failed",
                    "message": message,
                    "data": result,
                }),
            ),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!(msg)),
            ApiError::PayloadTooLarge(msg) => {
                tracing::warn!("Rejected request body: {}", msg);
                (StatusCode::PAYLOAD_TOO_LARGE, json!(msg))
            }
            ApiError::Internal(msg) => {
                tracing::error!("Prediction error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!(msg))
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1024 * 64).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_service_unavailable_response() {
        let response = ApiError::ServiceUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Prediction service is not available");
    }

    #[tokio::test]
    async fn test_all_failed_embeds_batch_result() {
        let result = BatchResult {
            total_images: 1,
            successful_predictions: 0,
            failed_predictions: 1,
            total_processing_time_ms: 0.5,
            average_time_per_image_ms: 0.5,
            predictions: vec![],
            errors: None,
        };
        let response = ApiError::AllFailed(Box::new(result)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["detail"]["status"], "failed");
        assert_eq!(body["detail"]["message"], "All image predictions failed");
        assert_eq!(body["detail"]["data"]["failed_predictions"], 1);
    }

    #[tokio::test]
    async fn test_status_codes() {
        assert_eq!(
            ApiError::Unprocessable("bad".into()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("nope".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PayloadTooLarge("big".into()).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_rejection_status_mapping() {
        assert!(matches!(
            ApiError::from_rejection(StatusCode::PAYLOAD_TOO_LARGE, "limit".into()),
            ApiError::PayloadTooLarge(msg) if msg == "limit"
        ));
        assert!(matches!(
            ApiError::from_rejection(StatusCode::BAD_REQUEST, "syntax".into()),
            ApiError::Unprocessable(_)
        ));
        assert!(matches!(
            ApiError::from_rejection(StatusCode::UNSUPPORTED_MEDIA_TYPE, "type".into()),
            ApiError::Unprocessable(_)
        ));
    }
}
