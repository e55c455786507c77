use crate::{
    decoder,
    model_service::{ClassScore, ModelService},
};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Inference(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Speed {
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub original_shape: [u32; 3],
    pub model_input_shape: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub speed: Speed,
    pub image_info: ImageInfo,
    pub top5_predictions: Vec<ClassScore>,
    pub all_classes_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub image_index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total_images: usize,
    pub successful_predictions: usize,
    pub failed_predictions: usize,
    pub total_processing_time_ms: f64,
    pub average_time_per_image_ms: f64,
    pub predictions: Vec<PredictionResult>,
    pub errors: Option<Vec<BatchError>>,
}

impl BatchResult {
    pub fn all_failed(&self) -> bool {
        self.total_images > 0 && self.successful_predictions == 0
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn round_confidence(confidence: f32) -> f32 {
    round_to(confidence as f64, 4) as f32
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Decodes payloads and runs them through a shared model.
pub struct PredictionService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> PredictionService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    pub fn model(&self) -> &M {
        &self.model_service
    }

    #[instrument(skip(self, payload))]
    pub fn predict_one(&self, payload: &str) -> Result<PredictionResult, PredictionError> {
        let preprocess_start = Instant::now();
        let image = decoder::decode(payload).map_err(|e| {
            PredictionError::Validation(format!("Failed to decode base64 image: {}", e))
        })?;
        let preprocess_ms = elapsed_ms(preprocess_start);

        let inference_start = Instant::now();
        let inference = self
            .model_service
            .classify(&image)
            .map_err(|e| PredictionError::Inference(format!("Prediction failed: {}", e)))?;
        let inference_ms = elapsed_ms(inference_start);

        let postprocess_start = Instant::now();
        let top5_predictions = inference
            .top5
            .into_iter()
            .map(|score| ClassScore {
                label: score.label,
                confidence: round_confidence(score.confidence),
            })
            .collect();
        let class_name = inference.top1.label;
        let confidence = round_confidence(inference.top1.confidence);
        let postprocess_ms = elapsed_ms(postprocess_start);

        let total_ms = preprocess_ms + inference_ms + postprocess_ms;

        Ok(PredictionResult {
            class_name,
            confidence,
            speed: Speed {
                preprocess_ms: round_to(preprocess_ms, 2),
                inference_ms: round_to(inference_ms, 2),
                postprocess_ms: round_to(postprocess_ms, 2),
                total_ms: round_to(total_ms, 2),
            },
            image_info: ImageInfo {
                original_shape: image.shape(),
                model_input_shape: inference.input_shape,
            },
            top5_predictions,
            all_classes_count: inference.class_count,
            image_index: None,
        })
    }

    /// Runs every payload in order. Failures are collected per index and
    /// never abort the remaining payloads.
    #[instrument(skip(self, payloads), fields(total = payloads.len()))]
    pub fn predict_batch(&self, payloads: &[String]) -> BatchResult {
        let total_start = Instant::now();
        let mut predictions = Vec::new();
        let mut failed_images = Vec::new();

        for (index, payload) in payloads.iter().enumerate() {
            match self.predict_one(payload) {
                Ok(mut prediction) => {
                    prediction.image_index = Some(index);
                    predictions.push(prediction);
                }
                Err(e) => {
                    tracing::debug!("Image {} failed: {}", index, e);
                    failed_images.push(BatchError {
                        image_index: index,
                        error: e.to_string(),
                    });
                }
            }
        }

        let total_ms = elapsed_ms(total_start);
        let total_images = payloads.len();
        let average_time_per_image_ms = if total_images > 0 {
            round_to(total_ms / total_images as f64, 2)
        } else {
            0.0
        };

        BatchResult {
            total_images,
            successful_predictions: predictions.len(),
            failed_predictions: failed_images.len(),
            total_processing_time_ms: round_to(total_ms, 2),
            average_time_per_image_ms,
            predictions,
            errors: if failed_images.is_empty() {
                None
            } else {
                Some(failed_images)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::{tests::red_png, DecodedImage},
        model_service::{rank_scores, ModelError, RawInference},
    };
    use base64::{engine::general_purpose::STANDARD, Engine};

    struct MockModelService {
        scores: Vec<f32>,
        labels: Vec<String>,
    }

    impl MockModelService {
        fn new(scores: Vec<f32>) -> Self {
            let labels = (0..scores.len()).map(|i| format!("class{}", i)).collect();
            Self { scores, labels }
        }
    }

    impl ModelService for MockModelService {
        fn classify(&self, _image: &DecodedImage) -> Result<RawInference, ModelError> {
            rank_scores(&self.scores, &self.labels, vec![1, 3, 224, 224])
        }

        fn class_count(&self) -> usize {
            self.labels.len()
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    struct FailingModelService;

    impl ModelService for FailingModelService {
        fn classify(&self, _image: &DecodedImage) -> Result<RawInference, ModelError> {
            Err(ModelError::InvalidOutput("missing output tensor `output0`".to_string()))
        }

        fn class_count(&self) -> usize {
            0
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn decimals(value: f64) -> usize {
        let text = format!("{}", value);
        text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
    }

    #[test]
    fn test_predict_one_shapes_result() {
        let service =
            PredictionService::new(MockModelService::new(vec![0.123456, 0.654321, 0.222223]));
        let result = service.predict_one(&red_png(1, 1)).unwrap();

        assert_eq!(result.class_name, "class1");
        assert_eq!(result.confidence, 0.6543);
        assert_eq!(result.top5_predictions.len(), 3);
        assert_eq!(result.top5_predictions[1].confidence, 0.2222);
        assert_eq!(result.top5_predictions[2].confidence, 0.1235);
        assert_eq!(result.all_classes_count, 3);
        assert_eq!(result.image_info.original_shape, [1, 1, 3]);
        assert_eq!(result.image_info.model_input_shape, vec![1, 3, 224, 224]);
        assert_eq!(result.image_index, None);

        let speed = &result.speed;
        for value in [
            speed.preprocess_ms,
            speed.inference_ms,
            speed.postprocess_ms,
            speed.total_ms,
        ] {
            assert!(value >= 0.0);
            assert!(decimals(value) <= 2);
        }
    }

    #[test]
    fn test_predict_one_invalid_payload_is_validation_error() {
        let service = PredictionService::new(MockModelService::new(vec![1.0]));
        let err = service.predict_one("%%%").unwrap_err();

        match err {
            PredictionError::Validation(msg) => {
                assert!(msg.starts_with("Failed to decode base64 image"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_predict_one_model_failure_is_inference_error() {
        let service = PredictionService::new(FailingModelService);
        let err = service.predict_one(&red_png(2, 2)).unwrap_err();

        match err {
            PredictionError::Inference(msg) => {
                assert!(msg.starts_with("Prediction failed:"));
                assert!(msg.contains("output0"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_predict_batch_preserves_index_order() {
        let service = PredictionService::new(MockModelService::new(vec![0.1, 0.9]));
        let not_an_image = STANDARD.encode(b"plain text");
        let payloads = vec![
            red_png(1, 1),
            "!!invalid!!".to_string(),
            red_png(2, 3),
            not_an_image,
            red_png(4, 4),
        ];

        let result = service.predict_batch(&payloads);

        assert_eq!(result.total_images, 5);
        assert_eq!(result.successful_predictions, 3);
        assert_eq!(result.failed_predictions, 2);
        assert_eq!(
            result.successful_predictions + result.failed_predictions,
            result.total_images
        );
        let success_indices: Vec<Option<usize>> =
            result.predictions.iter().map(|p| p.image_index).collect();
        assert_eq!(success_indices, vec![Some(0), Some(2), Some(4)]);

        let errors = result.errors.as_ref().unwrap();
        let error_indices: Vec<usize> = errors.iter().map(|e| e.image_index).collect();
        assert_eq!(error_indices, vec![1, 3]);
        assert!(errors[1].error.contains("Failed to decode base64 image"));
        assert!(!result.all_failed());
    }

    #[test]
    fn test_predict_batch_all_failed() {
        let service = PredictionService::new(FailingModelService);
        let payloads = vec![red_png(1, 1), red_png(1, 1)];

        let result = service.predict_batch(&payloads);

        assert_eq!(result.successful_predictions, 0);
        assert_eq!(result.failed_predictions, 2);
        assert!(result.predictions.is_empty());
        assert!(result.all_failed());
    }

    #[test]
    fn test_predict_batch_empty_input() {
        let service = PredictionService::new(MockModelService::new(vec![1.0]));
        let result = service.predict_batch(&[]);

        assert_eq!(result.total_images, 0);
        assert_eq!(result.successful_predictions, 0);
        assert_eq!(result.failed_predictions, 0);
        assert_eq!(result.average_time_per_image_ms, 0.0);
        assert!(result.errors.is_none());
        assert!(!result.all_failed());
    }

    #[test]
    fn test_batch_result_serialization() {
        let service = PredictionService::new(MockModelService::new(vec![0.25, 0.75]));
        let result = service.predict_batch(&[red_png(1, 1)]);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["errors"], serde_json::Value::Null);
        assert_eq!(json["predictions"][0]["class"], "class1");
        assert_eq!(json["predictions"][0]["image_index"], 0);
        assert_eq!(json["predictions"][0]["top5_predictions"][0]["class"], "class1");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.987654, 4), 0.9877);
        assert_eq!(round_to(0.0, 2), 0.0);
    }
}
