use crate::decoder::DecodedImage;
use serde::Serialize;
use thiserror::Error;

pub const TOP_K: usize = 5;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("failed to load class labels: {0}")]
    Labels(#[from] std::io::Error),
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f32,
}

/// Ranked output of one classification call.
#[derive(Debug, Clone)]
pub struct RawInference {
    pub top1: ClassScore,
    pub top5: Vec<ClassScore>,
    pub class_count: usize,
    pub input_shape: Vec<usize>,
}

/// A loaded classifier. Implementations are immutable after construction and
/// may be called from several requests at once.
pub trait ModelService: Send + Sync + 'static {
    fn classify(&self, image: &DecodedImage) -> Result<RawInference, ModelError>;

    fn class_count(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Ranks per-class scores descending, ties going to the lower class index.
pub fn rank_scores(
    scores: &[f32],
    labels: &[String],
    input_shape: Vec<usize>,
) -> Result<RawInference, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::InvalidOutput("model produced no scores".to_string()));
    }
    if scores.len() != labels.len() {
        return Err(ModelError::InvalidOutput(format!(
            "model produced {} scores but {} class labels are loaded",
            scores.len(),
            labels.len()
        )));
    }

    let scores: Vec<f32> = scores.iter().copied().map(sanitize).collect();
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let top5: Vec<ClassScore> = order
        .iter()
        .take(TOP_K)
        .map(|&index| ClassScore {
            label: labels[index].clone(),
            confidence: scores[index],
        })
        .collect();

    Ok(RawInference {
        top1: top5[0].clone(),
        top5,
        class_count: labels.len(),
        input_shape,
    })
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum).collect()
}
