use crate::{
    config::ModelConfig,
    decoder::DecodedImage,
    labels::load_class_labels,
    model_service::{rank_scores, softmax, ModelError, ModelService, RawInference},
};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

/// Shortest-side resize plus center crop to `size`, as NCHW scaled to [0, 1].
fn transform_image(image: &DecodedImage, size: u32) -> Array<f32, Ix4> {
    let img = DynamicImage::ImageRgb8(image.pixels().clone())
        .resize_to_fill(size, size, FilterType::Triangle)
        .to_rgb8();

    let side = size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    labels: Vec<String>,
    model_name: String,
    input_size: u32,
    output_name: String,
    apply_softmax: bool,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        model_config.validate().map_err(ModelError::Load)?;

        let labels = load_class_labels(&model_config.get_labels_path())?;

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let model_name = model_config
            .get_path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_config.onnx_file.clone());

        tracing::info!(
            "Created {} ONNX sessions for {} with {} classes",
            num_instances,
            model_name,
            labels.len()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            labels,
            model_name,
            input_size: model_config.input_size,
            output_name: model_config.output_name.clone(),
            apply_softmax: model_config.apply_softmax,
        })
    }

    fn input_shape(&self) -> Vec<usize> {
        let side = self.input_size as usize;
        vec![1, 3, side, side]
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ModelError::InvalidOutput(format!("missing output tensor `{}`", self.output_name))
        })?;
        let (_shape, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn classify(&self, image: &DecodedImage) -> Result<RawInference, ModelError> {
        let start = Instant::now();
        let input = transform_image(image, self.input_size);

        let mut scores = self.run_inference(&input)?;
        if self.apply_softmax {
            scores = softmax(&scores);
        }

        let inference = rank_scores(&scores, &self.labels, self.input_shape())?;
        tracing::debug!(
            "Classified {}x{} image as {} ({:.3}) in {:.2}ms",
            image.width(),
            image.height(),
            inference.top1.label,
            inference.top1.confidence,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(inference)
    }

    fn class_count(&self) -> usize {
        self.labels.len()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::path::PathBuf;

    #[test]
    fn test_transform_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 60, Rgb([255, 0, 0]));
        let input = transform_image(&DecodedImage::new(img), 224);

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        assert_eq!(input[[0, 0, 112, 112]], 1.0);
        assert_eq!(input[[0, 1, 112, 112]], 0.0);
        assert_eq!(input[[0, 2, 0, 0]], 0.0);
    }

    #[test]
    fn test_transform_single_pixel_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(1, 1, Rgb([0, 0, 255]));
        let input = transform_image(&DecodedImage::new(img), 32);

        assert_eq!(input.shape(), &[1, 3, 32, 32]);
        assert_eq!(input[[0, 2, 31, 31]], 1.0);
    }

    #[test]
    fn test_new_fails_without_model_file() {
        let model_config = ModelConfig {
            model_dir: PathBuf::from("./missing_model_dir"),
            onnx_file: "classifier.onnx".to_string(),
            labels_file: "labels.txt".to_string(),
            num_instances: 1,
            input_size: 224,
            output_name: "output0".to_string(),
            apply_softmax: false,
        };

        let err = OrtModelService::new(&model_config).err().unwrap();
        assert!(matches!(err, ModelError::Load(_)));
    }
}
