use base64::{engine::general_purpose::STANDARD, Engine};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not a recognizable image: {0}")]
    Image(#[from] image::ImageError),
}

/// An RGB pixel buffer decoded from a request payload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn channels(&self) -> u32 {
        3
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> [u32; 3] {
        [self.height(), self.width(), self.channels()]
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Keeps the segment after the data-URL header, up to any further comma.
fn strip_data_url(payload: &str) -> &str {
    match payload.split(',').nth(1) {
        Some(data) => data,
        None => payload,
    }
}

pub fn decode(payload: &str) -> Result<DecodedImage, DecodeError> {
    let encoded: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let image_bytes = STANDARD.decode(encoded)?;
    let image = image::load_from_memory(&image_bytes)?;

    Ok(DecodedImage::new(image.to_rgb8()))
}
