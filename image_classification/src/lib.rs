mod labels;
mod ort_service;
mod routes;

pub mod app;
pub mod config;
pub mod decoder;
pub mod model_service;
pub mod prediction;
pub mod sensor;
pub mod server;
pub mod telemetry;

pub use app::start_app;
pub use ort_service::OrtModelService;
pub use routes::{ApiError, Envelope};
