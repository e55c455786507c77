use crate::{
    config::{Config, ModelConfig},
    ort_service::OrtModelService,
    prediction::PredictionService,
    sensor::SensorService,
    server::{build_router, HttpServer, SharedState},
    telemetry::Metrics,
};
use tokio::signal;

/// Loads the model once. A failed load leaves the prediction routes unavailable
/// for the lifetime of the process.
fn load_prediction_service(
    model_config: &ModelConfig,
) -> Option<PredictionService<OrtModelService>> {
    let model_path = model_config.get_path();
    tracing::info!(
        model_path = ?model_path,
        model_exists = model_path.exists(),
        model_size_mb = ?model_config.get_size_mb(),
        "Image Classification API starting"
    );

    match OrtModelService::new(model_config) {
        Ok(model_service) => {
            tracing::info!("Model loaded successfully: {:?}", model_path);
            Some(PredictionService::new(model_service))
        }
        Err(e) => {
            tracing::error!("Failed to initialize prediction service: {}", e);
            None
        }
    }
}

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let prediction_service = load_prediction_service(&config.model);
    let sensor_service = SensorService::new(&config.sensor);
    let metrics = Metrics::new()?;

    let state = SharedState::new(
        prediction_service,
        config.model.clone(),
        sensor_service,
        metrics,
    );
    let router = build_router(state, &config.server);

    let server = HttpServer::new(router, &config.server).await?;
    server.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
