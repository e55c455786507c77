use crate::{
    config::{ModelConfig, ServerConfig},
    model_service::ModelService,
    prediction::PredictionService,
    routes::{prediction_routes, service_routes, ApiError},
    sensor::SensorService,
    telemetry::{track_http_metrics, Metrics},
};
use axum::{extract::DefaultBodyLimit, http::HeaderValue, middleware, Router};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct SharedState<M: ModelService> {
    pub prediction_service: Option<Arc<PredictionService<M>>>,
    pub model_config: ModelConfig,
    pub sensor_service: Arc<SensorService>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            prediction_service: self.prediction_service.clone(),
            model_config: self.model_config.clone(),
            sensor_service: self.sensor_service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<M: ModelService> SharedState<M> {
    pub fn new(
        prediction_service: Option<PredictionService<M>>,
        model_config: ModelConfig,
        sensor_service: SensorService,
        metrics: Metrics,
    ) -> Self {
        Self {
            prediction_service: prediction_service.map(Arc::new),
            model_config,
            sensor_service: Arc::new(sensor_service),
            metrics: Arc::new(metrics),
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.prediction_service.is_some()
    }

    pub fn prediction_service(&self) -> Result<Arc<PredictionService<M>>, ApiError> {
        self.prediction_service
            .clone()
            .ok_or(ApiError::ServiceUnavailable)
    }
}

fn cors_layer(server_config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server_config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

pub fn build_router<M: ModelService>(
    state: SharedState<M>,
    server_config: &ServerConfig,
) -> Router {
    let api_routes = match server_config.get_api_prefix() {
        Some(prefix) => Router::new().nest(&prefix, prediction_routes::<M>()),
        None => prediction_routes::<M>(),
    };

    let metrics = state.metrics.clone();

    api_routes
        .merge(service_routes::<M>())
        .route_layer(middleware::from_fn_with_state(metrics, track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(server_config.max_body_bytes))
        .layer(cors_layer(server_config))
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(router: Router, server_config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(server_config.get_address()).await?;
        Ok(Self { router, listener })
    }

    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}
