use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::{collections::HashSet, sync::Arc, time::Instant};

pub struct Metrics {
    http_requests: IntCounterVec,
    http_request_duration: HistogramVec,
    prediction_duration: HistogramVec,
    images_processed: IntCounterVec,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "route", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_ms",
                "Duration of HTTP requests in milliseconds",
            )
            .buckets(latency_buckets((5, 50, 200, 1000, 5000))),
            &["method", "route"],
        )?;

        let prediction_duration = HistogramVec::new(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of prediction requests in milliseconds",
            )
            .buckets(latency_buckets((5, 50, 200, 1000, 5000))),
            &["route"],
        )?;

        let images_processed = IntCounterVec::new(
            Opts::new("images_processed_total", "Images run through the classifier"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;
        registry.register(Box::new(images_processed.clone()))?;

        Ok(Metrics {
            http_requests,
            http_request_duration,
            prediction_duration,
            images_processed,
            registry,
        })
    }

    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_ms: f64) {
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, route, status.as_str()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, route])
            .observe(duration_ms);
    }

    pub fn record_prediction_duration(&self, duration_ms: f64, route: &str) {
        self.prediction_duration
            .with_label_values(&[route])
            .observe(duration_ms);
    }

    pub fn record_images(&self, successful: usize, failed: usize) {
        self.images_processed
            .with_label_values(&["success"])
            .inc_by(successful as u64);
        self.images_processed
            .with_label_values(&["failure"])
            .inc_by(failed as u64);
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counts every routed request by its matched route template.
pub async fn track_http_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    metrics.record_http_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0,
    );
    response
}

/// Fine-grained buckets for fast predictions, coarser ones for slow batches.
fn latency_buckets(parts: (u32, u32, u32, u32, u32)) -> Vec<f64> {
    let fine_step: usize = 5;
    let middle_step: usize = 25;
    let coarse_step: usize = 200;
    let tail_step: usize = 1000;
    let fine = (parts.0..=parts.1).step_by(fine_step);
    let middle = (parts.1..=parts.2).step_by(middle_step);
    let coarse = (parts.2..=parts.3).step_by(coarse_step);
    let tail = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    fine.chain(middle)
        .chain(coarse)
        .chain(tail)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
