//! DHT22 readings through the kernel IIO interface (`dht11` driver).
//!
//! The driver reports millidegrees Celsius in `in_temp_input` and milli-percent
//! relative humidity in `in_humidityrelative_input`. Reads fail with EIO
//! whenever the sensor misses its timing window, so every read is retried.

use crate::config::SensorConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::instrument;

const TEMPERATURE_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to read sensor file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid sensor value {value:?} in {path:?}")]
    Parse { path: PathBuf, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Temperature,
    Humidity,
}

impl Measurement {
    fn file_name(&self) -> &'static str {
        match self {
            Measurement::Temperature => TEMPERATURE_FILE,
            Measurement::Humidity => HUMIDITY_FILE,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Humidity => "humidity",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Measurement::Temperature => "°C",
            Measurement::Humidity => "%",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorReading {
    pub measurement: Measurement,
    pub value: f64,
    pub timestamp: String,
    pub sensor_id: String,
    pub unit: &'static str,
}

pub struct SensorService {
    device_dir: PathBuf,
    sensor_id: String,
    read_retries: u32,
    retry_delay: Duration,
}

impl SensorService {
    pub fn new(sensor_config: &SensorConfig) -> Self {
        Self {
            device_dir: sensor_config.device_dir.clone(),
            sensor_id: sensor_config.sensor_id.clone(),
            read_retries: sensor_config.read_retries,
            retry_delay: Duration::from_millis(sensor_config.retry_delay_ms),
        }
    }

    pub async fn temperature(&self) -> Option<SensorReading> {
        self.read(Measurement::Temperature).await
    }

    pub async fn humidity(&self) -> Option<SensorReading> {
        self.read(Measurement::Humidity).await
    }

    #[instrument(skip(self))]
    pub async fn read(&self, measurement: Measurement) -> Option<SensorReading> {
        let path = self.device_dir.join(measurement.file_name());
        let attempts = self.read_retries + 1;

        for attempt in 1..=attempts {
            match read_milli_value(&path).await {
                Ok(value) => {
                    return Some(SensorReading {
                        measurement,
                        value,
                        timestamp: chrono::Local::now().to_rfc3339(),
                        sensor_id: self.sensor_id.clone(),
                        unit: measurement.unit(),
                    })
                }
                Err(e) => {
                    tracing::warn!("Sensor read attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!("Giving up on {} after {} attempts", measurement.key(), attempts);
        None
    }
}

/// Reads a milli-unit integer and returns it in whole units, rounded to 1 decimal.
async fn read_milli_value(path: &Path) -> Result<f64, SensorError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SensorError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let milli: i64 = raw.trim().parse().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: raw.trim().to_string(),
    })?;

    Ok((milli as f64 / 100.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "image_classification_sensor_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sensor_service(dir: &Path) -> SensorService {
        SensorService::new(&SensorConfig {
            device_dir: dir.to_path_buf(),
            sensor_id: "DHT22_TEST".to_string(),
            read_retries: 1,
            retry_delay_ms: 1,
        })
    }

    #[tokio::test]
    async fn test_reads_temperature_and_humidity() {
        let dir = device_dir("ok");
        std::fs::write(dir.join(TEMPERATURE_FILE), "23460\n").unwrap();
        std::fs::write(dir.join(HUMIDITY_FILE), "51840\n").unwrap();

        let service = sensor_service(&dir);

        let temperature = service.temperature().await.unwrap();
        assert_eq!(temperature.value, 23.5);
        assert_eq!(temperature.unit, "°C");
        assert_eq!(temperature.sensor_id, "DHT22_TEST");

        let humidity = service.humidity().await.unwrap();
        assert_eq!(humidity.value, 51.8);
        assert_eq!(humidity.unit, "%");
        assert_eq!(humidity.measurement, Measurement::Humidity);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_device_returns_none() {
        let service = sensor_service(Path::new("/definitely/not/a/sensor"));

        assert!(service.temperature().await.is_none());
        assert!(service.humidity().await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_value_returns_none() {
        let dir = device_dir("garbage");
        std::fs::write(dir.join(TEMPERATURE_FILE), "n/a").unwrap();

        assert!(sensor_service(&dir).temperature().await.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_negative_temperature() {
        let dir = device_dir("negative");
        std::fs::write(dir.join(TEMPERATURE_FILE), "-4250").unwrap();

        let reading = sensor_service(&dir).temperature().await.unwrap();
        assert_eq!(reading.value, -4.3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
