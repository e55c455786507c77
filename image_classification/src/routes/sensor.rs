use crate::{model_service::ModelService, sensor::SensorReading, server::SharedState};
use axum::{extract::State, response::Json};
use serde_json::{json, Map, Value};

fn sensor_response(reading: Option<SensorReading>, failure_message: &str) -> Json<Value> {
    match reading {
        Some(reading) => {
            let mut data = Map::new();
            data.insert(reading.measurement.key().to_string(), json!(reading.value));
            data.insert("timestamp".to_string(), json!(reading.timestamp));
            data.insert("sensorId".to_string(), json!(reading.sensor_id));
            data.insert("unit".to_string(), json!(reading.unit));

            Json(json!({ "status": "success", "data": data }))
        }
        None => Json(json!({
            "status": "error",
            "message": failure_message,
            "data": null,
        })),
    }
}

pub async fn temperature<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Value> {
    let reading = state.sensor_service.temperature().await;
    sensor_response(reading, "Failed to read temperature from sensor")
}

pub async fn humidity<M: ModelService>(State(state): State<SharedState<M>>) -> Json<Value> {
    let reading = state.sensor_service.humidity().await;
    sensor_response(reading, "Failed to read humidity from sensor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Measurement;

    #[test]
    fn test_success_response_uses_measurement_key() {
        let reading = SensorReading {
            measurement: Measurement::Humidity,
            value: 48.2,
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            sensor_id: "DHT22_SENSOR_01".to_string(),
            unit: "%",
        };

        let Json(body) = sensor_response(Some(reading), "unused");
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["humidity"], 48.2);
        assert_eq!(body["data"]["sensorId"], "DHT22_SENSOR_01");
        assert_eq!(body["data"]["unit"], "%");
    }

    #[test]
    fn test_failure_response() {
        let Json(body) = sensor_response(None, "Failed to read temperature from sensor");
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Failed to read temperature from sensor");
        assert!(body["data"].is_null());
    }
}
