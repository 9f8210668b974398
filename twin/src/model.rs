use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One timestamped sensor sample for a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub machine_id: String,
    pub temperature: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub power_consumption: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Numeric columns fed to the anomaly model, in a fixed order.
    pub fn features(&self) -> [f64; 4] {
        [
            self.temperature,
            self.pressure,
            self.vibration,
            self.power_consumption,
        ]
    }
}

/// Body of `POST /update_state`: a reading before it is timestamped.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "machine_id": "robot_001",
    "temperature": 75.5,
    "pressure": 100.2,
    "vibration": 0.5,
    "power_consumption": 150.0
}))]
pub struct ReadingUpdate {
    /// Unique machine identifier
    #[schema(min_length = 1, max_length = 50)]
    pub machine_id: String,
    /// Temperature in Celsius
    #[schema(minimum = 0.0, maximum = 150.0)]
    pub temperature: f64,
    /// Pressure in PSI
    #[schema(minimum = 0.0, maximum = 1000.0)]
    pub pressure: f64,
    /// Vibration amplitude
    #[schema(minimum = 0.0, maximum = 10.0)]
    pub vibration: f64,
    /// Power consumption in watts
    #[schema(minimum = 0.0)]
    pub power_consumption: f64,
}

/// Durable row in `machine_readings`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PersistedReading {
    pub id: String,
    pub machine_id: String,
    pub temperature: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub power_consumption: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MaintenanceResponse {
    pub machine_id: String,
    pub maintenance_needed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub machine_id: String,
    pub data_points: usize,
    pub history: Vec<Reading>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MachinesResponse {
    pub machines: Vec<String>,
    pub total_count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub status: String,
    pub title: String,
    pub version: String,
    pub documentation: String,
    pub available_endpoints: Vec<String>,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Offending request field, for validation errors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
