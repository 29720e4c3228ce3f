use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Three-way bucket derived from the stacked confidence score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScreeningResponse {
    pub filename: String,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceState {
    Ready,
    Degraded,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: ServiceState,
    pub models_loaded: bool,
    pub version: String,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
