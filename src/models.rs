// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use serde_derive::Deserialize;
use serde_derive::Serialize;

/// WGS 84 point, degrees. Station files store `[longitude, latitude]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Coordinate {
            longitude: pair[0],
            latitude: pair[1],
        }
    }
}

/// One scheduled call on a train's route, exactly as the schedule JSON
/// carries it. Clock strings are `"H:MM AM/PM"`, optionally suffixed
/// `" BST"`, or `"---"` when the train does not call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteStop {
    pub city: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub halt: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TrainData {
    #[serde(default)]
    pub train_name: String,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteStop>,
}

/// A whole schedule file. The wrapper object mirrors the scraped JSON.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ScheduleFile {
    #[serde(default)]
    pub data: TrainData,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Completed,
    Current,
    Next,
    Upcoming,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Cloudy,
    Rainy,
    Stormy,
    Foggy,
}

impl Weather {
    pub fn delay_factor(&self) -> f64 {
        match self {
            Weather::Clear => 1.0,
            Weather::Cloudy => 1.2,
            Weather::Rainy => 1.5,
            Weather::Stormy => 2.0,
            Weather::Foggy => 1.8,
        }
    }
}

/// Platform-crowding guess for one station call, from the schedule-time
/// heuristic. Distinct from [`CrowdLevel`], which counts real users.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationCrowd {
    Low,
    Normal,
    Medium,
    High,
}

/// On-board crowd level derived from active user confirmations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    High,
    Medium,
    Low,
}

/// Where a train is right now, inferred from the schedule clock scan.
#[derive(Clone, Debug, Serialize)]
pub struct PositionSnapshot {
    pub current_station_idx: usize,
    pub current_station: String,
    pub next_station: Option<String>,
    pub progress_percentage: f64,
    pub distance_covered: f64,
    pub distance_to_next: f64,
    pub eta_to_next: Option<String>,
    pub total_stations: usize,
    pub current_time: String,
}

/// The multipliers that went into one synthesized delay, reported back
/// for observability.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct DelayFactors {
    pub weather: f64,
    pub time_of_day: f64,
    pub day_of_week: f64,
    pub station: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulatedDelay {
    pub delay_minutes: i64,
    pub scheduled_time: String,
    pub actual_time: String,
    pub weather_condition: Weather,
    pub factors_applied: DelayFactors,
}

#[derive(Clone, Debug, Serialize, Default, PartialEq, Eq)]
pub struct DelayDistribution {
    #[serde(rename = "0-15 min")]
    pub zero_to_fifteen: usize,
    #[serde(rename = "16-30 min")]
    pub sixteen_to_thirty: usize,
    #[serde(rename = "31-60 min")]
    pub thirtyone_to_sixty: usize,
    #[serde(rename = "60+ min")]
    pub over_sixty: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DelayStats {
    pub total_delays: usize,
    pub average_delay: f64,
    pub max_delay: i64,
    pub min_delay: i64,
    pub delay_distribution: DelayDistribution,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PredictionFactors {
    pub time_of_day: f64,
    pub day_of_week: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DelayPrediction {
    pub delay_probability: f64,
    pub confidence: Confidence,
    pub historical_data_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors_applied: Option<PredictionFactors>,
}

/// Per-station row of the assembled timeline. Derived per request,
/// never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct StationStatus {
    pub station_name: String,
    pub status: StopStatus,
    pub scheduled_arrival: Option<String>,
    pub scheduled_departure: Option<String>,
    pub actual_arrival: Option<String>,
    pub actual_departure: Option<String>,
    pub delay_minutes: i64,
    pub halt_duration: String,
    pub duration: String,
    pub distance_from_start: f64,
    pub weather_condition: Weather,
    pub crowd_level: StationCrowd,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrowdAttachment {
    pub confidence: Confidence,
    pub active_users: usize,
    pub crowd_level: CrowdLevel,
    pub last_updated: Option<String>,
}

/// The merged per-train status report served to the client.
#[derive(Clone, Debug, Serialize)]
pub struct TrainStatusReport {
    pub train_number: String,
    pub train_name: String,
    pub station_statuses: Vec<StationStatus>,
    pub current_speed: f64,
    pub distance_covered: f64,
    pub distance_to_next: f64,
    pub delay_minutes: i64,
    pub estimated_arrival: Option<String>,
    pub progress_percentage: f64,
    pub current_station: Option<String>,
    pub next_station: Option<String>,
    pub weather_condition: Weather,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd_validation: Option<CrowdAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_adjusted_by_crowd: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd_eta_confidence: Option<Confidence>,
}

/// One "I am on this train" report. Timestamps are local ISO 8601
/// strings so the persisted file stays human-editable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Confirmation {
    pub user_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
}

/// Persisted per-train bucket of confirmations.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TrainValidations {
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_confirmations: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrowdData {
    pub train_number: String,
    pub total_confirmations: usize,
    pub active_confirmations: usize,
    pub crowd_level: CrowdLevel,
    pub last_updated: Option<String>,
    pub confirmations: Vec<Confirmation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrowdMetrics {
    pub crowd_level: CrowdLevel,
    pub confidence: Confidence,
    pub active_users: usize,
    pub average_time_since_confirmation: String,
    pub data_freshness: Freshness,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfirmationReceipt {
    pub message: &'static str,
    pub train_number: String,
    pub user_id: String,
    pub timestamp: String,
    pub crowd_metrics: CrowdMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidationSummary {
    pub total_confirmations: usize,
    pub active_confirmations: usize,
    pub crowd_level: CrowdLevel,
    pub last_updated: Option<String>,
}
