use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub market: String, // free text, empty when unspecified
    pub pick: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>, // always finite when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Create-or-edit request for a game. Predictions are never part of the payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePayload {
    pub id: Option<String>,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    pub kickoff: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

/// Create-or-edit request for a prediction.
///
/// On edit, `None` keeps the stored value. `Some("")` clears optional text and
/// `confidence: Some(None)` (JSON `null`) clears the confidence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPayload {
    pub id: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub pick: String,
    pub market: Option<String>,
    pub line: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub confidence: Option<Option<f64>>,
    pub notes: Option<String>,
    pub link: Option<String>,
}

/// Distinguishes a missing field (outer `None`, via `#[serde(default)]`) from an explicit `null`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketMeta {
    pub icon: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusSummary {
    pub pick: String,
    pub count: usize,
    pub total: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketShare {
    pub market: String,
    pub icon: &'static str,
    pub count: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusLeader {
    pub game_id: String,
    pub matchup: String,
    pub summary: ConsensusSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceLeader {
    pub game_id: String,
    pub prediction_id: String,
    pub matchup: String,
    pub source: String,
    pub market: String,
    pub icon: &'static str,
    pub pick: String,
    pub line: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarySegment {
    pub pick: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketGroup {
    pub market: String,
    pub meta: MarketMeta,
    pub predictions: Vec<Prediction>,
    pub summary_bar: Vec<SummarySegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameView {
    pub game: Game,
    pub consensus: Option<ConsensusSummary>,
    pub markets: Vec<MarketGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    pub games_tracked: usize,
    pub picks_logged: usize,
    pub high_confidence: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub stats: BoardStats,
    pub market_breakdown: Option<Vec<MarketShare>>,
    pub consensus_leaders: Vec<ConsensusLeader>,
    pub confidence_leaders: Vec<ConfidenceLeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Another import is still in progress")]
    ImportInProgress,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warning: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            warning: None,
            timestamp: Utc::now(),
        }
    }
}
