//! Single entry point for dynamically-shaped records coming from storage or an
//! import file. Nothing past this module sees a `serde_json::Value`.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{Game, Prediction};

pub const HOME_PLACEHOLDER: &str = "Home";
pub const AWAY_PLACEHOLDER: &str = "Away";

/// Practically unique identifier for games and predictions.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sanitize a raw game collection into typed games.
pub fn normalize_games(raw: &[Value]) -> Vec<Game> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| match value.as_object() {
            Some(record) => Some(normalize_game(record)),
            None => {
                tracing::warn!("Skipping game entry {} that is not an object", index);
                None
            }
        })
        .collect()
}

/// Run typed games back through the normalizer.
#[cfg(test)]
pub fn renormalize(games: &[Game]) -> Vec<Game> {
    let raw: Vec<Value> = games
        .iter()
        .filter_map(|game| serde_json::to_value(game).ok())
        .collect();
    normalize_games(&raw)
}

fn normalize_game(record: &Map<String, Value>) -> Game {
    let predictions = match record.get("predictions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().map(normalize_prediction))
            .collect(),
        _ => Vec::new(),
    };

    Game {
        id: identifier(record.get("id")),
        home_team: text(record.get("homeTeam")).unwrap_or_else(|| HOME_PLACEHOLDER.to_string()),
        away_team: text(record.get("awayTeam")).unwrap_or_else(|| AWAY_PLACEHOLDER.to_string()),
        kickoff: text(record.get("kickoff")),
        location: text(record.get("location")),
        tags: tags(record.get("tags")),
        notes: text(record.get("notes")),
        predictions,
    }
}

fn normalize_prediction(record: &Map<String, Value>) -> Prediction {
    Prediction {
        id: identifier(record.get("id")),
        source: text(record.get("source")).unwrap_or_default(),
        market: text(record.get("market")).unwrap_or_default(),
        pick: text(record.get("pick")).unwrap_or_default(),
        line: text(record.get("line")),
        confidence: parse_confidence(record.get("confidence")),
        notes: text(record.get("notes")),
        link: text(record.get("link")),
    }
}

fn identifier(value: Option<&Value>) -> String {
    text(value).unwrap_or_else(generate_id)
}

/// Trimmed text for scalar values; blank strings, null and containers are absent.
fn text(value: Option<&Value>) -> Option<String> {
    let rendered = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

fn tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Permissive confidence parsing. Anything unusable is "no confidence",
/// never zero.
pub fn parse_confidence(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Null => return None,
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Array(_) | Value::Object(_) => return None,
    };
    parsed.is_finite().then_some(parsed)
}
