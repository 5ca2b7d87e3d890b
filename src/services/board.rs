use crate::models::{BoardError, Game, GamePayload, Prediction, PredictionPayload};
use crate::services::normalizer::generate_id;

/// Owns the canonical game collection. Every mutation goes through here.
#[derive(Debug, Clone, Default)]
pub struct Board {
    games: Vec<Game>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn given_id(id: Option<String>) -> String {
    trimmed(id).unwrap_or_else(generate_id)
}

impl Board {
    pub fn new(games: Vec<Game>) -> Self {
        Self { games }
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn find_game(&self, game_id: &str) -> Option<&Game> {
        self.games.iter().find(|game| game.id == game_id)
    }

    /// Create a game or replace an existing one's fields. An existing game
    /// keeps its predictions.
    pub fn upsert_game(&mut self, payload: GamePayload) -> Result<&Game, BoardError> {
        let home_team = payload.home_team.trim().to_string();
        let away_team = payload.away_team.trim().to_string();
        if home_team.is_empty() || away_team.is_empty() {
            return Err(BoardError::Validation("Home and away teams are required.".to_string()));
        }

        let mut game = Game {
            id: given_id(payload.id),
            home_team,
            away_team,
            kickoff: trimmed(payload.kickoff),
            location: trimmed(payload.location),
            tags: payload
                .tags
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            notes: trimmed(payload.notes),
            predictions: Vec::new(),
        };

        let index = match self.games.iter().position(|existing| existing.id == game.id) {
            Some(index) => {
                game.predictions = std::mem::take(&mut self.games[index].predictions);
                self.games[index] = game;
                index
            }
            None => {
                self.games.push(game);
                self.games.len() - 1
            }
        };
        Ok(&self.games[index])
    }

    /// Create a prediction under `game_id` or merge an edit onto an existing one.
    pub fn upsert_prediction(
        &mut self,
        game_id: &str,
        payload: PredictionPayload,
    ) -> Result<&Prediction, BoardError> {
        let game_index = self
            .games
            .iter()
            .position(|game| game.id == game_id)
            .ok_or_else(|| BoardError::NotFound(format!("game {}", game_id)))?;

        let source = payload.source.trim().to_string();
        let pick = payload.pick.trim().to_string();
        if source.is_empty() || pick.is_empty() {
            return Err(BoardError::Validation("Source and pick are required.".to_string()));
        }

        let id = given_id(payload.id);
        let confidence = payload.confidence.map(|c| c.filter(|v| v.is_finite()));
        let predictions = &mut self.games[game_index].predictions;

        let index = match predictions.iter().position(|p| p.id == id) {
            Some(index) => {
                let existing = &mut predictions[index];
                existing.source = source;
                existing.pick = pick;
                if let Some(market) = payload.market {
                    existing.market = market.trim().to_string();
                }
                if let Some(line) = payload.line {
                    existing.line = trimmed(Some(line));
                }
                if let Some(confidence) = confidence {
                    existing.confidence = confidence;
                }
                if let Some(notes) = payload.notes {
                    existing.notes = trimmed(Some(notes));
                }
                if let Some(link) = payload.link {
                    existing.link = trimmed(Some(link));
                }
                index
            }
            None => {
                predictions.push(Prediction {
                    id,
                    source,
                    market: payload.market.map(|m| m.trim().to_string()).unwrap_or_default(),
                    pick,
                    line: trimmed(payload.line),
                    confidence: confidence.flatten(),
                    notes: trimmed(payload.notes),
                    link: trimmed(payload.link),
                });
                predictions.len() - 1
            }
        };
        Ok(&predictions[index])
    }

    /// Remove a game and everything it owns. Returns false when nothing matched.
    pub fn delete_game(&mut self, game_id: &str) -> bool {
        let before = self.games.len();
        self.games.retain(|game| game.id != game_id);
        self.games.len() != before
    }

    pub fn delete_prediction(&mut self, game_id: &str, prediction_id: &str) -> bool {
        let Some(game) = self.games.iter_mut().find(|game| game.id == game_id) else {
            return false;
        };
        let before = game.predictions.len();
        game.predictions.retain(|p| p.id != prediction_id);
        game.predictions.len() != before
    }

    pub fn replace_all(&mut self, games: Vec<Game>) {
        self.games = games;
    }
}
