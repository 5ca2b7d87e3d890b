use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::{export_games, import_games, sample_slate, ExportFile, PickStore};
use crate::models::{BoardError, Game, GamePayload, Prediction, PredictionPayload};
use crate::services::board::Board;
use crate::services::normalizer::normalize_games;

/// Result of a mutation that was applied in memory. `storage_warning` is set
/// when the follow-up save failed; the in-memory change stays.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub storage_warning: Option<String>,
}

/// Lets exactly one import be in flight at a time.
#[derive(Debug, Clone, Default)]
pub struct ImportGate {
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct ImportPermit {
    busy: Arc<AtomicBool>,
}

impl ImportGate {
    pub fn try_begin(&self) -> Result<ImportPermit, BoardError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BoardError::ImportInProgress)?;
        Ok(ImportPermit {
            busy: Arc::clone(&self.busy),
        })
    }
}

impl Drop for ImportPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Board plus its backing store: every mutation is followed by a save.
pub struct Tracker {
    board: Board,
    store: PickStore,
    imports: ImportGate,
}

impl Tracker {
    /// Load the stored board, or the sample slate when nothing usable is stored.
    /// Hydrating never writes.
    pub async fn hydrate(store: PickStore) -> Self {
        let games = match store.load_raw().await {
            Some(raw) => normalize_games(&raw),
            None => {
                tracing::info!("No stored board found, starting from the sample slate");
                sample_slate()
            }
        };
        tracing::info!("Board hydrated with {} games", games.len());

        Self {
            board: Board::new(games),
            store,
            imports: ImportGate::default(),
        }
    }

    pub fn games(&self) -> &[Game] {
        self.board.games()
    }

    pub fn find_game(&self, game_id: &str) -> Option<&Game> {
        self.board.find_game(game_id)
    }

    pub fn import_gate(&self) -> ImportGate {
        self.imports.clone()
    }

    async fn persist(&self) -> Option<String> {
        match self.store.save(self.board.games()).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Board changed but could not be saved: {}", e);
                Some(format!("Changes are kept for this session but were not saved: {}", e))
            }
        }
    }

    async fn applied<T>(&self, value: T) -> Applied<T> {
        Applied {
            value,
            storage_warning: self.persist().await,
        }
    }

    pub async fn save_game(&mut self, payload: GamePayload) -> Result<Applied<Game>, BoardError> {
        let game = self.board.upsert_game(payload)?.clone();
        tracing::info!("Saved game {} ({} @ {})", game.id, game.away_team, game.home_team);
        Ok(self.applied(game).await)
    }

    pub async fn save_prediction(
        &mut self,
        game_id: &str,
        payload: PredictionPayload,
    ) -> Result<Applied<Prediction>, BoardError> {
        let prediction = self.board.upsert_prediction(game_id, payload)?.clone();
        tracing::info!("Saved prediction {} on game {}", prediction.id, game_id);
        Ok(self.applied(prediction).await)
    }

    /// Unknown ids are a silent no-op and skip the save.
    pub async fn remove_game(&mut self, game_id: &str) -> Applied<bool> {
        if !self.board.delete_game(game_id) {
            return Applied { value: false, storage_warning: None };
        }
        tracing::info!("Deleted game {}", game_id);
        self.applied(true).await
    }

    pub async fn remove_prediction(&mut self, game_id: &str, prediction_id: &str) -> Applied<bool> {
        if !self.board.delete_prediction(game_id, prediction_id) {
            return Applied { value: false, storage_warning: None };
        }
        tracing::info!("Deleted prediction {} from game {}", prediction_id, game_id);
        self.applied(true).await
    }

    pub async fn reset_to_sample(&mut self) -> Applied<usize> {
        self.board.replace_all(sample_slate());
        tracing::info!("Board reset to the sample slate");
        self.applied(self.board.games().len()).await
    }

    /// Replace the board with the contents of an export file. `read` produces
    /// the file text; a malformed file leaves the board untouched.
    pub async fn import<F, E>(&mut self, read: F) -> Result<Applied<usize>, BoardError>
    where
        F: Future<Output = Result<String, E>>,
        E: std::fmt::Display,
    {
        let permit = self.imports.try_begin()?;
        let contents = read
            .await
            .map_err(|e| BoardError::Format(format!("Could not read import: {}", e)))?;
        self.apply_import(permit, &contents).await
    }

    /// Second half of an import whose contents were read while `_permit` was held.
    pub async fn apply_import(
        &mut self,
        _permit: ImportPermit,
        contents: &str,
    ) -> Result<Applied<usize>, BoardError> {
        let games = import_games(contents)?;

        self.board.replace_all(games);
        tracing::info!("Imported {} games", self.board.games().len());
        Ok(self.applied(self.board.games().len()).await)
    }

    pub fn export(&self, date: NaiveDate) -> Result<ExportFile, BoardError> {
        export_games(self.board.games(), date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, MemoryStore, DEFAULT_STORAGE_KEY};
    use std::convert::Infallible;

    fn picks(kv: &MemoryStore) -> PickStore {
        PickStore::new(Arc::new(kv.clone()), DEFAULT_STORAGE_KEY)
    }

    fn matchup(home: &str, away: &str) -> GamePayload {
        GamePayload {
            home_team: home.to_string(),
            away_team: away.to_string(),
            ..Default::default()
        }
    }

    async fn ready(contents: &str) -> Result<String, Infallible> {
        Ok(contents.to_string())
    }

    #[tokio::test]
    async fn test_hydrate_falls_back_to_sample_without_writing() {
        let kv = MemoryStore::new();
        let tracker = Tracker::hydrate(picks(&kv)).await;
        assert_eq!(tracker.games().len(), 3);
        assert_eq!(kv.get(DEFAULT_STORAGE_KEY).await.unwrap(), None);

        kv.set(DEFAULT_STORAGE_KEY, "corrupt{").await.unwrap();
        let tracker = Tracker::hydrate(picks(&kv)).await;
        assert_eq!(tracker.games().len(), 3);
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let game = tracker.save_game(matchup("Bills", "Jets")).await.unwrap();
        assert_eq!(game.storage_warning, None);

        let reloaded = Tracker::hydrate(picks(&kv)).await;
        assert_eq!(reloaded.games().len(), 4);
        assert_eq!(reloaded.games(), tracker.games());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_save() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        assert!(tracker.save_game(matchup("", "Jets")).await.is_err());
        assert_eq!(kv.get(DEFAULT_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_storage_failure_is_a_warning_and_keeps_state() {
        let kv = MemoryStore::with_quota(8);
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let applied = tracker.save_game(matchup("Bills", "Jets")).await.unwrap();
        assert!(applied.storage_warning.is_some());
        assert_eq!(tracker.games().len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_deletes_are_silent() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        assert!(!tracker.remove_game("nope").await.value);
        assert!(!tracker.remove_prediction("nope", "nope").await.value);
        assert_eq!(kv.get(DEFAULT_STORAGE_KEY).await.unwrap(), None);

        let game_id = tracker.games()[0].id.clone();
        assert!(tracker.remove_game(&game_id).await.value);
        assert_eq!(tracker.games().len(), 2);
    }

    #[tokio::test]
    async fn test_import_replaces_board_and_bad_import_changes_nothing() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let before = tracker.games().to_vec();

        let err = tracker.import(ready(r#"{"games": 3}"#)).await.unwrap_err();
        assert!(matches!(err, BoardError::Format(_)));
        assert_eq!(tracker.games(), before.as_slice());

        let applied = tracker
            .import(ready(r#"{"games": [{"id": "g", "homeTeam": "Bills", "awayTeam": "Jets"}]}"#))
            .await
            .unwrap();
        assert_eq!(applied.value, 1);
        assert_eq!(tracker.games()[0].id, "g");
    }

    #[tokio::test]
    async fn test_import_read_failure_is_format_error() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let err = tracker
            .import(async { Err::<String, _>("disk unplugged") })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Format(_)));
        assert_eq!(tracker.games().len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_import_is_rejected() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let held = tracker.import_gate().try_begin().unwrap();

        let err = tracker.import(ready(r#"{"games": []}"#)).await.unwrap_err();
        assert_eq!(err, BoardError::ImportInProgress);

        drop(held);
        assert!(tracker.import(ready(r#"{"games": []}"#)).await.is_ok());
        assert!(tracker.games().is_empty());
    }

    #[tokio::test]
    async fn test_reset_and_export_round_trip() {
        let kv = MemoryStore::new();
        let mut tracker = Tracker::hydrate(picks(&kv)).await;
        let first = tracker.games()[0].id.clone();
        tracker.remove_game(&first).await;
        assert_eq!(tracker.reset_to_sample().await.value, 3);

        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let export = tracker.export(date).unwrap();
        let original = tracker.games().to_vec();
        tracker.import(ready(&export.contents)).await.unwrap();
        assert_eq!(tracker.games(), original.as_slice());
        assert_eq!(tracker.export(date).unwrap(), export);
    }
}
