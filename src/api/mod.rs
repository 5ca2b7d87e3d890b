use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::{open_tracker, Settings};
use crate::models::{
    ApiResponse, BoardError, BoardSnapshot, Game, GamePayload, GameView, Prediction, PredictionPayload,
};
use crate::services::{filter_game, game_view, search_needle, snapshot, Applied, ImportGate, Tracker};

const IMPORT_BODY_LIMIT: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    tracker: Arc<Mutex<Tracker>>,
    imports: ImportGate,
}

impl AppState {
    pub fn new(tracker: Tracker) -> Self {
        let imports = tracker.import_gate();
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            imports,
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn status_for(error: &BoardError) -> StatusCode {
    match error {
        BoardError::Validation(_) => StatusCode::BAD_REQUEST,
        BoardError::NotFound(_) => StatusCode::NOT_FOUND,
        BoardError::Format(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BoardError::ImportInProgress => StatusCode::CONFLICT,
        BoardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: BoardError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::warn!("Request rejected: {}", error);
    }
    (status, Json(ApiResponse::error(error.to_string())))
}

/// Malformed or mistyped request bodies get the same envelope as every other failure.
fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| reject(BoardError::Validation(e.body_text())))
}

fn applied<T>(applied: Applied<T>) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(applied.value).with_warning(applied.storage_warning))
}

pub async fn serve(port: u16, settings: &Settings) -> anyhow::Result<()> {
    let tracker = open_tracker(settings).await?;
    let app = create_router().with_state(AppState::new(tracker));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Pickboard API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/games", get(list_games_handler).post(save_game_handler))
        .route("/games/{id}", get(get_game_handler).delete(delete_game_handler))
        .route("/games/{id}/predictions", post(save_prediction_handler))
        .route("/games/{id}/predictions/{prediction_id}", delete(delete_prediction_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/board/reset", post(reset_handler))
        .route("/board/export", get(export_handler))
        .route("/board/import", post(import_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("Pickboard API is running"))
}

// GET /games?q= - Game cards that match the search text
#[derive(Deserialize)]
struct GamesQuery {
    q: Option<String>,
}

async fn list_games_handler(
    State(state): State<AppState>,
    Query(params): Query<GamesQuery>,
) -> Json<ApiResponse<Vec<GameView>>> {
    let needle = params.q.as_deref().map(search_needle).unwrap_or_default();
    let tracker = state.tracker.lock().await;
    let views = tracker
        .games()
        .iter()
        .filter(|game| filter_game(game, &needle))
        .map(game_view)
        .collect();
    Json(ApiResponse::success(views))
}

async fn get_game_handler(State(state): State<AppState>, Path(game_id): Path<String>) -> ApiResult<GameView> {
    let tracker = state.tracker.lock().await;
    tracker
        .find_game(&game_id)
        .map(|game| Json(ApiResponse::success(game_view(game))))
        .ok_or_else(|| reject(BoardError::NotFound(format!("game {}", game_id))))
}

// GET /snapshot - Board-wide stats and leaderboards
async fn snapshot_handler(State(state): State<AppState>) -> Json<ApiResponse<BoardSnapshot>> {
    let tracker = state.tracker.lock().await;
    Json(ApiResponse::success(snapshot(tracker.games())))
}

// POST /games - Create or edit a game
async fn save_game_handler(
    State(state): State<AppState>,
    body: Result<Json<GamePayload>, JsonRejection>,
) -> ApiResult<Game> {
    let game = payload(body)?;
    let mut tracker = state.tracker.lock().await;
    tracker.save_game(game).await.map(applied).map_err(reject)
}

async fn delete_game_handler(State(state): State<AppState>, Path(game_id): Path<String>) -> Json<ApiResponse<bool>> {
    let mut tracker = state.tracker.lock().await;
    applied(tracker.remove_game(&game_id).await)
}

// POST /games/{id}/predictions - Create or edit a pick on a game
async fn save_prediction_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    body: Result<Json<PredictionPayload>, JsonRejection>,
) -> ApiResult<Prediction> {
    let prediction = payload(body)?;
    let mut tracker = state.tracker.lock().await;
    tracker
        .save_prediction(&game_id, prediction)
        .await
        .map(applied)
        .map_err(reject)
}

async fn delete_prediction_handler(
    State(state): State<AppState>,
    Path((game_id, prediction_id)): Path<(String, String)>,
) -> Json<ApiResponse<bool>> {
    let mut tracker = state.tracker.lock().await;
    applied(tracker.remove_prediction(&game_id, &prediction_id).await)
}

// POST /board/reset - Replace the board with the sample slate
async fn reset_handler(State(state): State<AppState>) -> Json<ApiResponse<usize>> {
    let mut tracker = state.tracker.lock().await;
    applied(tracker.reset_to_sample().await)
}

// GET /board/export - Download the board as JSON
async fn export_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tracker = state.tracker.lock().await;
    let file = tracker.export(Utc::now().date_naive()).map_err(reject)?;
    let headers = [
        (header::CONTENT_TYPE, "application/json".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.file_name),
        ),
    ];
    Ok((headers, file.contents))
}

// POST /board/import - Replace the board with an uploaded export
async fn import_handler(State(state): State<AppState>, body: Body) -> ApiResult<usize> {
    // Hold the permit across the upload so a second import cannot interleave.
    let permit = state.imports.try_begin().map_err(reject)?;
    let bytes = axum::body::to_bytes(body, IMPORT_BODY_LIMIT)
        .await
        .map_err(|e| reject(BoardError::Format(format!("Could not read import: {}", e))))?;
    let contents = String::from_utf8(bytes.to_vec())
        .map_err(|e| reject(BoardError::Format(format!("Import is not UTF-8: {}", e))))?;

    let mut tracker = state.tracker.lock().await;
    tracker
        .apply_import(permit, &contents)
        .await
        .map(applied)
        .map_err(reject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, MemoryStore, PickStore, DEFAULT_STORAGE_KEY};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app_with(kv: MemoryStore) -> (Router, AppState) {
        let tracker = Tracker::hydrate(PickStore::new(Arc::new(kv), DEFAULT_STORAGE_KEY)).await;
        let state = AppState::new(tracker);
        (create_router().with_state(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(MemoryStore::new()).await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_list_and_search_games() {
        let (app, _) = app_with(MemoryStore::new()).await;
        let (_, body) = send(&app, "GET", "/games", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let (_, body) = send(&app, "GET", "/games?q=%20RAVENS", None).await;
        let games = body["data"].as_array().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0]["game"]["homeTeam"], "Baltimore Ravens");
        assert_eq!(games[0]["markets"][0]["market"], "Spread");
    }

    #[tokio::test]
    async fn test_game_and_prediction_lifecycle() {
        let kv = MemoryStore::new();
        let (app, _) = app_with(kv.clone()).await;

        let (status, body) = send(&app, "POST", "/games", Some(json!({"homeTeam": "Bills", "awayTeam": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) =
            send(&app, "POST", "/games", Some(json!({"homeTeam": "Bills", "awayTeam": "Jets", "tags": ["AFC East"]}))).await;
        assert_eq!(status, StatusCode::OK);
        let game_id = body["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/games/{}/predictions", game_id);
        for pick in ["Bills -6", "Bills -6", "Jets +6"] {
            let (status, _) = send(&app, "POST", &uri, Some(json!({"source": "Desk", "pick": pick, "market": "ats", "confidence": 65}))).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, "GET", &format!("/games/{}", game_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["consensus"]["pick"], "Bills -6");
        assert_eq!(body["data"]["consensus"]["percent"], 67);

        let (_, body) = send(&app, "GET", "/snapshot", None).await;
        assert_eq!(body["data"]["consensusLeaders"][0]["gameId"], game_id.as_str());

        let stored = kv.get(DEFAULT_STORAGE_KEY).await.unwrap().unwrap();
        assert!(stored.contains("Bills -6"));

        let (status, _) = send(&app, "POST", "/games/missing/predictions", Some(json!({"source": "A", "pick": "B"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "DELETE", &format!("/games/{}", game_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], true);
        let (status, _) = send(&app, "GET", &format!("/games/{}", game_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_as_warning() {
        let (app, _) = app_with(MemoryStore::with_quota(4)).await;
        let (status, body) = send(&app, "POST", "/board/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 3);
        assert!(body["warning"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let (app, _) = app_with(MemoryStore::new()).await;
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/board/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("football-picks-"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let exported: Value = serde_json::from_slice(&bytes).unwrap();

        let (status, body) = send(&app, "POST", "/board/import", Some(json!({"games": "nope"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);

        let (status, body) = send(&app, "POST", "/board/import", Some(exported.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 3);

        let (_, body) = send(&app, "GET", "/games", None).await;
        assert_eq!(body["data"][0]["game"]["id"], exported["games"][0]["id"]);
    }

    #[tokio::test]
    async fn test_import_while_another_is_running_conflicts() {
        let (app, state) = app_with(MemoryStore::new()).await;
        let _held = state.imports.try_begin().unwrap();
        let (status, _) = send(&app, "POST", "/board/import", Some(json!({"games": []}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_the_error_envelope() {
        let (app, _) = app_with(MemoryStore::new()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/games")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());

        let request = Request::builder()
            .method("POST")
            .uri("/games/sample-chiefs-eagles/predictions")
            .body(Body::from(r#"{"source": "Desk", "pick": "Chiefs"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);

        let (status, body) = send(&app, "POST", "/games/sample-chiefs-eagles/predictions", Some(json!({"source": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
