//! Query service
//!
//! Exposes the ranking engine over HTTP:
//!
//! | Method | Path      | Body                 | Response                          |
//! |--------|-----------|----------------------|-----------------------------------|
//! | POST   | `/search` | `{"query": "..."}`   | `[{"url", "title", "score"}, ...]` |
//! | GET    | `/health` |                      | `{"status": "ok"}`                |
//!
//! Storage failures answer 500 with `{"error": "..."}`. Every request opens its
//! own connection on a blocking thread, so queries never wait on each other
//! or on a running crawl.

use crate::config::Config;
use crate::ranking::{Ranker, SearchHit};
use crate::storage::Database;
use crate::SearchError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Body of a `POST /search` request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Clone)]
struct AppState {
    database: Database,
    ranker: Ranker,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// A failed query, rendered as a 500 with the cause
struct AppError(SearchError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Search failed: {}", self.0);
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E: Into<SearchError>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Builds the query service router over an index database
pub fn build_app(database: Database) -> Router {
    build_app_with_ranker(database, Ranker::default())
}

pub fn build_app_with_ranker(database: Database, ranker: Ranker) -> Router {
    let state = AppState { database, ranker };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let AppState { database, ranker } = state;
    let query = request.query;

    let hits = tokio::task::spawn_blocking(move || -> crate::Result<Vec<SearchHit>> {
        let mut storage = database.open()?;
        ranker.search(&mut storage, &query)
    })
    .await??;

    Ok(Json(hits))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serves queries on the configured bind address until the process exits
///
/// # Example
///
/// ```rust,no_run
/// use sumi_seek::server::run_server;
///
/// # async fn example(config: &sumi_seek::config::Config) -> anyhow::Result<()> {
/// run_server(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let database = Database::from_config(&config.storage)?;
    let app = build_app(database);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Query service listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
