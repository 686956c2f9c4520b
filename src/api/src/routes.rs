//! API route handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::resources::Resources;
use crate::runner;
use crate::types::{ErrorResponse, HealthResponse, RunRequest};

/// Application state shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub resources: &'static Resources,
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Run endpoint.
///
/// Streams `status`, `result` and `error` events as SSE until the run ends.
/// Closing the connection stops the run after the race in progress.
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let races = req
        .race_numbers()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    info!("Run requested: {} {} {:?}", req.date, req.place, races);

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        runner::run_races(&state.config, state.resources, &req, tx).await;
    });

    let events = ReceiverStream::new(rx).filter_map(|event| async move {
        Event::default()
            .event(event.kind())
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
