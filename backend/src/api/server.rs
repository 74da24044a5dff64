//! HTTP server for the Rollcall API.
//!
//! # API Endpoints
//!
//! | Method | Path                                            | Description                          |
//! |--------|-------------------------------------------------|--------------------------------------|
//! | GET    | `/health`                                       | Health check                         |
//! | POST   | `/api/events/{event}/upload`                    | Upload an attendee spreadsheet       |
//! | GET    | `/api/events/{event}/candidates`                | Search or list candidates            |
//! | POST   | `/api/events/{event}/candidates/{id}/convert`   | Convert a candidate                  |
//! | GET    | `/api/events/{event}/registrations`             | List confirmed registrations         |
//! | POST   | `/api/events/{event}/registrations`             | Manual quick-add registration        |
//! | GET    | `/api/events/{event}/stream`                    | SSE stream of change messages        |
//! | GET    | `/api/logs`                                     | SSE stream of pipeline logs          |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_warning, LOG_BROADCASTER};
use super::types::{error_response, ConvertRequest, UploadResponse};
use crate::broadcast::ChangeBroadcaster;
use crate::classify::AiClient;
use crate::error::{BroadcastError, ClassifyError, IngestError, StoreError, UploadError};
use crate::ingest::MAX_UPLOAD_BYTES;
use crate::models::NewRegistration;
use crate::reconcile::{convert, quick_add, run_upload, ConvertOptions, UploadOptions};
use crate::store::{MemoryStore, Store};

/// Shared server state.
pub struct AppState {
    pub store: MemoryStore,
    pub broadcaster: ChangeBroadcaster,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            broadcaster: ChangeBroadcaster::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new());

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/events/{event}/upload", post(upload_attendees))
        .route("/api/events/{event}/candidates", get(list_candidates))
        .route(
            "/api/events/{event}/candidates/{candidate}/convert",
            post(convert_candidate),
        )
        .route(
            "/api/events/{event}/registrations",
            get(list_registrations).post(add_registration),
        )
        .route("/api/events/{event}/stream", get(sse_changes))
        .route("/api/logs", get(sse_logs))
        // The ingestion layer enforces its own ceiling with a JSON error;
        // the transport limit just needs to sit above it.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("Rollcall server running on http://localhost:{}", port);
    println!("   POST /api/events/{{event}}/upload    - Upload attendee spreadsheet");
    println!("   GET  /api/events/{{event}}/stream    - SSE change stream");
    println!("   GET  /health                        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "rollcall",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/events/{event}/upload",
            "candidates": "GET /api/events/{event}/candidates",
            "stream": "GET /api/events/{event}/stream (SSE)"
        }
    }))
}

/// Upload endpoint: reconcile a spreadsheet into the event's candidate set
async fn upload_attendees(
    Path(event_id): Path<String>,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<Value>)> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&format!("Multipart error: {}", e))),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(error_response(&format!("Read error: {}", e))),
                        )
                    })?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response("No file provided")),
        )
    })?;
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());

    let oracle = AiClient::from_env().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&e.to_string())),
        )
    })?;

    let outcome = run_upload(
        &state.store,
        &state.broadcaster,
        &oracle,
        &event_id,
        &file_name,
        &bytes,
        UploadOptions::default(),
    )
    .await
    .map_err(|e| (upload_status(&e), Json(error_response(&e.to_string()))))?;

    Ok(Json(UploadResponse::from_outcome(event_id, outcome)))
}

/// Query parameters for candidate listing/search.
#[derive(Debug, Deserialize)]
struct CandidateQuery {
    /// Search query; absent means plain listing.
    q: Option<String>,
    /// Include converted candidates.
    #[serde(default)]
    all: bool,
}

/// List or search the event's candidates
async fn list_candidates(
    Path(event_id): Path<String>,
    Query(query): Query<CandidateQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    let only_unconverted = !query.all;
    let candidates = match query.q.as_deref() {
        Some(q) if !q.trim().is_empty() => {
            state.store.search(&event_id, q.trim(), only_unconverted)
        }
        _ => state.store.list(&event_id, only_unconverted),
    };

    Json(json!({ "candidates": candidates }))
}

/// Convert a candidate into a confirmed registration
async fn convert_candidate(
    Path((event_id, candidate_id)): Path<(String, Uuid)>,
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // The body is optional; an empty one means no overrides
    let request: ConvertRequest = if body.is_empty() {
        ConvertRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(error_response(&format!("Invalid request body: {}", e))),
            )
        })?
    };

    let registration = convert(
        &state.store,
        &state.broadcaster,
        &event_id,
        candidate_id,
        ConvertOptions {
            area_override: request.area,
            created_by: None,
        },
    )
    .map_err(|e| (store_status(&e), Json(error_response(&e.to_string()))))?;

    Ok(Json(json!({ "registration": registration })))
}

/// List confirmed registrations
async fn list_registrations(
    Path(event_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    Json(json!({ "registrations": state.store.registrations(&event_id) }))
}

/// Manual quick-add registration
async fn add_registration(
    Path(event_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewRegistration>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let registration = quick_add(
        &state.store,
        &state.broadcaster,
        &event_id,
        input,
        "quick-add",
    )
    .map_err(|e| (store_status(&e), Json(error_response(&e.to_string()))))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "registration": registration })),
    ))
}

/// SSE endpoint for an event's change messages
async fn sse_changes(
    Path(event_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe(&event_id);

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(message) => {
            let json = serde_json::to_string(&message).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            // The subscriber fell behind and lost its oldest messages;
            // delivery continues from the current position.
            let err = BroadcastError::Transport(format!("subscriber lagged, {} missed", missed));
            log_warning(err.to_string());
            None
        }
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// SSE endpoint for real-time pipeline logs
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// HTTP status for a failed upload, naming the violated constraint.
fn upload_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Ingest(IngestError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Ingest(IngestError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadError::Ingest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        UploadError::Classify(ClassifyError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        UploadError::Classify(ClassifyError::Http(_)) => StatusCode::BAD_GATEWAY,
        UploadError::Classify(ClassifyError::MissingApiKey) => StatusCode::INTERNAL_SERVER_ERROR,
        UploadError::Classify(ClassifyError::Mapping(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        UploadError::Store(e) => store_status(e),
    }
}

/// HTTP status for store errors: "not found" and "already registered"
/// stay distinguishable so the caller can refresh its view.
fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyConverted(_) => StatusCode::CONFLICT,
        StoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_status_mapping() {
        let err = UploadError::Ingest(IngestError::PayloadTooLarge {
            size: 1,
            limit: 0,
        });
        assert_eq!(upload_status(&err), StatusCode::PAYLOAD_TOO_LARGE);

        let err = UploadError::Ingest(IngestError::UnsupportedType("pdf".into()));
        assert_eq!(upload_status(&err), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let err = UploadError::Classify(ClassifyError::Timeout);
        assert_eq!(upload_status(&err), StatusCode::GATEWAY_TIMEOUT);

        let err = UploadError::Classify(ClassifyError::Mapping("bad".into()));
        assert_eq!(upload_status(&err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_store_status_distinguishes_conflict_from_missing() {
        assert_eq!(
            store_status(&StoreError::NotFound("candidate".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            store_status(&StoreError::AlreadyConverted(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
    }
}
