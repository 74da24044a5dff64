//! # Rollcall - attendee reconciliation and live registration
//!
//! Rollcall turns loosely-structured attendee spreadsheets (arbitrary,
//! unpredictable column names) into searchable reconciliation candidates,
//! converts candidates into confirmed registrations exactly once even under
//! concurrent attempts, and pushes every state change to live viewers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Spreadsheet │────▶│   Ingest    │────▶│  Classify   │────▶│  Candidate  │
//! │ (csv/xlsx)  │     │ (auto-enc)  │     │ (AI oracle) │     │   replace   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │ Subscribers │◀────│  Broadcast  │◀───────────┤
//!                     │   (SSE)     │     │ (per event) │     search + convert
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rollcall::reconcile::{run_upload, UploadOptions};
//! use rollcall::classify::AiClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = rollcall::store::MemoryStore::new();
//!     let broadcaster = rollcall::broadcast::ChangeBroadcaster::new();
//!     let oracle = AiClient::from_env().unwrap();
//!
//!     let outcome = run_upload(
//!         &store, &broadcaster, &oracle,
//!         "evt-42", "attendees.csv", &bytes,
//!         UploadOptions::default(),
//!     ).await.unwrap();
//!     println!("Installed {} candidates", outcome.candidates);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Candidate, Registration, ColumnMapping)
//! - [`ingest`] - Spreadsheet parsing with auto-detection
//! - [`classify`] - Schema classification oracle client
//! - [`store`] - Candidate/registration store
//! - [`reconcile`] - Candidate building, upload pipeline, conversion
//! - [`broadcast`] - Per-event change fan-out
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod ingest;

// Classification
pub mod classify;

// Storage
pub mod store;

// Reconciliation
pub mod reconcile;

// Fan-out
pub mod broadcast;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    BroadcastError, ClassifyError, IngestError, StoreError, UploadError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Candidate, ColumnMapping, EventId, FieldMappings, IdentifierType, NewRegistration,
    Registration,
};

// =============================================================================
// Re-exports - Ingestion
// =============================================================================

pub use ingest::{parse_upload, SheetData, SourceFormat, MAX_UPLOAD_BYTES};

// =============================================================================
// Re-exports - Classification
// =============================================================================

pub use classify::{validate_mapping, AiClient, SchemaOracle};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{MemoryStore, Store, SEARCH_LIMIT};

// =============================================================================
// Re-exports - Reconciliation
// =============================================================================

pub use reconcile::{
    build_candidates, convert, quick_add, run_upload, ConvertOptions, UploadOptions,
    UploadOutcome,
};

// =============================================================================
// Re-exports - Broadcast
// =============================================================================

pub use broadcast::{ChangeBroadcaster, ChangeKind, ChangeMessage};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
