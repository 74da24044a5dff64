//! Error types for the Rollcall reconciliation core.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`IngestError`] - upload parsing errors
//! - [`ClassifyError`] - classification oracle errors
//! - [`StoreError`] - candidate/registration store errors
//! - [`BroadcastError`] - change delivery errors
//! - [`UploadError`] - top-level upload pipeline errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while parsing an uploaded spreadsheet.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upload exceeds the configured size ceiling.
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// File extension outside the allow-list.
    #[error("Unsupported file type '{0}': expected csv, xlsx or xls")]
    UnsupportedType(String),

    /// Empty or unparseable content.
    #[error("Invalid file format: {0}")]
    Format(String),

    /// Failed to read the file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Classifier Errors
// =============================================================================

/// Errors from the schema classification oracle.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Missing API key.
    #[error("Missing ANTHROPIC_API_KEY environment variable")]
    MissingApiKey,

    /// HTTP request failed.
    #[error("Oracle request failed: {0}")]
    Http(String),

    /// Request exceeded the configured bound.
    #[error("Oracle request timed out")]
    Timeout,

    /// Response malformed, or mapping references unknown columns.
    #[error("Invalid column mapping: {0}")]
    Mapping(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the candidate/registration store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Candidate or registration missing from the event.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conversion race lost: the candidate is already converted.
    #[error("Candidate {0} is already registered")]
    AlreadyConverted(uuid::Uuid),

    /// Required field missing at persistence time.
    #[error("Validation failed: {0}")]
    Validation(String),
}

// =============================================================================
// Broadcast Errors
// =============================================================================

/// Errors while delivering change messages to subscribers.
///
/// Delivery failures are logged and never fail the write that
/// triggered them.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Delivery to one or more subscribers failed.
    #[error("Broadcast transport error: {0}")]
    Transport(String),
}

// =============================================================================
// Upload Pipeline Errors (top-level)
// =============================================================================

/// Top-level upload pipeline errors.
///
/// This is the main error type returned by
/// [`crate::reconcile::run_upload`]. Any variant raised before the
/// candidate replace leaves the prior candidate set untouched.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Upload parsing error.
    #[error("{0}")]
    Ingest(#[from] IngestError),

    /// Classification oracle error.
    #[error("{0}")]
    Classify(#[from] ClassifyError),

    /// Store error.
    #[error("{0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for classifier operations.
pub type ClassifyResult<T> = Result<T, ClassifyError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for upload pipeline operations.
pub type UploadResult<T> = Result<T, UploadError>;
