//! The end-to-end upload pipeline.
//!
//! Parse the upload, classify its columns, build candidates, then
//! atomically replace the event's candidate set and notify subscribers.
//! Every failure before the replace aborts the whole upload with the prior
//! candidate set untouched: no partial candidate sets, ever.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall::reconcile::{run_upload, UploadOptions};
//!
//! let outcome = run_upload(
//!     &store, &broadcaster, &oracle,
//!     "evt-42", "attendees.xlsx", &bytes,
//!     UploadOptions::default(),
//! ).await?;
//! println!("{} candidates installed", outcome.candidates);
//! ```

use serde::Serialize;
use serde_json::json;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::broadcast::{ChangeBroadcaster, ChangeKind, ChangeMessage};
use crate::classify::{validate_mapping, SchemaOracle};
use crate::error::UploadResult;
use crate::ingest::{parse_upload, SheetData};
use crate::models::ColumnMapping;
use crate::store::Store;

use super::candidates::{build_candidates, SkippedRow};

/// Rows shown to the classification oracle.
const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Options for the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Number of data rows sent to the oracle as a sample.
    pub sample_rows: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

/// Upload file metadata, echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub format: String,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<&SheetData> for SheetInfo {
    fn from(sheet: &SheetData) -> Self {
        Self {
            format: sheet.format.as_str().to_string(),
            encoding: sheet.encoding.clone(),
            delimiter: sheet.delimiter.map(|d| d.to_string()),
            row_count: sheet.rows.len(),
            columns: sheet.headers.clone(),
        }
    }
}

/// Result of a completed upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Number of candidates installed.
    pub candidates: usize,
    /// Rows that could not become candidates.
    pub skipped: Vec<SkippedRow>,
    /// The validated column mapping used.
    pub mapping: ColumnMapping,
    /// Upload file metadata.
    pub sheet: SheetInfo,
}

/// Run the full upload pipeline for one event.
///
/// The event's prior candidate set is replaced only after the mapping has
/// been validated; an abandoned or failed upload changes nothing.
pub async fn run_upload<S: Store, O: SchemaOracle>(
    store: &S,
    broadcaster: &ChangeBroadcaster,
    oracle: &O,
    event_id: &str,
    filename: &str,
    bytes: &[u8],
    options: UploadOptions,
) -> UploadResult<UploadOutcome> {
    // Step 1: parse
    log_info(format!("Reading upload '{}' ({} bytes)...", filename, bytes.len()));
    let sheet = parse_upload(filename, bytes)?;
    if let Some(encoding) = &sheet.encoding {
        log_success(format!("Detected encoding: {}", encoding));
    }
    if let Some(delimiter) = sheet.delimiter {
        log_success(format!("Detected delimiter: '{}'", delimiter));
    }
    log_success(format!(
        "Parsed {} rows, {} columns",
        sheet.rows.len(),
        sheet.headers.len()
    ));

    // Step 2: classify columns
    let sample_count = options.sample_rows.min(sheet.rows.len());
    log_info(format!(
        "Classifying {} columns from a {}-row sample...",
        sheet.headers.len(),
        sample_count
    ));
    let mapping = oracle
        .classify(&sheet.headers, &sheet.rows[..sample_count])
        .await?;

    // The oracle client validates its own output, but the pipeline cannot
    // trust arbitrary oracle implementations with the persistence gate.
    validate_mapping(&mapping, &sheet.headers)?;
    log_success(format!(
        "Identifier: '{}' ({})",
        mapping.identifier_column,
        mapping.identifier_type.as_str()
    ));

    // Step 3: build candidates
    let build = build_candidates(event_id, &sheet.rows, &mapping);
    if !build.skipped.is_empty() {
        log_warning(format!(
            "{} rows skipped (empty identifier cell)",
            build.skipped.len()
        ));
    }

    // Step 4: atomic replace, then notify
    let installed = store.replace_all(event_id, build.candidates)?;
    log_success(format!(
        "Installed {} candidates for event '{}'",
        installed, event_id
    ));

    broadcaster.publish(ChangeMessage::new(
        ChangeKind::CandidatesReplaced,
        event_id,
        json!({ "count": installed }),
    ));

    Ok(UploadOutcome {
        candidates: installed,
        skipped: build.skipped,
        mapping,
        sheet: SheetInfo::from(&sheet),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifyError, ClassifyResult, UploadError};
    use crate::models::{FieldMappings, IdentifierType};
    use crate::store::MemoryStore;
    use serde_json::Value;
    use std::future::Future;

    /// Deterministic oracle returning a canned mapping.
    struct StubOracle {
        mapping: ColumnMapping,
    }

    impl SchemaOracle for StubOracle {
        fn classify(
            &self,
            _headers: &[String],
            _sample_rows: &[Value],
        ) -> impl Future<Output = ClassifyResult<ColumnMapping>> + Send {
            let mapping = self.mapping.clone();
            async move { Ok(mapping) }
        }
    }

    /// Oracle that always times out.
    struct TimeoutOracle;

    impl SchemaOracle for TimeoutOracle {
        fn classify(
            &self,
            _headers: &[String],
            _sample_rows: &[Value],
        ) -> impl Future<Output = ClassifyResult<ColumnMapping>> + Send {
            async { Err(ClassifyError::Timeout) }
        }
    }

    fn spanish_mapping() -> ColumnMapping {
        ColumnMapping {
            identifier_type: IdentifierType::Dni,
            identifier_column: "Cedula".to_string(),
            mappings: FieldMappings {
                full_name: Some("Nombre".to_string()),
                email: Some("Correo".to_string()),
                national_id: Some("Cedula".to_string()),
                area: Some("Area".to_string()),
            },
        }
    }

    const SPANISH_CSV: &str = "\
Nombre,Correo,Cedula,Area
Ana Gomez,ana@x.com,111,Ops
Bea Diaz,bea@x.com,222,IT
Caro Ruiz,caro@x.com,333,HR";

    #[tokio::test]
    async fn test_upload_installs_candidates_with_raw_rows() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let oracle = StubOracle {
            mapping: spanish_mapping(),
        };

        let outcome = run_upload(
            &store,
            &broadcaster,
            &oracle,
            "evt",
            "attendees.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.candidates, 3);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.sheet.row_count, 3);

        let candidates = store.list("evt", true);
        assert_eq!(candidates.len(), 3);
        for candidate in &candidates {
            assert_eq!(candidate.identifier_type, IdentifierType::Dni);
        }
        let ana = candidates
            .iter()
            .find(|c| c.identifier_value == "111")
            .unwrap();
        assert_eq!(
            ana.raw_row,
            serde_json::json!({
                "Nombre": "Ana Gomez",
                "Correo": "ana@x.com",
                "Cedula": "111",
                "Area": "Ops"
            })
        );
    }

    #[tokio::test]
    async fn test_upload_replaces_prior_candidate_set() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let oracle = StubOracle {
            mapping: spanish_mapping(),
        };

        run_upload(
            &store,
            &broadcaster,
            &oracle,
            "evt",
            "first.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        let second = "Nombre,Correo,Cedula,Area\nNueva Persona,n@x.com,999,Ops";
        run_upload(
            &store,
            &broadcaster,
            &oracle,
            "evt",
            "second.csv",
            second.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        let candidates = store.list("evt", false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier_value, "999");
    }

    #[tokio::test]
    async fn test_unknown_column_in_mapping_aborts_before_replace() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();

        // Seed a prior candidate set that must survive the failed upload
        let good_oracle = StubOracle {
            mapping: spanish_mapping(),
        };
        run_upload(
            &store,
            &broadcaster,
            &good_oracle,
            "evt",
            "first.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        let mut bad_mapping = spanish_mapping();
        bad_mapping.mappings.email = Some("Telefono".to_string());
        let bad_oracle = StubOracle {
            mapping: bad_mapping,
        };

        let err = run_upload(
            &store,
            &broadcaster,
            &bad_oracle,
            "evt",
            "second.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Classify(ClassifyError::Mapping(_))
        ));
        // Prior set untouched
        assert_eq!(store.list("evt", false).len(), 3);
    }

    #[tokio::test]
    async fn test_oracle_timeout_aborts_upload() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();

        let err = run_upload(
            &store,
            &broadcaster,
            &TimeoutOracle,
            "evt",
            "attendees.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Classify(ClassifyError::Timeout)
        ));
        assert!(store.list("evt", false).is_empty());
    }

    #[tokio::test]
    async fn test_upload_publishes_replace_message() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let oracle = StubOracle {
            mapping: spanish_mapping(),
        };
        let mut rx = broadcaster.subscribe("evt");

        run_upload(
            &store,
            &broadcaster,
            &oracle,
            "evt",
            "attendees.csv",
            SPANISH_CSV.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChangeKind::CandidatesReplaced);
        assert_eq!(msg.payload["count"], 3);
    }

    #[tokio::test]
    async fn test_skipped_rows_reported_with_indices() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let oracle = StubOracle {
            mapping: spanish_mapping(),
        };

        let csv = "Nombre,Correo,Cedula,Area\nAna,a@x.com,111,Ops\nSin Cedula,s@x.com,,Ops";
        let outcome = run_upload(
            &store,
            &broadcaster,
            &oracle,
            "evt",
            "attendees.csv",
            csv.as_bytes(),
            UploadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.candidates, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].row, 2);
    }
}
