//! Candidate building: one parsed row plus a validated mapping in, one
//! pending candidate out.
//!
//! Rows whose identifier cell is empty cannot satisfy the non-empty
//! identifier invariant; they are skipped and reported, never silently
//! dropped.

use serde_json::Value;

use crate::models::{Candidate, ColumnMapping};

/// A data row that could not become a candidate.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    /// 1-based data row index (header row not counted).
    pub row: usize,
    /// Why the row was skipped.
    pub reason: String,
}

/// Outcome of building candidates from an upload.
#[derive(Debug)]
pub struct BuildResult {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<SkippedRow>,
}

/// Build pending candidates for `event_id` from parsed rows.
///
/// The mapping must already be validated against the upload headers. The
/// original row travels along untouched as `raw_row`.
pub fn build_candidates(event_id: &str, rows: &[Value], mapping: &ColumnMapping) -> BuildResult {
    let mut candidates = Vec::with_capacity(rows.len());
    let mut skipped = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let Some(identifier_value) = cell(row, &mapping.identifier_column) else {
            skipped.push(SkippedRow {
                row: idx + 1,
                reason: format!("empty identifier cell '{}'", mapping.identifier_column),
            });
            continue;
        };

        let mut candidate = Candidate::new(
            event_id,
            mapping.identifier_type,
            identifier_value,
            row.clone(),
        );
        candidate.full_name = mapping.mappings.full_name.as_deref().and_then(|c| cell(row, c));
        candidate.email = mapping.mappings.email.as_deref().and_then(|c| cell(row, c));
        candidate.national_id = mapping
            .mappings
            .national_id
            .as_deref()
            .and_then(|c| cell(row, c));
        candidate.area = mapping.mappings.area.as_deref().and_then(|c| cell(row, c));

        candidates.push(candidate);
    }

    BuildResult {
        candidates,
        skipped,
    }
}

/// A row's cell as a trimmed, non-empty string.
fn cell(row: &Value, column: &str) -> Option<String> {
    let text = row.get(column)?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMappings, IdentifierType};
    use serde_json::json;

    fn mapping() -> ColumnMapping {
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

    #[test]
    fn test_builds_one_candidate_per_row() {
        let rows = vec![
            json!({"Nombre": "Ana Gomez", "Correo": "ana@x.com", "Cedula": "111", "Area": "Ops"}),
            json!({"Nombre": "Bea Diaz", "Correo": "bea@x.com", "Cedula": "222", "Area": "IT"}),
            json!({"Nombre": "Caro Ruiz", "Correo": "caro@x.com", "Cedula": "333", "Area": ""}),
        ];

        let result = build_candidates("evt", &rows, &mapping());

        assert_eq!(result.candidates.len(), 3);
        assert!(result.skipped.is_empty());

        let first = &result.candidates[0];
        assert_eq!(first.event_id, "evt");
        assert_eq!(first.identifier_type, IdentifierType::Dni);
        assert_eq!(first.identifier_value, "111");
        assert_eq!(first.full_name.as_deref(), Some("Ana Gomez"));
        assert_eq!(first.national_id.as_deref(), Some("111"));
        assert!(!first.converted);

        // Empty mapped cell becomes None, not an empty string
        assert_eq!(result.candidates[2].area, None);
    }

    #[test]
    fn test_raw_row_is_the_original_row() {
        let row = json!({"Nombre": "Ana", "Correo": "a@x.com", "Cedula": "111", "Area": "Ops"});
        let result = build_candidates("evt", std::slice::from_ref(&row), &mapping());

        assert_eq!(result.candidates[0].raw_row, row);
    }

    #[test]
    fn test_empty_identifier_cell_skips_row() {
        let rows = vec![
            json!({"Nombre": "Ana", "Cedula": "111"}),
            json!({"Nombre": "Sin Cedula", "Cedula": "  "}),
            json!({"Nombre": "Tampoco"}),
        ];

        let result = build_candidates("evt", &rows, &mapping());

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.skipped[0].row, 2);
        assert_eq!(result.skipped[1].row, 3);
        assert!(result.skipped[0].reason.contains("Cedula"));
    }

    #[test]
    fn test_null_mappings_leave_fields_unset() {
        let sparse = ColumnMapping {
            identifier_type: IdentifierType::Email,
            identifier_column: "Correo".to_string(),
            mappings: FieldMappings::default(),
        };
        let rows = vec![json!({"Correo": "ana@x.com", "Nombre": "Ana"})];

        let result = build_candidates("evt", &rows, &sparse);
        let candidate = &result.candidates[0];

        assert_eq!(candidate.identifier_value, "ana@x.com");
        assert_eq!(candidate.full_name, None);
        assert_eq!(candidate.email, None);
    }
}
