//! Domain models for the Rollcall reconciliation core.
//!
//! This module contains the core data structures used throughout the service:
//!
//! - [`Candidate`] - a pre-registration record pending conversion
//! - [`Registration`] - a confirmed participant
//! - [`IdentifierType`] - which kind of value identifies a row
//! - [`ColumnMapping`] - validated oracle output mapping columns to fields
//!
//! Events themselves are owned by an external collaborator; this core only
//! carries their opaque string identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Opaque event identifier, scoping all candidates and registrations.
pub type EventId = String;

// =============================================================================
// Identifier Type
// =============================================================================

/// The kind of value that identifies a spreadsheet row.
///
/// Chosen by the classification oracle based on which column it picked
/// as the identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    /// National identity document number.
    Dni,
    /// Email address.
    Email,
    /// Full name.
    Name,
}

impl IdentifierType {
    /// Wire representation, as sent by the oracle.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dni => "dni",
            Self::Email => "email",
            Self::Name => "name",
        }
    }
}

// =============================================================================
// Candidate
// =============================================================================

/// A pre-registration record produced by reconciling one uploaded row.
///
/// Candidates are born only through a full per-event replace and transition
/// exactly once from pending to converted, never back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Unique identifier.
    pub id: Uuid,

    /// Event this candidate belongs to.
    pub event_id: EventId,

    /// Which kind of value identifies this row.
    pub identifier_type: IdentifierType,

    /// The identifying value. Never empty.
    pub identifier_value: String,

    /// Mapped full name, if the upload had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Mapped email, if the upload had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Mapped national id, if the upload had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,

    /// Mapped area/department, if the upload had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// The original row exactly as uploaded, column order preserved.
    /// Kept for audit and export; never re-derived.
    pub raw_row: Value,

    /// Whether this candidate has been converted into a registration.
    pub converted: bool,

    /// The registration this candidate converted into, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_registration_id: Option<Uuid>,
}

impl Candidate {
    /// Create a pending candidate from mapped row data.
    pub fn new(
        event_id: impl Into<EventId>,
        identifier_type: IdentifierType,
        identifier_value: impl Into<String>,
        raw_row: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: event_id.into(),
            identifier_type,
            identifier_value: identifier_value.into(),
            full_name: None,
            email: None,
            national_id: None,
            area: None,
            raw_row,
            converted: false,
            converted_registration_id: None,
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

/// A confirmed participant.
///
/// Born either standalone (manual quick-add) or as the converted artifact
/// of exactly one candidate. The reconciliation core never updates a
/// registration after creation and never deletes one as part of conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Unique identifier.
    pub id: Uuid,

    /// Event this registration belongs to.
    pub event_id: EventId,

    /// Participant full name.
    pub full_name: String,

    /// Participant email.
    pub email: String,

    /// Area/department, `"Not specified"` when unknown.
    pub area: String,

    /// National id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Who created this registration (user id or "reconciliation").
    pub created_by: String,
}

/// Input for a manual quick-add registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegistration {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,
}

// =============================================================================
// Column Mapping (oracle output)
// =============================================================================

/// Field mappings from canonical participant fields to upload columns.
///
/// Each value is an exact header string from the upload, or `None` when
/// the oracle found no matching column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappings {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub area: Option<String>,
}

/// The oracle's answer: which column identifies each row, and how the
/// remaining columns map onto canonical participant fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    /// What kind of value the identifier column holds.
    pub identifier_type: IdentifierType,

    /// The column whose value identifies each row.
    pub identifier_column: String,

    /// Canonical field to column name.
    pub mappings: FieldMappings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&IdentifierType::Dni).unwrap(),
            "\"dni\""
        );
        let parsed: IdentifierType = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(parsed, IdentifierType::Email);
    }

    #[test]
    fn test_candidate_serializes_camel_case() {
        let mut candidate = Candidate::new(
            "evt-1",
            IdentifierType::Dni,
            "12345678",
            json!({"Cedula": "12345678"}),
        );
        candidate.full_name = Some("Ana Gomez".into());

        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["eventId"], "evt-1");
        assert_eq!(value["identifierType"], "dni");
        assert_eq!(value["identifierValue"], "12345678");
        assert_eq!(value["fullName"], "Ana Gomez");
        assert_eq!(value["rawRow"]["Cedula"], "12345678");
        assert_eq!(value["converted"], false);
        // Unset optionals are omitted from the wire form
        assert!(value.get("convertedRegistrationId").is_none());
    }

    #[test]
    fn test_column_mapping_round_trip() {
        let json = r#"{
            "identifierType": "dni",
            "identifierColumn": "Cedula",
            "mappings": {
                "fullName": "Nombre",
                "email": "Correo",
                "nationalId": "Cedula",
                "area": null
            }
        }"#;

        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.identifier_column, "Cedula");
        assert_eq!(mapping.mappings.full_name.as_deref(), Some("Nombre"));
        assert_eq!(mapping.mappings.area, None);
    }
}
