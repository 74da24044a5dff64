//! Conversion of candidates into confirmed registrations.
//!
//! The conversion invariant: at most one registration is ever durably
//! linked to a candidate, no matter how many callers race. The store's
//! [`mark_converted`](crate::store::Store::mark_converted) test-and-set
//! decides the winner; the loser's provisional registration is removed
//! before the error propagates.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::api::logs::{log_success, log_warning};
use crate::broadcast::{ChangeBroadcaster, ChangeKind, ChangeMessage};
use crate::error::{StoreError, StoreResult};
use crate::models::{Candidate, NewRegistration, Registration};
use crate::store::Store;

/// Area recorded when neither the candidate nor the caller names one.
pub const DEFAULT_AREA: &str = "Not specified";

/// Options for a single conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Area to record instead of the candidate's own.
    pub area_override: Option<String>,
    /// Who triggered the conversion; defaults to `"reconciliation"`.
    pub created_by: Option<String>,
}

/// Convert a candidate into a registration.
///
/// Fails with `StoreError::NotFound` when the candidate is absent from the
/// event and with `StoreError::AlreadyConverted` when a concurrent caller
/// won the race. On success the registration is durably linked and a
/// `candidateConverted` message is published.
pub fn convert<S: Store>(
    store: &S,
    broadcaster: &ChangeBroadcaster,
    event_id: &str,
    candidate_id: Uuid,
    options: ConvertOptions,
) -> StoreResult<Registration> {
    let candidate = store
        .get_candidate(event_id, candidate_id)
        .ok_or_else(|| {
            StoreError::NotFound(format!("candidate {} in event '{}'", candidate_id, event_id))
        })?;

    let registration = derive_registration(&candidate, &options);

    // The registration is provisional until the test-and-set links it.
    store.insert_registration(registration.clone())?;

    if let Err(err) = store.mark_converted(event_id, candidate_id, registration.id) {
        // Lost the race (or the candidate vanished): the registration
        // created above must not stay behind unlinked.
        store.remove_registration(event_id, registration.id);
        if matches!(err, StoreError::AlreadyConverted(_)) {
            log_warning(format!(
                "Conversion race lost for candidate {}",
                candidate_id
            ));
        }
        return Err(err);
    }

    log_success(format!(
        "Candidate {} converted to registration {}",
        candidate_id, registration.id
    ));

    broadcaster.publish(ChangeMessage::new(
        ChangeKind::CandidateConverted,
        event_id,
        json!({
            "candidateId": candidate_id,
            "registration": registration,
        }),
    ));

    Ok(registration)
}

/// Derive the registration fields from a candidate.
fn derive_registration(candidate: &Candidate, options: &ConvertOptions) -> Registration {
    let full_name = candidate
        .full_name
        .clone()
        .unwrap_or_else(|| candidate.identifier_value.clone());

    // Placeholder pattern preserved for compatibility with existing
    // exports and downstream tooling.
    let email = candidate
        .email
        .clone()
        .unwrap_or_else(|| format!("{}@temp.com", candidate.identifier_value));

    let area = options
        .area_override
        .clone()
        .or_else(|| candidate.area.clone())
        .unwrap_or_else(|| DEFAULT_AREA.to_string());

    Registration {
        id: Uuid::new_v4(),
        event_id: candidate.event_id.clone(),
        full_name,
        email,
        area,
        national_id: candidate.national_id.clone(),
        created_at: Utc::now(),
        created_by: options
            .created_by
            .clone()
            .unwrap_or_else(|| "reconciliation".to_string()),
    }
}

/// Manually register a participant without going through an upload.
pub fn quick_add<S: Store>(
    store: &S,
    broadcaster: &ChangeBroadcaster,
    event_id: &str,
    input: NewRegistration,
    created_by: &str,
) -> StoreResult<Registration> {
    let registration = Registration {
        id: Uuid::new_v4(),
        event_id: event_id.to_string(),
        full_name: input.full_name,
        email: input.email,
        area: input
            .area
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AREA.to_string()),
        national_id: input.national_id,
        created_at: Utc::now(),
        created_by: created_by.to_string(),
    };

    store.insert_registration(registration.clone())?;

    broadcaster.publish(ChangeMessage::new(
        ChangeKind::RegistrationCreated,
        event_id,
        json!({ "registration": registration }),
    ));

    Ok(registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentifierType;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn seeded_candidate(store: &MemoryStore, event_id: &str) -> Candidate {
        let mut candidate = Candidate::new(
            event_id,
            IdentifierType::Dni,
            "12345678",
            json!({"Cedula": "12345678"}),
        );
        candidate.full_name = Some("Ana Gomez".to_string());
        candidate.email = Some("ana@x.com".to_string());
        candidate.national_id = Some("12345678".to_string());
        candidate.area = Some("Ops".to_string());
        store
            .replace_all(event_id, vec![candidate.clone()])
            .unwrap();
        candidate
    }

    #[test]
    fn test_convert_uses_candidate_fields() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let candidate = seeded_candidate(&store, "evt");

        let registration = convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions::default(),
        )
        .unwrap();

        assert_eq!(registration.full_name, "Ana Gomez");
        assert_eq!(registration.email, "ana@x.com");
        assert_eq!(registration.area, "Ops");
        assert_eq!(registration.national_id.as_deref(), Some("12345678"));
        assert_eq!(registration.created_by, "reconciliation");

        let stored = store.get_candidate("evt", candidate.id).unwrap();
        assert!(stored.converted);
        assert_eq!(stored.converted_registration_id, Some(registration.id));
    }

    #[test]
    fn test_convert_falls_back_to_identifier_and_placeholder_email() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let candidate = Candidate::new(
            "evt",
            IdentifierType::Dni,
            "98765432",
            json!({"Cedula": "98765432"}),
        );
        store.replace_all("evt", vec![candidate.clone()]).unwrap();

        let registration = convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions::default(),
        )
        .unwrap();

        assert_eq!(registration.full_name, "98765432");
        assert_eq!(registration.email, "98765432@temp.com");
        assert_eq!(registration.area, DEFAULT_AREA);
        assert_eq!(registration.national_id, None);
    }

    #[test]
    fn test_convert_area_override_beats_candidate_area() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let candidate = seeded_candidate(&store, "evt");

        let registration = convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions {
                area_override: Some("VIP".to_string()),
                created_by: Some("front-desk".to_string()),
            },
        )
        .unwrap();

        assert_eq!(registration.area, "VIP");
        assert_eq!(registration.created_by, "front-desk");
    }

    #[test]
    fn test_convert_missing_candidate_is_not_found() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();

        let err = convert(
            &store,
            &broadcaster,
            "evt",
            Uuid::new_v4(),
            ConvertOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_second_convert_fails_and_leaves_single_registration() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let candidate = seeded_candidate(&store, "evt");

        convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions::default(),
        )
        .unwrap();

        let err = convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::AlreadyConverted(id) if id == candidate.id));
        // The loser's provisional registration was discarded
        assert_eq!(store.registrations("evt").len(), 1);
    }

    #[test]
    fn test_concurrent_converts_yield_exactly_one_registration() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let candidate = seeded_candidate(&store, "evt");

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let broadcaster = Arc::clone(&broadcaster);
                let candidate_id = candidate.id;
                std::thread::spawn(move || {
                    convert(
                        store.as_ref(),
                        broadcaster.as_ref(),
                        "evt",
                        candidate_id,
                        ConvertOptions::default(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        let losers: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 1);
        assert!(matches!(
            losers[0].as_ref().unwrap_err(),
            StoreError::AlreadyConverted(_)
        ));

        // Exactly one registration survives, and it is the linked one
        let registrations = store.registrations("evt");
        assert_eq!(registrations.len(), 1);
        let stored = store.get_candidate("evt", candidate.id).unwrap();
        assert_eq!(
            stored.converted_registration_id,
            Some(registrations[0].id)
        );
    }

    #[tokio::test]
    async fn test_convert_publishes_after_commit() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let candidate = seeded_candidate(&store, "evt");
        let mut rx = broadcaster.subscribe("evt");

        let registration = convert(
            &store,
            &broadcaster,
            "evt",
            candidate.id,
            ConvertOptions::default(),
        )
        .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChangeKind::CandidateConverted);
        assert_eq!(msg.payload["candidateId"], json!(candidate.id));
        assert_eq!(msg.payload["registration"]["id"], json!(registration.id));
    }

    #[tokio::test]
    async fn test_quick_add_defaults_area_and_publishes() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();
        let mut rx = broadcaster.subscribe("evt");

        let registration = quick_add(
            &store,
            &broadcaster,
            "evt",
            NewRegistration {
                full_name: "Dana Cruz".to_string(),
                email: "dana@x.com".to_string(),
                area: None,
                national_id: None,
            },
            "front-desk",
        )
        .unwrap();

        assert_eq!(registration.area, DEFAULT_AREA);
        assert_eq!(store.registrations("evt").len(), 1);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChangeKind::RegistrationCreated);
    }

    #[test]
    fn test_quick_add_validates_required_fields() {
        let store = MemoryStore::new();
        let broadcaster = ChangeBroadcaster::new();

        let err = quick_add(
            &store,
            &broadcaster,
            "evt",
            NewRegistration {
                full_name: "".to_string(),
                email: "dana@x.com".to_string(),
                area: None,
                national_id: None,
            },
            "front-desk",
        )
        .unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.registrations("evt").is_empty());
    }
}
