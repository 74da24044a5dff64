//! In-process store backed by a `RwLock`ed map of per-event buckets.
//!
//! Every mutation takes the write lock, so `replace_all` is all-or-nothing
//! with respect to concurrent reads and `mark_converted` is a true
//! test-and-set regardless of how many threads race on it. Concurrent
//! replaces on one event serialize; the last committed replace wins whole.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Candidate, EventId, Registration};

use super::{Store, SEARCH_LIMIT};

#[derive(Debug, Default)]
struct EventBucket {
    candidates: Vec<Candidate>,
    registrations: Vec<Registration>,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<EventId, EventBucket>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn replace_all(&self, event_id: &str, candidates: Vec<Candidate>) -> StoreResult<usize> {
        // Validate the whole set before touching the bucket
        for candidate in &candidates {
            if candidate.identifier_value.trim().is_empty() {
                return Err(StoreError::Validation(format!(
                    "candidate {} has an empty identifier value",
                    candidate.id
                )));
            }
            if candidate.event_id != event_id {
                return Err(StoreError::Validation(format!(
                    "candidate {} belongs to event '{}', not '{}'",
                    candidate.id, candidate.event_id, event_id
                )));
            }
        }

        let count = candidates.len();
        let mut events = self.events.write().expect("store lock poisoned");
        let bucket = events.entry(event_id.to_string()).or_default();
        bucket.candidates = candidates;
        Ok(count)
    }

    fn list(&self, event_id: &str, only_unconverted: bool) -> Vec<Candidate> {
        let events = self.events.read().expect("store lock poisoned");
        let Some(bucket) = events.get(event_id) else {
            return Vec::new();
        };

        bucket
            .candidates
            .iter()
            .filter(|c| !only_unconverted || !c.converted)
            .cloned()
            .collect()
    }

    fn search(&self, event_id: &str, query: &str, only_unconverted: bool) -> Vec<Candidate> {
        let needle = query.to_lowercase();
        let events = self.events.read().expect("store lock poisoned");
        let Some(bucket) = events.get(event_id) else {
            return Vec::new();
        };

        let mut hits: Vec<Candidate> = bucket
            .candidates
            .iter()
            .filter(|c| !only_unconverted || !c.converted)
            .filter(|c| {
                let fields = [
                    c.full_name.as_deref(),
                    c.email.as_deref(),
                    c.national_id.as_deref(),
                    Some(c.identifier_value.as_str()),
                ];
                fields
                    .into_iter()
                    .flatten()
                    .any(|f| f.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();

        // Full name ascending, missing or empty names last
        hits.sort_by(|a, b| match (name_key(a), name_key(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        hits.truncate(SEARCH_LIMIT);
        hits
    }

    fn get_candidate(&self, event_id: &str, candidate_id: Uuid) -> Option<Candidate> {
        let events = self.events.read().expect("store lock poisoned");
        events
            .get(event_id)?
            .candidates
            .iter()
            .find(|c| c.id == candidate_id)
            .cloned()
    }

    fn mark_converted(
        &self,
        event_id: &str,
        candidate_id: Uuid,
        registration_id: Uuid,
    ) -> StoreResult<()> {
        let mut events = self.events.write().expect("store lock poisoned");
        let bucket = events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event '{}'", event_id)))?;

        // The link target must exist in the same event before the flag flips
        if !bucket.registrations.iter().any(|r| r.id == registration_id) {
            return Err(StoreError::NotFound(format!(
                "registration {} in event '{}'",
                registration_id, event_id
            )));
        }

        let candidate = bucket
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or_else(|| {
                StoreError::NotFound(format!("candidate {} in event '{}'", candidate_id, event_id))
            })?;

        // Test-and-set under the write lock: this is the only place the
        // conversion flag flips, and it flips at most once.
        if candidate.converted {
            return Err(StoreError::AlreadyConverted(candidate_id));
        }
        candidate.converted = true;
        candidate.converted_registration_id = Some(registration_id);
        Ok(())
    }

    fn insert_registration(&self, registration: Registration) -> StoreResult<()> {
        if registration.full_name.trim().is_empty() {
            return Err(StoreError::Validation("fullName is required".to_string()));
        }
        if registration.email.trim().is_empty() {
            return Err(StoreError::Validation("email is required".to_string()));
        }
        if registration.area.trim().is_empty() {
            return Err(StoreError::Validation("area is required".to_string()));
        }

        let mut events = self.events.write().expect("store lock poisoned");
        let bucket = events.entry(registration.event_id.clone()).or_default();
        bucket.registrations.push(registration);
        Ok(())
    }

    fn remove_registration(&self, event_id: &str, registration_id: Uuid) -> Option<Registration> {
        let mut events = self.events.write().expect("store lock poisoned");
        let bucket = events.get_mut(event_id)?;
        let idx = bucket
            .registrations
            .iter()
            .position(|r| r.id == registration_id)?;
        Some(bucket.registrations.remove(idx))
    }

    fn get_registration(&self, event_id: &str, registration_id: Uuid) -> Option<Registration> {
        let events = self.events.read().expect("store lock poisoned");
        events
            .get(event_id)?
            .registrations
            .iter()
            .find(|r| r.id == registration_id)
            .cloned()
    }

    fn registrations(&self, event_id: &str) -> Vec<Registration> {
        let events = self.events.read().expect("store lock poisoned");
        events
            .get(event_id)
            .map(|b| b.registrations.clone())
            .unwrap_or_default()
    }
}

/// Sort key for search ordering: lower-cased full name, `None` when
/// missing or empty.
fn name_key(candidate: &Candidate) -> Option<String> {
    candidate
        .full_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.to_lowercase())
}
