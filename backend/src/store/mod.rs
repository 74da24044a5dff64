//! Candidate and registration storage.
//!
//! [`Store`] expresses the persistence contract the reconciliation core
//! relies on: atomic bulk replace partitioned by event, a conditional
//! test-and-set for conversion, and filtered scans for search. The store
//! itself evaluates the conversion condition under its own lock; callers
//! never get a read-then-write window.
//!
//! [`MemoryStore`] is the in-process implementation used by the server and
//! the test suite. Swapping in a database-backed store only requires the
//! same primitives.

mod memory;

pub use memory::MemoryStore;

use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{Candidate, Registration};

/// Maximum number of search results returned.
pub const SEARCH_LIMIT: usize = 50;

/// Persistence contract for candidates and registrations.
pub trait Store: Send + Sync {
    /// Atomically discard every candidate for `event_id` and install the
    /// new set. Readers never observe a mixture of old and new. Returns the
    /// number of candidates installed.
    ///
    /// Fails with `StoreError::Validation` (and changes nothing) if any
    /// candidate has an empty identifier value or a mismatched event id.
    fn replace_all(&self, event_id: &str, candidates: Vec<Candidate>) -> StoreResult<usize>;

    /// Candidates for the event, optionally excluding converted ones.
    fn list(&self, event_id: &str, only_unconverted: bool) -> Vec<Candidate>;

    /// Case-insensitive substring search over full name, email, national id
    /// and identifier value. At most [`SEARCH_LIMIT`] results, ordered by
    /// full name ascending with missing names last.
    fn search(&self, event_id: &str, query: &str, only_unconverted: bool) -> Vec<Candidate>;

    /// Fetch one candidate.
    fn get_candidate(&self, event_id: &str, candidate_id: Uuid) -> Option<Candidate>;

    /// Conditionally mark a candidate converted, linking it to
    /// `registration_id`. The condition (currently unconverted) is
    /// evaluated atomically inside the store; a candidate that is already
    /// converted rejects the write with `StoreError::AlreadyConverted`.
    fn mark_converted(
        &self,
        event_id: &str,
        candidate_id: Uuid,
        registration_id: Uuid,
    ) -> StoreResult<()>;

    /// Insert a registration. Fails with `StoreError::Validation` when a
    /// required field is empty.
    fn insert_registration(&self, registration: Registration) -> StoreResult<()>;

    /// Remove a registration, returning it if present. Used to discard the
    /// provisional registration of a lost conversion race.
    fn remove_registration(&self, event_id: &str, registration_id: Uuid) -> Option<Registration>;

    /// Fetch one registration.
    fn get_registration(&self, event_id: &str, registration_id: Uuid) -> Option<Registration>;

    /// All registrations for the event, oldest first.
    fn registrations(&self, event_id: &str) -> Vec<Registration>;
}
