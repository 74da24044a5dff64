//! Reconciliation: mapped rows to candidates, candidates to registrations.
//!
//! - [`candidates`] - build candidates from parsed rows and a validated mapping
//! - [`pipeline`] - the end-to-end upload flow (parse, classify, replace)
//! - [`engine`] - conversion under the at-most-one guarantee, manual quick-add

pub mod candidates;
pub mod engine;
pub mod pipeline;

pub use candidates::{build_candidates, BuildResult, SkippedRow};
pub use engine::{convert, quick_add, ConvertOptions, DEFAULT_AREA};
pub use pipeline::{run_upload, SheetInfo, UploadOptions, UploadOutcome};
