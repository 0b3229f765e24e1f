//! Tome core: pure domain model, endpoint health, chapter state machine and
//! document assembly. Nothing in this crate performs I/O.
mod assemble;
mod health;
mod ledger;
mod model;
mod progress;

pub use assemble::{chapter_heading, parse_document, render, ChapterText, RecoveredDocument};
pub use health::{EndpointHealthTracker, EndpointStat, DEFAULT_FAILURE_CEILING};
pub use ledger::{ChapterLedger, ChapterState, PassReport, RunSummary};
pub use model::{Chapter, ChapterEntry, ChapterId, FetchResult, Work};
pub use progress::{merge, ProgressSet};
