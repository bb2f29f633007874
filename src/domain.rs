//! Domain module - core types and contracts of the reconciliation engine
//!
//! Everything the job runners agree on lives here: check outcomes, the
//! tracked-title records, the store and catalog contracts, and the
//! progress events shared with the control plane.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod check;
pub mod events;
pub mod manga;
pub mod repositories;
pub mod services;

// Re-export commonly used items for convenience
// Note: Be specific about re-exports to avoid ambiguous glob warnings
pub use check::{CheckKind, CheckOutcome, CheckRun, RunReport};
pub use events::{ProgressSender, ProgressUpdate, TriggerOutcome};
pub use manga::{DeepCheckCandidate, FailedTitle, TitleDetail, TrackedManga, UserPushTarget};
pub use repositories::WatermarkStore;
pub use services::{
    CatalogClient, CatalogError, FeedItem, FeedPage, FeedResponse, LatestChapter, PushResult,
    PushSender,
};
