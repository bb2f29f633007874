//! Application layer: the job runners and their orchestration.
//!
//! Each runner implements one reconciliation job against the domain
//! contracts; the coordinator serializes runs per job kind and owns the
//! run log, the scheduler fires the cron triggers.

pub mod coordinator;
pub mod deep_check;
pub mod incremental;
pub mod notifications;
pub mod scheduler;
pub mod title_refresh;

pub use coordinator::RunCoordinator;
pub use deep_check::DeepCheckRunner;
pub use incremental::IncrementalScanner;
pub use notifications::NotificationDispatcher;
pub use scheduler::start_scheduler;
pub use title_refresh::TitleRefresher;
