mod pidfile;
mod sync;
mod trigger;

pub use pidfile::PidFile;
pub use sync::{ApplySummary, CycleOutcome, SyncEngine};
pub use trigger::{RefreshHandle, RefreshTrigger, WakeReason};
