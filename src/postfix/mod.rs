mod controller;
mod notify;
mod traits;

pub use controller::{ApplyReport, ControllerPhase, PostfixController, StepOutcome};
pub use notify::notify_refresh;
pub use traits::MailServer;
