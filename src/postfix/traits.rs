use super::controller::ApplyReport;
use crate::maps::MapPaths;

/// The mail server the maps are compiled for.
#[async_trait::async_trait]
pub trait MailServer: Send + Sync {
    /// Whether regex/pattern maps are understood at all. Probed once at startup.
    async fn has_advanced_pattern_support(&self) -> bool;

    /// Indexes the literal maps and asks the server to reload. Never fails:
    /// problems are logged and reported in the returned `ApplyReport`.
    async fn apply(&self, paths: &MapPaths) -> ApplyReport;
}
