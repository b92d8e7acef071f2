mod markdown;
mod telegram;

pub use markdown::{escape_markdown_v2, max_chars, spoiler_block_with_budget};
pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use error::SyncError;
use model::Platform;

/// Outcome of one scheduled job, handed to a [`Notifier`] for reporting.
/// Mirrors the job families the reference implementation reports on.
#[derive(Debug, Clone)]
pub enum JobSummary {
    Refresh {
        platform: Platform,
        synced: Vec<ProjectSummaryLine>,
        failed_count: usize,
    },
    QueueSync {
        platform: Platform,
        total_captured: usize,
        newly_discovered: Vec<ProjectSummaryLine>,
    },
    SearchSync {
        platform: Platform,
        total_discovered: usize,
        newly_discovered: Vec<ProjectSummaryLine>,
    },
    Categories {
        total: usize,
    },
    Tags {
        categories: usize,
        loaders: usize,
        game_versions: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ProjectSummaryLine {
    pub name: String,
    pub id: String,
    pub version_count: usize,
}

impl ProjectSummaryLine {
    pub fn render(&self) -> String {
        format!("{}({}): {}", self.name, self.id, self.version_count)
    }
}

/// Abstract summary sink, used only where the core emits job outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &JobSummary) -> Result<(), SyncError>;
}

/// No-op notifier for configurations that disable external notifications.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _summary: &JobSummary) -> Result<(), SyncError> {
        Ok(())
    }
}
