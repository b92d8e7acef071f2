mod batch_writer;
mod checker;
mod project_sync;
mod queue_drainer;
mod scheduler;
mod search_discovery;

pub use batch_writer::BatchWriter;
pub use checker::{CheckOutcome, check_curseforge_page, check_modrinth_page};
pub use project_sync::{CfSyncConfig, MrSyncConfig, sync_curseforge_project, sync_modrinth_project};
pub use queue_drainer::{drain_curseforge_queues, drain_modrinth_queues};
pub use scheduler::{JobHandle, Scheduler, Trigger, default_interval_seconds};
pub use search_discovery::{SearchConfig, discover_curseforge, discover_modrinth};
