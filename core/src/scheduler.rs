use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a job is fired: a fixed interval, or a parsed cron expression
/// evaluated against wall-clock time.
pub enum Trigger {
    Interval(Duration),
    Cron(cron::Schedule),
}

impl Trigger {
    pub fn cron(expression: &str) -> Result<Self, error::SyncError> {
        expression
            .parse()
            .map(Trigger::Cron)
            .map_err(|e| error::SyncError::Config(format!("invalid cron expression {expression}: {e}")))
    }

    fn next_delay(&self, last_fire: chrono::DateTime<chrono::Utc>) -> Duration {
        match self {
            Trigger::Interval(d) => *d,
            Trigger::Cron(schedule) => schedule
                .after(&last_fire)
                .next()
                .map(|next| (next - last_fire).to_std().unwrap_or(Duration::from_secs(1)))
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

type JobBody = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A single scheduled job: a trigger, a `max_instances=1` guard, and a
/// handler closure. An overlapping fire is skipped with a warning rather
/// than queued — Tokio has no built-in job-overlap suppression, so this is
/// the idiomatic reading of "coalesce" for an async dispatcher.
struct Job {
    name: String,
    trigger: Trigger,
    running: Arc<AtomicBool>,
    body: JobBody,
}

/// Handle to a spawned job's background task, used for graceful shutdown.
pub struct JobHandle {
    name: String,
    task: tokio::task::JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the job's task to finish on its own (dropped loop iteration
    /// or a panic), without aborting it. Used to give a running job a grace
    /// period to wind down before `abort` is called as a last resort.
    pub async fn join(&mut self) {
        let _ = (&mut self.task).await;
    }
}

/// In-process job scheduler. Each registered job runs on its own Tokio
/// task so job A never blocks job B; job bodies are expected to dispatch
/// their own work onto a per-platform `workerpool::WorkerPool`.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { jobs: Vec::new() }
    }

    /// Registers a job. `enabled = false` still reserves the slot but the
    /// job never fires, matching the config's per-job `jobConfig` flag.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, trigger: Trigger, enabled: bool, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if !enabled {
            info!(job = %name, "job disabled by config, not scheduled");
            return;
        }
        self.jobs.push(Job {
            name,
            trigger,
            running: Arc::new(AtomicBool::new(false)),
            body: Box::new(move || Box::pin(handler())),
        });
    }

    /// Spawns one Tokio task per registered job and returns their handles.
    /// `run_immediately` mirrors the reference's `next_run_time=now()` jobs
    /// that fire once at startup before settling into their trigger cadence.
    /// `shutdown` is checked between fires: once it's cancelled, each job's
    /// loop exits after its current fire (if any) finishes instead of
    /// scheduling another one, giving the caller a clean join point for a
    /// bounded shutdown grace period.
    pub fn start(self, run_immediately: &[&str], shutdown: CancellationToken) -> Vec<JobHandle> {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            let Job { name, trigger, running, body } = job;
            let body = Arc::new(body);
            let fire_now = run_immediately.contains(&name.as_str());
            let task_name = name.clone();
            let shutdown = shutdown.clone();

            let task = tokio::spawn(async move {
                if fire_now {
                    fire(&task_name, &running, &body).await;
                }
                let mut last_fire = chrono::Utc::now();
                loop {
                    let delay = trigger.next_delay(last_fire);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => {
                            info!(job = %task_name, "shutdown requested, not scheduling another fire");
                            break;
                        }
                    }
                    last_fire = chrono::Utc::now();
                    fire(&task_name, &running, &body).await;
                }
            });

            handles.push(JobHandle { name, task });
        }
        handles
    }
}

async fn fire(name: &str, running: &Arc<AtomicBool>, body: &JobBody) {
    if running.swap(true, Ordering::SeqCst) {
        warn!(job = name, "job still running from a previous fire, skipping this one");
        return;
    }
    info!(job = name, "job firing");
    body().await;
    running.store(false, Ordering::SeqCst);
}

/// Resolves each standard job's trigger from the config's `interval`/
/// `cronTrigger` tables, matching spec.md's job inventory defaults.
pub fn default_interval_seconds(job_name: &str) -> u64 {
    let defaults: HashMap<&str, u64> = [
        ("cf.refresh", 2 * 3600),
        ("mr.refresh", 2 * 3600),
        ("cf.refreshFull", 48 * 3600),
        ("mr.refreshFull", 48 * 3600),
        ("cf.drainQueue", 5 * 60),
        ("mr.drainQueue", 5 * 60),
        ("cf.searchNew", 2 * 3600),
        ("mr.searchNew", 2 * 3600),
        ("cf.categories", 24 * 3600),
        ("mr.tags", 24 * 3600),
        ("stats", 24 * 3600),
    ]
    .into_iter()
    .collect();
    defaults.get(job_name).copied().unwrap_or(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn coalesces_overlapping_fires() {
        let running = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let body: JobBody = {
            let calls = calls.clone();
            Box::new(move || {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                })
            })
        };

        let (a, b) = tokio::join!(fire("test", &running, &body), fire("test", &running, &body));
        let _ = (a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_intervals_match_job_inventory() {
        assert_eq!(default_interval_seconds("cf.drainQueue"), 300);
        assert_eq!(default_interval_seconds("cf.refreshFull"), 48 * 3600);
    }
}
