use crate::collector::{CleanReport, MediaCollector};
use crate::error::Result;
use crate::services::log::TracingReporter;
use media_api::{RecordCatalogue, Storage};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{error, info};

/// A collection run that can be handed to the blocking pool.
#[derive(Clone)]
pub struct CleanJob {
    catalogue: Arc<dyn RecordCatalogue>,
    storage: Arc<dyn Storage>,
    top: Option<String>,
}

impl CleanJob {
    pub fn new(catalogue: Arc<dyn RecordCatalogue>, storage: Arc<dyn Storage>) -> Self {
        Self {
            catalogue,
            storage,
            top: None,
        }
    }

    /// Restrict runs to a sub-directory of the storage.
    pub fn with_top(mut self, top: Option<String>) -> Self {
        self.top = top;
        self
    }

    pub fn run_once(&self, dry_run: bool) -> Result<CleanReport> {
        let collector = MediaCollector::new(
            self.catalogue.as_ref(),
            self.storage.as_ref(),
            &TracingReporter,
        );
        if dry_run {
            collector.preview(self.top.as_deref())
        } else {
            collector.run(self.top.as_deref())
        }
    }

    /// Run on tokio's blocking pool; the collector does synchronous I/O.
    pub async fn run_blocking(&self, dry_run: bool) -> Result<CleanReport> {
        let job = self.clone();
        tokio::task::spawn_blocking(move || job.run_once(dry_run)).await?
    }
}

/// Run `job` every `every`, starting one period from now. A run never
/// overlaps the previous one; failures are logged and retried next tick.
pub fn spawn_schedule(job: CleanJob, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval_at(Instant::now() + every, every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match job.run_blocking(false).await {
                Ok(report) => info!(
                    "scheduled media cleaning {} done: {} deleted, {} not found",
                    report.run_id, report.outcome.deleted, report.outcome.not_found
                ),
                Err(err) => error!("scheduled media cleaning failed: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteCatalogue;
    use crate::model::backend_registry;
    use crate::services::storage::MemoryStorage;

    fn job(storage: Arc<MemoryStorage>) -> CleanJob {
        let catalogue = SqliteCatalogue::open_in_memory(backend_registry()).unwrap();
        CleanJob::new(Arc::new(catalogue), storage)
    }

    #[tokio::test]
    async fn dry_run_on_blocking_pool() {
        let storage = Arc::new(MemoryStorage::with_files(["misc/orphan.txt"]));
        let report = job(storage.clone()).run_blocking(true).await.unwrap();
        assert_eq!(report.deletable, vec!["misc/orphan.txt"]);
        assert_eq!(storage.files(), vec!["misc/orphan.txt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_waits_one_period_then_runs() {
        let storage = Arc::new(MemoryStorage::with_files(["scratch/orphan.txt", "keep.txt"]));
        let every = Duration::from_secs(3600);
        let handle = spawn_schedule(job(storage.clone()).with_top(Some("scratch".into())), every);
        // let the task start its interval at the current instant
        tokio::task::yield_now().await;

        time::advance(every - Duration::from_secs(1)).await;
        assert_eq!(storage.files(), vec!["keep.txt", "scratch/orphan.txt"]);

        time::sleep(Duration::from_secs(2)).await;
        handle.abort();
        assert_eq!(storage.files(), vec!["keep.txt"]);
    }
}
