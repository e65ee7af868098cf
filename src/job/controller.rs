//! Single-job controller: start, poll, cancel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    BatchScheduler, DownloadJob, JobError, JobSummary, ProgressReport, ProgressTracker,
    SchedulerOptions,
};
use crate::download::PageFetcher;
use crate::store::PageStore;

struct ActiveJob {
    job: DownloadJob,
    cancel: CancellationToken,
    // Detached once completion is polled; kept so the run stays attributable.
    _handle: JoinHandle<JobSummary>,
}

/// Owns the one download job that may be active at a time.
///
/// [`start_job`](Self::start_job) spawns the job on a background tokio task
/// and returns immediately; clients then call
/// [`poll_progress`](Self::poll_progress) until it reports `complete`. That
/// poll releases the job, and the next start begins with a fresh tracker.
pub struct JobController {
    scheduler: BatchScheduler,
    tracker: Arc<ProgressTracker>,
    active: Mutex<Option<ActiveJob>>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("scheduler", &self.scheduler)
            .field("active", &self.active_job())
            .finish_non_exhaustive()
    }
}

impl JobController {
    /// Creates a controller with its own progress tracker.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn PageStore>,
        options: SchedulerOptions,
    ) -> Self {
        let tracker = Arc::new(ProgressTracker::new());
        Self {
            scheduler: BatchScheduler::new(fetcher, store, Arc::clone(&tracker), options),
            tracker,
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates the parameters and starts a job.
    ///
    /// # Errors
    ///
    /// See [`start_job`](Self::start_job); invalid parameters yield
    /// [`JobError::Configuration`] before anything is spawned.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime, like [`start_job`](Self::start_job).
    pub fn start(
        &self,
        base_url_template: impl Into<String>,
        start_page: u32,
        end_page: u32,
        batch_size: usize,
    ) -> Result<(), JobError> {
        let job = DownloadJob::new(base_url_template, start_page, end_page, batch_size)?;
        self.start_job(job)
    }

    /// Starts `job` on a background task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, since the job is spawned
    /// with [`tokio::spawn`].
    ///
    /// # Errors
    ///
    /// Returns [`JobError::AlreadyActive`] while a previous job is running or
    /// its completion has not been observed through
    /// [`poll_progress`](Self::poll_progress).
    #[instrument(skip(self, job), fields(start = job.start_page(), end = job.end_page(), batch_size = job.batch_size()))]
    pub fn start_job(&self, job: DownloadJob) -> Result<(), JobError> {
        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            warn!(
                active_start = current.job.start_page(),
                active_end = current.job.end_page(),
                "rejecting job while another is active"
            );
            return Err(JobError::AlreadyActive {
                start_page: current.job.start_page(),
                end_page: current.job.end_page(),
            });
        }

        self.tracker.begin(job.pages());

        let cancel = CancellationToken::new();
        let scheduler = self.scheduler.clone();
        let run_job = job.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(&run_job, &run_cancel).await });

        info!(url = job.base_url_template(), pages = job.page_count(), "job started");
        *active = Some(ActiveJob {
            job,
            cancel,
            _handle: handle,
        });
        Ok(())
    }

    /// Returns the changes since the previous poll and whether the job is done.
    ///
    /// The first report with `complete == true` releases the job so a new one
    /// can start. Polling with no active job returns an empty, incomplete report.
    pub fn poll_progress(&self) -> ProgressReport {
        let mut active = self.lock_active();
        let report = self.tracker.poll();
        if report.complete
            && let Some(finished) = active.take()
        {
            info!(
                start = finished.job.start_page(),
                end = finished.job.end_page(),
                "job complete, controller reset"
            );
        }
        debug!(updates = report.updates.len(), complete = report.complete, "progress polled");
        report
    }

    /// Requests cancellation of the active job.
    ///
    /// Returns false when no job is active. The job still has to be polled to
    /// completion; cancelled pages are reported as failed.
    pub fn cancel(&self) -> bool {
        let active = self.lock_active();
        match active.as_ref() {
            Some(current) => {
                info!(start = current.job.start_page(), end = current.job.end_page(), "cancelling job");
                current.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true while a job is running or awaiting its completing poll.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Returns a copy of the active job, if any.
    #[must_use]
    pub fn active_job(&self) -> Option<DownloadJob> {
        self.lock_active().as_ref().map(|current| current.job.clone())
    }

    /// Returns the tracker for cumulative views of the active job.
    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }
}
