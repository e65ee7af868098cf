//! Batch scheduler: fixed-size fork-join over a page range.
//!
//! The range is cut into consecutive batches of `batch_size` pages. Each
//! batch fans out one tokio task per page and joins all of them before the
//! next batch starts, so at most `batch_size` fetches are ever in flight.
//! Within a batch, pages finish in whatever order the network allows.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{DownloadJob, FailureKind, PageFailure, ProgressTracker};
use crate::download::constants::DEFAULT_FETCH_TIMEOUT;
use crate::download::{
    FetchError, FetchResult, PageFetcher, RetryDecision, RetryPolicy, classify_error,
};
use crate::store::PageStore;

/// Splits `pages` into consecutive batches of at most `batch_size` pages.
///
/// Only the last batch may be shorter. A zero `batch_size` is treated as 1.
#[must_use]
pub fn partition_batches(pages: Range<u32>, batch_size: usize) -> Vec<Range<u32>> {
    let step = u32::try_from(batch_size.max(1)).unwrap_or(u32::MAX);
    let mut batches = Vec::new();
    let mut start = pages.start;
    while start < pages.end {
        let end = start.saturating_add(step).min(pages.end);
        batches.push(start..end);
        start = end;
    }
    batches
}

/// Per-fetch behaviour applied by the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Upper bound for a single fetch attempt; `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
    /// Retry policy for transient failures (single attempt by default).
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Some(DEFAULT_FETCH_TIMEOUT),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Counters collected over one job run.
///
/// Uses atomic counters for thread-safe updates from concurrent fetch tasks.
#[derive(Debug, Default)]
pub struct JobSummary {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl JobSummary {
    /// Creates a new summary with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pages fetched and stored.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of pages that ended in error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the total number of pages that reached a terminal status.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    /// Returns the number of retry attempts made.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs a job's batches against a fetcher, a store and a tracker.
#[derive(Clone)]
pub struct BatchScheduler {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn PageStore>,
    tracker: Arc<ProgressTracker>,
    options: SchedulerOptions,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BatchScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn PageStore>,
        tracker: Arc<ProgressTracker>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            tracker,
            options,
        }
    }

    /// Processes every batch of `job` in order and returns the run's counters.
    ///
    /// The tracker must already be seeded with the job's range. Individual
    /// page failures never abort the run. Once `cancel` fires, in-flight
    /// fetches are abandoned and every remaining page is marked failed with
    /// [`FailureKind::Cancelled`], so the job still reaches completion.
    /// A page whose bytes already arrived is still saved to completion.
    #[instrument(skip(self, job, cancel), fields(start = job.start_page(), end = job.end_page(), batch_size = job.batch_size()))]
    pub async fn run(&self, job: &DownloadJob, cancel: &CancellationToken) -> JobSummary {
        let summary = Arc::new(JobSummary::new());
        let batches = partition_batches(job.pages(), job.batch_size());

        info!(pages = job.page_count(), batches = batches.len(), "starting job");

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = batch.start..job.end_page();
                warn!(from = remaining.start, "job cancelled, abandoning remaining pages");
                for page in remaining {
                    self.tracker.mark_error(page, PageFailure::cancelled());
                    summary.increment_failed();
                }
                break;
            }

            debug!(batch = index, start = batch.start, end = batch.end, "dispatching batch");
            self.run_batch(job, batch.clone(), cancel, &summary).await;
        }

        let completed = summary.completed();
        let failed = summary.failed();
        let retried = summary.retried();
        info!(completed, failed, retried, total = completed + failed, "job finished");

        // All page tasks are joined, so this is normally the only reference.
        Arc::try_unwrap(summary).unwrap_or_else(|shared| {
            let copy = JobSummary::new();
            copy.completed.store(shared.completed(), Ordering::SeqCst);
            copy.failed.store(shared.failed(), Ordering::SeqCst);
            copy.retried.store(shared.retried(), Ordering::SeqCst);
            copy
        })
    }

    /// Fans out one task per page of `batch` and joins them all.
    async fn run_batch(
        &self,
        job: &DownloadJob,
        batch: Range<u32>,
        cancel: &CancellationToken,
        summary: &Arc<JobSummary>,
    ) {
        for page in batch.clone() {
            self.tracker.mark_downloading(page);
        }

        let mut handles: Vec<(u32, JoinHandle<()>)> = Vec::with_capacity(batch.len());
        for page in batch {
            let url = job.page_url(page);
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let tracker = Arc::clone(&self.tracker);
            let summary = Arc::clone(summary);
            let options = self.options.clone();
            let cancel = cancel.clone();

            handles.push((
                page,
                tokio::spawn(async move {
                    let result =
                        fetch_with_retry(fetcher.as_ref(), page, &url, &options, &cancel, &summary)
                            .await;
                    handle_result(result, store.as_ref(), &tracker, &summary).await;
                }),
            ));
        }

        debug!(task_count = handles.len(), "waiting for batch to complete");

        for (page, handle) in handles {
            if let Err(e) = handle.await {
                warn!(page, error = %e, "page task panicked");
                self.tracker.mark_error(
                    page,
                    PageFailure {
                        kind: FailureKind::Network,
                        message: format!("page task panicked: {e}"),
                    },
                );
                summary.increment_failed();
            }
        }
    }
}

/// Stores a fetched page and records its terminal status.
///
/// The save is not raced against cancellation.
async fn handle_result(
    result: FetchResult,
    store: &dyn PageStore,
    tracker: &ProgressTracker,
    summary: &JobSummary,
) {
    let page = result.page;
    let bytes = match result.outcome {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(page, error = %e, "page fetch failed");
            tracker.mark_error(page, PageFailure::from(&e));
            summary.increment_failed();
            return;
        }
    };

    match store.save(page, &bytes).await {
        Ok(()) => {
            debug!(page, bytes = bytes.len(), "page completed");
            tracker.mark_completed(page);
            summary.increment_completed();
        }
        Err(e) => {
            warn!(page, error = %e, "page store failed");
            tracker.mark_error(page, PageFailure::from(&e));
            summary.increment_failed();
        }
    }
}

/// Fetches a page, applying the timeout, retry policy and cancellation.
#[instrument(skip(fetcher, options, cancel, summary))]
async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    page: u32,
    url: &str,
    options: &SchedulerOptions,
    cancel: &CancellationToken,
    summary: &JobSummary,
) -> FetchResult {
    let policy = &options.retry_policy;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting fetch");

        let error = match fetch_once(fetcher, url, options.fetch_timeout, cancel).await {
            Ok(bytes) => {
                return FetchResult {
                    page,
                    outcome: Ok(bytes),
                };
            }
            Err(e) => e,
        };

        match policy.should_retry(classify_error(&error), attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                info!(
                    url,
                    attempt = next_attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying fetch"
                );
                summary.increment_retried();
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return FetchResult {
                            page,
                            outcome: Err(FetchError::cancelled(url)),
                        };
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url, %reason, attempts = attempt, "not retrying fetch");
                return FetchResult {
                    page,
                    outcome: Err(error),
                };
            }
        }
    }
}

async fn fetch_once(
    fetcher: &dyn PageFetcher,
    url: &str,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    let fetch = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fetcher.fetch(url))
                .await
                .unwrap_or_else(|_| Err(FetchError::timeout(url))),
            None => fetcher.fetch(url).await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FetchError::cancelled(url)),
        result = fetch => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::job::PageStatus;
    use crate::store::{MemoryPageStore, StoreError};

    const TEMPLATE: &str = "http://archive.test/book/";

    /// Fetcher double: fails listed pages with 404, records peak concurrency.
    #[derive(Default)]
    struct ScriptedFetcher {
        fail_pages: HashSet<u32>,
        transient_failures: AtomicUsize,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn page_of(url: &str) -> u32 {
            url.trim_end_matches(".tif")
                .rsplit('/')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let page = Self::page_of(url);
            if self.fail_pages.contains(&page) {
                return Err(FetchError::http_status(url, 404));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FetchError::http_status(url, 503));
            }
            Ok(format!("page-{page}").into_bytes())
        }
    }

    /// Store double that records calls and refuses listed pages.
    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<u32>>,
        refuse: HashSet<u32>,
    }

    #[async_trait]
    impl PageStore for RecordingStore {
        async fn save(&self, page: u32, _bytes: &[u8]) -> Result<(), StoreError> {
            if self.refuse.contains(&page) {
                return Err(StoreError::rejected(page, "refused"));
            }
            self.saved.lock().unwrap().push(page);
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FetchEvent {
        Started(u32),
        Finished(u32),
    }

    /// Fetcher double that logs start and finish of every fetch.
    struct LoggingFetcher {
        slow_page: u32,
        slow_delay: Duration,
        events: Mutex<Vec<FetchEvent>>,
    }

    #[async_trait]
    impl PageFetcher for LoggingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let page = ScriptedFetcher::page_of(url);
            self.events.lock().unwrap().push(FetchEvent::Started(page));
            let delay = if page == self.slow_page {
                self.slow_delay
            } else {
                Duration::from_millis(1)
            };
            tokio::time::sleep(delay).await;
            self.events.lock().unwrap().push(FetchEvent::Finished(page));
            Ok(vec![0; 8])
        }
    }

    /// Store double whose saves take a fixed time.
    struct SlowStore {
        delay: Duration,
        inner: MemoryPageStore,
    }

    #[async_trait]
    impl PageStore for SlowStore {
        async fn save(&self, page: u32, bytes: &[u8]) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(page, bytes).await
        }
    }

    fn scheduler_with(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn PageStore>,
        options: SchedulerOptions,
    ) -> (BatchScheduler, Arc<ProgressTracker>) {
        let tracker = Arc::new(ProgressTracker::new());
        (
            BatchScheduler::new(fetcher, store, Arc::clone(&tracker), options),
            tracker,
        )
    }

    #[test]
    fn test_partition_even_batches() {
        assert_eq!(partition_batches(0..10, 5), vec![0..5, 5..10]);
    }

    #[test]
    fn test_partition_short_last_batch() {
        assert_eq!(partition_batches(3..10, 4), vec![3..7, 7..10]);
        assert_eq!(partition_batches(0..1, 10), vec![0..1]);
    }

    #[test]
    fn test_partition_batch_size_one() {
        assert_eq!(partition_batches(5..8, 1), vec![5..6, 6..7, 7..8]);
    }

    #[test]
    fn test_partition_empty_range() {
        assert!(partition_batches(5..5, 3).is_empty());
    }

    #[test]
    fn test_partition_zero_batch_treated_as_one() {
        assert_eq!(partition_batches(0..2, 0), vec![0..1, 1..2]);
    }

    #[test]
    fn test_partition_near_u32_max() {
        let batches = partition_batches(u32::MAX - 3..u32::MAX, 2);
        assert_eq!(batches, vec![u32::MAX - 3..u32::MAX - 1, u32::MAX - 1..u32::MAX]);
    }

    #[test]
    fn test_default_options() {
        let options = SchedulerOptions::default();
        assert_eq!(options.fetch_timeout, Some(DEFAULT_FETCH_TIMEOUT));
        assert_eq!(options.retry_policy.max_attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_two_batches_all_complete() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let store = MemoryPageStore::new();
        let (scheduler, tracker) = scheduler_with(
            fetcher.clone(),
            Arc::new(store.clone()),
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 10, 5).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.completed(), 10);
        assert_eq!(summary.failed(), 0);
        assert!(tracker.is_job_complete());
        assert_eq!(tracker.count(PageStatus::Completed), 10);
        let updates = tracker.drain();
        assert_eq!(updates.len(), 10, "one terminal update per page, no duplicates");
        assert_eq!(store.pages(), (0..10).collect::<Vec<_>>());
        assert_eq!(store.get(3).unwrap(), b"page-3");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_never_exceeds_batch_size_in_flight() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Duration::from_millis(20),
            ..ScriptedFetcher::default()
        });
        let (scheduler, tracker) = scheduler_with(
            fetcher.clone(),
            Arc::new(MemoryPageStore::new()),
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 23, 4).unwrap();
        tracker.begin(job.pages());

        let watcher = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let mut max_downloading = 0;
                while !tracker.is_job_complete() {
                    max_downloading = max_downloading.max(tracker.count(PageStatus::Downloading));
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                max_downloading
            })
        };

        scheduler.run(&job, &CancellationToken::new()).await;

        assert!(fetcher.peak.load(Ordering::SeqCst) <= 4);
        assert!(fetcher.peak.load(Ordering::SeqCst) >= 2, "batch pages should overlap");
        assert!(watcher.await.unwrap() <= 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_failed_page_is_isolated_and_not_stored() {
        let fetcher = Arc::new(ScriptedFetcher {
            fail_pages: HashSet::from([7]),
            ..ScriptedFetcher::default()
        });
        let store = Arc::new(RecordingStore::default());
        let (scheduler, tracker) =
            scheduler_with(fetcher, store.clone(), SchedulerOptions::default());
        let job = DownloadJob::new(TEMPLATE, 0, 10, 5).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.completed(), 9);
        assert_eq!(summary.failed(), 1);
        assert_eq!(tracker.status(7), Some(PageStatus::ErrorDownloading));
        for page in (5..10).filter(|p| *p != 7) {
            assert_eq!(tracker.status(page), Some(PageStatus::Completed));
        }
        let saved = store.saved.lock().unwrap().clone();
        assert!(!saved.contains(&7), "store must not be called for page 7");
        assert_eq!(saved.len(), 9);

        let failure = tracker
            .drain()
            .into_iter()
            .find(|u| u.page == 7)
            .and_then(|u| u.failure)
            .unwrap();
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.message.contains("404"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_store_failure_marks_page_error() {
        let store = Arc::new(RecordingStore {
            refuse: HashSet::from([2]),
            ..RecordingStore::default()
        });
        let (scheduler, tracker) = scheduler_with(
            Arc::new(ScriptedFetcher::default()),
            store,
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 4, 2).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.failed(), 1);
        assert!(tracker.is_job_complete());
        let update = tracker.drain().into_iter().find(|u| u.page == 2).unwrap();
        assert_eq!(update.status, PageStatus::ErrorDownloading);
        assert_eq!(update.failure.unwrap().kind, FailureKind::Store);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_retries_transient_failures_when_enabled() {
        let fetcher = Arc::new(ScriptedFetcher {
            transient_failures: AtomicUsize::new(2),
            ..ScriptedFetcher::default()
        });
        let options = SchedulerOptions {
            retry_policy: RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(5),
                2.0,
            )
            .with_jitter(Duration::ZERO),
            ..SchedulerOptions::default()
        };
        let (scheduler, tracker) =
            scheduler_with(fetcher.clone(), Arc::new(MemoryPageStore::new()), options);
        let job = DownloadJob::new(TEMPLATE, 0, 1, 1).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.completed(), 1);
        assert_eq!(summary.retried(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_without_retries_fails_transient_once() {
        let fetcher = Arc::new(ScriptedFetcher {
            transient_failures: AtomicUsize::new(1),
            ..ScriptedFetcher::default()
        });
        let (scheduler, tracker) = scheduler_with(
            fetcher.clone(),
            Arc::new(MemoryPageStore::new()),
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 1, 1).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.retried(), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_fetch_timeout_marks_network_error() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Duration::from_secs(30),
            ..ScriptedFetcher::default()
        });
        let options = SchedulerOptions {
            fetch_timeout: Some(Duration::from_millis(20)),
            ..SchedulerOptions::default()
        };
        let (scheduler, tracker) =
            scheduler_with(fetcher, Arc::new(MemoryPageStore::new()), options);
        let job = DownloadJob::new(TEMPLATE, 0, 2, 2).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;

        assert_eq!(summary.failed(), 2);
        let updates = tracker.drain();
        assert!(updates.iter().all(|u| {
            u.failure
                .as_ref()
                .is_some_and(|f| f.kind == FailureKind::Network && f.message.contains("timeout"))
        }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_cancelled_marks_remaining_pages() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Duration::from_secs(30),
            ..ScriptedFetcher::default()
        });
        let options = SchedulerOptions {
            fetch_timeout: None,
            ..SchedulerOptions::default()
        };
        let (scheduler, tracker) =
            scheduler_with(fetcher, Arc::new(MemoryPageStore::new()), options);
        let job = DownloadJob::new(TEMPLATE, 0, 6, 2).unwrap();
        tracker.begin(job.pages());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let summary = scheduler.run(&job, &cancel).await;

        assert_eq!(summary.completed(), 0);
        assert_eq!(summary.failed(), 6);
        assert!(tracker.is_job_complete());
        let updates = tracker.drain();
        assert_eq!(updates.len(), 6);
        assert!(updates.iter().all(|u| {
            u.failure
                .as_ref()
                .is_some_and(|f| f.kind == FailureKind::Cancelled)
        }));
    }

    #[tokio::test]
    async fn test_run_next_batch_waits_for_slowest_page() {
        let fetcher = Arc::new(LoggingFetcher {
            slow_page: 1,
            slow_delay: Duration::from_millis(100),
            events: Mutex::new(Vec::new()),
        });
        let (scheduler, tracker) = scheduler_with(
            fetcher.clone(),
            Arc::new(MemoryPageStore::new()),
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 9, 3).unwrap();
        tracker.begin(job.pages());

        let summary = scheduler.run(&job, &CancellationToken::new()).await;
        assert_eq!(summary.completed(), 9);

        let events = fetcher.events.lock().unwrap().clone();
        let position = |event: FetchEvent| events.iter().position(|e| *e == event).unwrap();

        for page in 3..9 {
            assert!(
                position(FetchEvent::Started(page)) > position(FetchEvent::Finished(1)),
                "page {page} started before the slow page of batch 0 finished"
            );
        }
        for (batch, next) in [(0..3, 3..6), (3..6, 6..9)] {
            let next_first = next
                .map(|page| position(FetchEvent::Started(page)))
                .min()
                .unwrap();
            for page in batch {
                assert!(
                    position(FetchEvent::Finished(page)) < next_first,
                    "page {page} still in flight when the next batch started"
                );
            }
        }

        let started: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                FetchEvent::Started(page) => Some(*page),
                FetchEvent::Finished(_) => None,
            })
            .collect();
        let dispatched: Vec<Vec<u32>> = started
            .chunks(3)
            .map(|chunk| {
                let mut chunk = chunk.to_vec();
                chunk.sort_unstable();
                chunk
            })
            .collect();
        assert_eq!(dispatched, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_cancel_during_save_keeps_saved_pages() {
        let store = MemoryPageStore::new();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (scheduler, tracker) = scheduler_with(
            fetcher,
            Arc::new(SlowStore {
                delay: Duration::from_millis(150),
                inner: store.clone(),
            }),
            SchedulerOptions::default(),
        );
        let job = DownloadJob::new(TEMPLATE, 0, 4, 2).unwrap();
        tracker.begin(job.pages());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let summary = scheduler.run(&job, &cancel).await;

        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(store.pages(), vec![0, 1]);
        assert_eq!(tracker.status(0), Some(PageStatus::Completed));
        assert_eq!(tracker.status(1), Some(PageStatus::Completed));
        assert_eq!(tracker.status(2), Some(PageStatus::ErrorDownloading));
        assert_eq!(tracker.status(3), Some(PageStatus::ErrorDownloading));
    }
}
