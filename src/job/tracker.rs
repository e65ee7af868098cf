//! Per-page progress tracking for the active job.
//!
//! The tracker holds two views behind one mutex: the cumulative status of
//! every page in the job's range, and a delta buffer of the changes made
//! since the last drain. Fetch tasks write disjoint pages concurrently while
//! pollers drain, so every read and write goes through the same lock.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{PageFailure, PageStatus, PageUpdate, ProgressReport};

#[derive(Debug, Default)]
struct TrackerState {
    range: Option<Range<u32>>,
    statuses: BTreeMap<u32, PageStatus>,
    delta: BTreeMap<u32, PageUpdate>,
    terminal: usize,
}

impl TrackerState {
    fn is_complete(&self) -> bool {
        self.range
            .as_ref()
            .is_some_and(|range| self.terminal == range.len())
    }
}

/// Concurrency-safe status map for the pages of one job.
///
/// Transitions follow `Pending -> Downloading -> {Completed | ErrorDownloading}`.
/// Terminal statuses are final: later marks for the same page are ignored, so
/// every page is counted as terminal exactly once.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Creates an idle tracker with no job range.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // A panicking writer cannot leave the maps half-updated, so the data
        // is still usable after poisoning.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears all state and seeds every page of `pages` as Pending.
    ///
    /// Seeding is not reported as a change; the first drain only contains
    /// pages the scheduler has touched.
    pub fn begin(&self, pages: Range<u32>) {
        let mut state = self.lock();
        *state = TrackerState::default();
        state.statuses = pages.clone().map(|page| (page, PageStatus::Pending)).collect();
        debug!(start = pages.start, end = pages.end, "tracker seeded");
        state.range = Some(pages);
    }

    /// Marks `page` as in flight.
    pub fn mark_downloading(&self, page: u32) {
        self.transition(page, PageStatus::Downloading, None);
    }

    /// Marks `page` as fetched and stored.
    pub fn mark_completed(&self, page: u32) {
        self.transition(page, PageStatus::Completed, None);
    }

    /// Marks `page` as failed.
    pub fn mark_error(&self, page: u32, failure: PageFailure) {
        self.transition(page, PageStatus::ErrorDownloading, Some(failure));
    }

    fn transition(&self, page: u32, status: PageStatus, failure: Option<PageFailure>) {
        let mut state = self.lock();

        let in_range = state.range.as_ref().is_some_and(|range| range.contains(&page));
        if !in_range {
            warn!(page, %status, "ignoring status for page outside the active job");
            return;
        }

        let current = state
            .statuses
            .get(&page)
            .copied()
            .unwrap_or(PageStatus::Pending);
        if current.is_terminal() {
            debug!(page, %current, %status, "ignoring status for page already terminal");
            return;
        }

        state.statuses.insert(page, status);
        if status.is_terminal() {
            state.terminal += 1;
        }
        state.delta.insert(
            page,
            PageUpdate {
                page,
                status,
                failure,
            },
        );
    }

    /// Takes every change recorded since the previous drain.
    ///
    /// Only the latest status of each page is kept, ordered by page number.
    #[must_use]
    pub fn drain(&self) -> Vec<PageUpdate> {
        let mut state = self.lock();
        std::mem::take(&mut state.delta).into_values().collect()
    }

    /// Returns true once every page of the job reached a terminal status.
    ///
    /// An idle tracker is never complete.
    #[must_use]
    pub fn is_job_complete(&self) -> bool {
        self.lock().is_complete()
    }

    /// Forgets the job range, all statuses and any undrained changes.
    pub fn reset(&self) {
        *self.lock() = TrackerState::default();
    }

    /// Drains the changes and checks completion under one lock.
    ///
    /// When the job is complete the tracker is reset in the same critical
    /// section, so the returned updates are the job's last ones.
    #[must_use]
    pub fn poll(&self) -> ProgressReport {
        let mut state = self.lock();
        let updates = std::mem::take(&mut state.delta).into_values().collect();
        let complete = state.is_complete();
        if complete {
            *state = TrackerState::default();
        }
        ProgressReport { updates, complete }
    }

    /// Returns the current status of `page`, or `None` outside the job range.
    #[must_use]
    pub fn status(&self, page: u32) -> Option<PageStatus> {
        self.lock().statuses.get(&page).copied()
    }

    /// Returns how many pages currently have `status`.
    #[must_use]
    pub fn count(&self, status: PageStatus) -> usize {
        self.lock()
            .statuses
            .values()
            .filter(|current| **current == status)
            .count()
    }

    /// Returns the cumulative status of every page in the job range.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<u32, PageStatus> {
        self.lock().statuses.clone()
    }

    /// Returns the number of pages in the job range (zero when idle).
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.lock().range.as_ref().map_or(0, ExactSizeIterator::len)
    }
}
