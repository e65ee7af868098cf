//! Progress bar for a page download job.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use page_downloader::{PageStatus, PageUpdate};

/// Terminal progress over the pages of one job.
///
/// Only terminal updates advance the bar. When disabled every method is a no-op.
pub(crate) struct PageProgress {
    bar: Option<ProgressBar>,
}

impl PageProgress {
    pub(crate) fn new(enabled: bool, total_pages: usize) -> Self {
        if !enabled {
            return Self { bar: None };
        }

        let bar = ProgressBar::new(total_pages as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar: Some(bar) }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// Advances the bar for a page that reached a terminal status.
    pub(crate) fn record(&self, update: &PageUpdate) {
        let Some(bar) = &self.bar else {
            return;
        };
        match update.status {
            PageStatus::Completed | PageStatus::ErrorDownloading => {
                bar.inc(1);
                bar.set_message(format!("(last: page {} {})", update.page, update.status));
            }
            PageStatus::Pending | PageStatus::Downloading => {}
        }
    }

    /// Runs `f` with the bar hidden so log lines do not tear it.
    pub(crate) fn suspend<F: FnOnce()>(&self, f: F) {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    pub(crate) fn finish(&self, completed: usize, failed: usize) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("done: {completed} completed, {failed} failed"));
        }
    }

    #[cfg(test)]
    fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }
}
