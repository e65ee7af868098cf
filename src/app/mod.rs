//! Binary-side plumbing: config merging and terminal progress.

pub(crate) mod config;
pub(crate) mod progress_manager;

/// Every page completed.
pub(crate) const EXIT_SUCCESS: u8 = 0;
/// Bad arguments, config file or output directory; nothing was downloaded.
pub(crate) const EXIT_CONFIG_ERROR: u8 = 1;
/// The job ran but at least one page failed or was cancelled.
pub(crate) const EXIT_PARTIAL_FAILURE: u8 = 2;

/// Maps the job's failed page count to the process exit code.
pub(crate) fn exit_code_for(failed_pages: usize) -> u8 {
    if failed_pages == 0 {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL_FAILURE
    }
}
