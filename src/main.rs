//! CLI entry point for the page downloader.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use page_downloader::{
    DownloadJob, FsPageStore, HttpClient, JobController, PageStatus, RetryPolicy,
    SchedulerOptions,
};
use tracing::{debug, error, info, warn};

mod app;
mod cli;

use app::config::{self, Settings};
use app::progress_manager::PageProgress;
use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(app::EXIT_CONFIG_ERROR);
        }
    };

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(app::EXIT_CONFIG_ERROR)
        }
    }
}

/// Sets the job up, then polls it to completion. Errors are setup failures.
async fn run(args: Args) -> Result<u8> {
    let file_config = config::load_config(args.config.as_deref())?;
    let settings = Settings::resolve(&args, file_config.as_ref());
    debug!(?settings, "effective settings");

    let job = DownloadJob::new(&args.base_url, args.start, args.end, settings.batch_size)?;

    let client = HttpClient::try_new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )
    .context("Failed to build HTTP client")?
    .with_max_page_bytes(settings.max_page_bytes);

    let store = FsPageStore::create(&settings.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to prepare output directory '{}'",
                settings.output_dir.display()
            )
        })?;

    let options = SchedulerOptions {
        fetch_timeout: Some(settings.fetch_timeout),
        retry_policy: RetryPolicy::with_max_retries(settings.max_retries),
    };
    let controller = JobController::new(Arc::new(client), Arc::new(store), options);

    let total = job.page_count();
    info!(
        url = job.base_url_template(),
        start = job.start_page(),
        end = job.end_page(),
        batch_size = job.batch_size(),
        output_dir = %settings.output_dir.display(),
        "Page downloader starting"
    );
    controller.start_job(job)?;

    let progress = PageProgress::new(settings.progress, total);
    let (completed, failed) = poll_until_complete(&controller, &progress, &settings).await;
    progress.finish(completed, failed);

    info!(
        completed,
        failed,
        total,
        output_dir = %settings.output_dir.display(),
        "Download complete"
    );
    Ok(app::exit_code_for(failed))
}

/// Polls the controller every `poll_interval` until the job reports completion.
///
/// Ctrl-C cancels the job; polling continues so every page is accounted for.
async fn poll_until_complete(
    controller: &JobController,
    progress: &PageProgress,
    settings: &Settings,
) -> (usize, usize) {
    let mut interval = tokio::time::interval(settings.poll_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let mut completed = 0usize;
    let mut failed = 0usize;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                } else {
                    progress.suspend(|| warn!("Interrupted, cancelling remaining pages"));
                    controller.cancel();
                }
            }
        }

        let report = controller.poll_progress();
        for update in &report.updates {
            progress.record(update);
            match update.status {
                PageStatus::Completed => completed += 1,
                PageStatus::ErrorDownloading => {
                    failed += 1;
                    let (kind, reason) = update
                        .failure
                        .as_ref()
                        .map_or(("unknown", ""), |f| (f.kind.as_str(), f.message.as_str()));
                    progress.suspend(|| {
                        warn!(page = update.page, kind, reason, "Page failed");
                    });
                }
                PageStatus::Pending | PageStatus::Downloading => {}
            }
        }

        if report.complete {
            return (completed, failed);
        }
    }
}
