//! CLI argument definitions using clap derive macros.
//!
//! Tunables are optional here so that values from the config file can fill
//! whatever the command line leaves unset.

use std::path::PathBuf;

use clap::Parser;

/// Download the scanned pages of a book in concurrent batches.
///
/// Pages are fetched from `<BASE_URL><8-digit page number>.tif`, e.g.
/// `https://archive.example/data/book/PTIFF/00000012.tif`, for every page in
/// `[--start, --end)`, and written to the output directory.
#[derive(Parser, Debug)]
#[command(name = "page-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Base URL the zero-padded page number is appended to
    pub base_url: String,

    /// First page to download
    #[arg(short = 's', long)]
    pub start: u32,

    /// Page to stop before (exclusive)
    #[arg(short = 'e', long)]
    pub end: u32,

    /// Pages fetched concurrently per batch (1-1000) [default: 10]
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub batch_size: Option<u16>,

    /// Upper bound for one page fetch in seconds (1-3600) [default: 60]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub fetch_timeout: Option<u64>,

    /// HTTP connect timeout in seconds (1-3600) [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// HTTP read timeout in seconds (1-3600) [default: 300]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// Retries for transient failures (0-10) [default: 0]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Fail pages whose body exceeds this many bytes [default: unlimited]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_page_bytes: Option<u64>,

    /// Directory pages are written to [default: ./pages]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Milliseconds between progress polls (50-60000) [default: 5000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(50..=60_000))]
    pub poll_interval: Option<u64>,

    /// Config file to read instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
