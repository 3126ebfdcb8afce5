use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chunkdl::config::DEFAULT_CHUNK_SIZE;
use chunkdl::progress::ProgressObserver;
use chunkdl::{DownloadTask, DownloaderConfig, ProgressState, RetryPolicy, download};

#[derive(Parser)]
#[command(name = "chunkdl")]
#[command(about = "Download a file over HTTP using concurrent range requests")]
#[command(version)]
struct Cli {
    #[arg(help = "URL to download")]
    url: String,
    #[arg(help = "Output path (defaults to the last segment of the URL path)")]
    output: Option<PathBuf>,
    #[arg(short, long, help = "concurrency", default_value_t = 4)]
    concurrency: usize,
    #[arg(long, help = "Expected SHA-256 of the file, hex")]
    sha256: Option<String>,
    #[arg(long, help = "Chunk size in bytes", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,
    #[arg(long, help = "Attempts per chunk before giving up", default_value_t = 5)]
    retries: u32,
    #[arg(long, help = "Reuse completed chunks left by an earlier failed run")]
    resume: bool,
    #[arg(short, long, help = "Hide the progress bar")]
    quiet: bool,
    #[arg(short, long, action = clap::ArgAction::Count, help = "More logging (-v, -vv)")]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(desc: String) -> (ProgressObserver, Arc<Mutex<Option<tqdm::Tqdm<()>>>>) {
    let bar: Arc<Mutex<Option<tqdm::Tqdm<()>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&bar);
    let observer: ProgressObserver = Arc::new(move |delta, _done, total| {
        let Ok(mut guard) = slot.lock() else { return };
        let pbar = guard.get_or_insert_with(|| {
            let total = (total > 0).then_some(total as usize);
            tqdm::pbar(total).desc(Some(desc.clone()))
        });
        let _ = pbar.update(delta as usize);
    });
    (observer, bar)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut task = DownloadTask::new(cli.url, cli.output)
        .with_concurrency(cli.concurrency)
        .with_resume(cli.resume);
    if let Some(digest) = cli.sha256 {
        task = task.with_expected_sha256(digest);
    }

    let config = DownloaderConfig {
        chunk_size: cli.chunk_size,
        retry: RetryPolicy {
            max_attempts: cli.retries,
            ..RetryPolicy::default()
        },
        ..DownloaderConfig::default()
    };

    let (progress, bar) = if cli.quiet {
        (Arc::new(ProgressState::new()), None)
    } else {
        let (observer, bar) = progress_bar(task.destination.display().to_string());
        (Arc::new(ProgressState::with_observer(observer)), Some(bar))
    };

    let result = download(&task, config, progress).await;

    if let Some(bar) = bar {
        if let Ok(mut guard) = bar.lock() {
            if let Some(mut pbar) = guard.take() {
                let _ = pbar.close();
            }
        }
    }

    match result {
        Ok(report) => {
            println!("Saved: {} ({} bytes, sha256 {})", report.metadata.file, report.metadata.size, report.metadata.sha256);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
