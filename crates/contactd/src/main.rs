//! Contact lookup demo - repeated lookups served from the memo cache

mod runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use contactcache::{ContactRepository, MemoConfig, RepositoryConfig};
use contactdb::LoaderConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::runner::{Mode, Runner};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Contact ids to look up, in order
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "1,2,3,1,1",
        allow_negative_numbers = true
    )]
    ids: Vec<i64>,

    /// Artificial loader delay in milliseconds
    #[arg(short, long, default_value_t = 4000)]
    delay_ms: u64,

    /// Give up waiting on another lookup's in-flight load after this many milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Issue all lookups concurrently
    #[arg(short, long)]
    parallel: bool,

    /// Also print each contact as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            loader: LoaderConfig::with_delay(Duration::from_millis(self.delay_ms)),
            memo: MemoConfig {
                wait_timeout: self.wait_timeout_ms.map(Duration::from_millis),
            },
        }
    }

    fn mode(&self) -> Mode {
        if self.parallel {
            Mode::Parallel
        } else {
            Mode::Sequential
        }
    }
}

/// `RUST_LOG` as given, or `info` when unset or unparsable
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let args = Args::parse();

    info!("Starting contactd v{}", env!("CARGO_PKG_VERSION"));
    info!("Loader delay: {}ms", args.delay_ms);
    if let Some(timeout) = args.wait_timeout_ms {
        info!("Wait timeout: {}ms", timeout);
    }

    let repo = ContactRepository::new(args.repository_config())
        .context("Failed to build contact repository")?;

    // Ctrl-C fails the loads in flight and skips the lookups not yet started
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    let cancel = repo.cancel_token().clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        cancel.cancel();
    })
    .context("Failed to set Ctrl-C handler")?;

    Runner::new(&repo, args.json, running).run(&args.ids, args.mode())?;

    let stats = repo.stats();
    info!(
        hits = stats.hits(),
        misses = stats.misses(),
        loads = stats.loads(),
        coalesced = stats.coalesced(),
        cached = repo.cached_len(),
        "Done, hit ratio {:.2}",
        stats.hit_ratio()
    );

    Ok(())
}
