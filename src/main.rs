// src/main.rs
use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;
use std::{
    io::{BufRead, IsTerminal, Write},
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

use depth_feed::{
    config::{
        DownloadConfig, OutputConfig, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        DEFAULT_FILE_SUFFIX,
    },
    engine::{EngineConfig, ParallelExecutor, SerialExecutor, StreamProcessor},
    metrics::Metrics,
    output,
    shutdown,
    source::{self, InputSource},
};

#[derive(ClapParser, Debug)]
#[command(name = "depth-feed", version, about = "Order book depth snapshots from a binary event feed")]
struct Cli {
    /// Price levels per side in each snapshot (positive integer)
    depth: Option<NonZeroUsize>,
    /// Feed file path or http(s) URL; standard input when omitted
    input: Option<String>,
    /// Parent directory of the per-run output directory
    #[arg(long, env = "DEPTH_FEED_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,
    /// Suffix appended to the symbol name of each output file
    #[arg(long, env = "DEPTH_FEED_FILE_SUFFIX", default_value = DEFAULT_FILE_SUFFIX)]
    file_suffix: String,
    /// Bytes per ranged download request
    #[arg(long, env = "DEPTH_FEED_DOWNLOAD_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    download_chunk_size: u64,
    /// Ranged download requests in flight
    #[arg(long, env = "DEPTH_FEED_DOWNLOAD_CONCURRENCY", default_value_t = DEFAULT_DOWNLOAD_CONCURRENCY)]
    download_concurrency: usize,
    /// Per-request download timeout
    #[arg(long, env = "DEPTH_FEED_DOWNLOAD_TIMEOUT_SECS", default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    download_timeout_secs: u64,
    /// Do not print snapshot lines to stdout
    #[arg(long, default_value_t = false)]
    no_echo: bool,
    /// Process files and URLs on a single task
    #[arg(long, default_value_t = false)]
    serial: bool,
}

#[tokio::main]
async fn main() {
    // stdout carries snapshot lines; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(mut cli: Cli) -> Result<()> {
    info!("depth-feed starting");
    if cli.depth.is_none() {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!("missing <DEPTH>; usage: depth-feed <DEPTH> [INPUT]"));
        }
        let (depth, input) = tokio::task::spawn_blocking(prompt_args).await??;
        cli.depth = Some(depth);
        cli.input = Some(input);
    }
    let depth = cli.depth.ok_or_else(|| anyhow!("missing <DEPTH>"))?;

    let stamp = chrono::Utc::now().timestamp();
    let input = InputSource::from_arg(cli.input.as_deref());
    let dl = DownloadConfig {
        chunk_size: cli.download_chunk_size,
        concurrency: cli.download_concurrency,
        timeout: Duration::from_secs(cli.download_timeout_secs),
    };
    let out = OutputConfig {
        out_dir: cli.out_dir.clone(),
        file_suffix: cli.file_suffix.clone(),
    };
    info!(task = stamp, depth = depth.get(), input = ?input, "task accepted");

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            trigger.trigger();
        }
    });

    tokio::fs::create_dir_all(&out.out_dir)
        .await
        .with_context(|| format!("create {:?}", out.out_dir))?;
    let (reader, temp) = source::open(&input, &out.out_dir, stamp, &dl).await?;

    let metrics = Arc::new(Metrics::new());
    let cfg = EngineConfig {
        depth,
        echo: !cli.no_echo,
    };

    let t0 = Instant::now();
    let report = if cli.serial || input.requires_serial() {
        info!("executor: serial");
        SerialExecutor::new(cfg, metrics.clone()).process(reader, shutdown).await?
    } else {
        info!("executor: parallel");
        ParallelExecutor::new(cfg, metrics.clone()).process(reader, shutdown).await?
    };
    drop(temp);

    info!(
        frames = report.stats.frames,
        skipped = report.stats.skipped,
        truncated = report.stats.truncated,
        snapshots = report.history.all.len(),
        symbols = report.history.symbols.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "processing complete"
    );

    let dir = output::write_history(&report, &out, stamp).await?;
    output::write_summary(&dir, &report, depth.get(), &metrics).await?;
    info!("snapshot files are in {:?}", dir);
    Ok(())
}

fn prompt_args() -> Result<(NonZeroUsize, String)> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut ask = |prompt: &str| -> Result<String> {
        eprint!("{prompt}");
        std::io::stderr().flush()?;
        match lines.next() {
            Some(line) => Ok(line?.trim().to_string()),
            None => Err(anyhow!("standard input closed")),
        }
    };

    let depth = loop {
        match ask("Price depth level <depth_levels>: ")?.parse::<NonZeroUsize>() {
            Ok(d) => break d,
            Err(_) => eprintln!("depth must be a positive integer"),
        }
    };
    let input = loop {
        let s = ask("Feed file path or URL: ")?;
        if !s.is_empty() {
            break s;
        }
    };
    Ok((depth, input))
}
