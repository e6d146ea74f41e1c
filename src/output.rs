// src/output.rs
//! Persists a run's snapshot history as one text artifact per symbol.
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;
use tracing::info;

use crate::book::Side;
use crate::config::{OutputConfig, OUTPUT_DIR_PREFIX};
use crate::engine::RunReport;
use crate::metrics::Metrics;

/// File stem of the artifact holding every symbol's lines in emission order.
pub const AGGREGATE_NAME: &str = "All";

fn artifact_path(dir: &Path, stem: &str, suffix: &str) -> PathBuf {
    let stem: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
        .collect();
    dir.join(format!("{stem}{suffix}"))
}

/// Writes `<out_dir>/output-<stamp>/<SYMBOL><suffix>` for every symbol, plus
/// the aggregate artifact when more than one symbol emitted. The directory
/// must not exist yet.
pub async fn write_history(report: &RunReport, cfg: &OutputConfig, stamp: i64) -> Result<PathBuf> {
    let dir = cfg.out_dir.join(format!("{OUTPUT_DIR_PREFIX}{stamp}"));
    if tokio_fs::try_exists(&dir).await.unwrap_or(false) {
        bail!("output directory {:?} already exists", dir);
    }
    tokio_fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("create output directory {:?}", dir))?;

    let history = &report.history;
    for (symbol, lines) in &history.symbols {
        let path = artifact_path(&dir, &symbol.to_string(), &cfg.file_suffix);
        tokio_fs::write(&path, lines.join("\n"))
            .await
            .with_context(|| format!("write {:?}", path))?;
    }
    if history.symbols.len() > 1 {
        let path = artifact_path(&dir, AGGREGATE_NAME, &cfg.file_suffix);
        tokio_fs::write(&path, history.all.join("\n"))
            .await
            .with_context(|| format!("write {:?}", path))?;
    }

    info!("wrote {} symbol artifacts to {:?}", history.symbols.len(), dir);
    Ok(dir)
}

/// Final top-`depth` levels per symbol plus reader statistics.
pub fn build_summary(report: &RunReport, depth: usize) -> String {
    let mut symbols = serde_json::Map::new();
    for (symbol, book) in &report.books {
        symbols.insert(
            symbol.to_string(),
            json!({
                "snapshots": report.history.lines(*symbol).len(),
                "bids": book.levels_depth(Side::Bid, depth),
                "asks": book.levels_depth(Side::Ask, depth),
            }),
        );
    }

    json!({
        "type": "summary",
        "depth": depth,
        "stats": &report.stats,
        "failed": &report.failed,
        "cancelled": report.cancelled,
        "symbols": symbols,
    })
    .to_string()
}

pub async fn write_summary(dir: &Path, report: &RunReport, depth: usize, metrics: &Metrics) -> Result<()> {
    tokio_fs::write(dir.join("summary.json"), build_summary(report, depth))
        .await
        .context("write summary.json")?;
    tokio_fs::write(dir.join("metrics.prom"), metrics.prometheus_text())
        .await
        .context("write metrics.prom")?;
    Ok(())
}
