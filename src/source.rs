// src/source.rs
//! Selection and opening of the feed byte source.
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::config::{DownloadConfig, DOWNLOAD_TEMP_SUFFIX};
use crate::download;

pub type FeedReader = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Url(String),
    Stdin,
}

impl InputSource {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            None | Some("") | Some("-") => InputSource::Stdin,
            Some(s) if is_url(s) => InputSource::Url(s.to_string()),
            Some(s) => InputSource::File(PathBuf::from(s)),
        }
    }

    /// Stdin can only be consumed by one task, so it always runs serially.
    pub fn requires_serial(&self) -> bool {
        matches!(self, InputSource::Stdin)
    }
}

fn is_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Downloaded feed on disk; removed when dropped.
#[derive(Debug)]
pub struct TempFeed {
    path: PathBuf,
}

impl TempFeed {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFeed {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = ?self.path, "removed downloaded feed"),
            Err(e) => warn!(path = ?self.path, error = %e, "could not remove downloaded feed"),
        }
    }
}

pub fn open_file(path: &Path) -> Result<FeedReader> {
    let f = File::open(path).with_context(|| format!("open feed {:?}", path))?;
    let mmap = unsafe { Mmap::map(&f).with_context(|| format!("map feed {:?}", path))? };
    info!("input(file): {:?} bytes={}", path, mmap.len());
    Ok(Box::new(Cursor::new(mmap)))
}

/// Opens `source`. A URL is downloaded into `scratch_dir` first; keep the
/// returned [`TempFeed`] alive until processing is done.
pub async fn open(
    source: &InputSource,
    scratch_dir: &Path,
    stamp: i64,
    dl: &DownloadConfig,
) -> Result<(FeedReader, Option<TempFeed>)> {
    match source {
        InputSource::File(path) => Ok((open_file(path)?, None)),
        InputSource::Url(url) => {
            let dest = scratch_dir.join(format!("{stamp}{DOWNLOAD_TEMP_SUFFIX}"));
            let temp = TempFeed { path: dest };
            download::download_to(url, temp.path(), dl)
                .await
                .with_context(|| format!("download {url}"))?;
            Ok((open_file(temp.path())?, Some(temp)))
        }
        InputSource::Stdin => {
            info!("input(stdin)");
            Ok((Box::new(tokio::io::stdin()), None))
        }
    }
}
