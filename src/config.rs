// src/config.rs
//! Settings for the collaborators around the engine: downloading and output.
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FILE_SUFFIX: &str = "-price-depth-snapshot-output.txt";
pub const OUTPUT_DIR_PREFIX: &str = "output-";
pub const DOWNLOAD_TEMP_SUFFIX: &str = "-download.stream";

#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Bytes per ranged request.
    pub chunk_size: u64,
    /// Ranged requests in flight at once.
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Parent of the per-run `output-<unix_ts>` directory.
    pub out_dir: PathBuf,
    /// Appended to the symbol name to form each artifact's file name.
    pub file_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
        }
    }
}
