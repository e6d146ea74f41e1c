//! # depth-feed - Order Book Depth Snapshots from a Binary Event Feed
//!
//! This crate rebuilds a live order book per instrument symbol from a
//! length-prefixed binary stream of add/update/delete/execute events and
//! emits a depth-of-market snapshot (top N price levels per side) every time
//! the visible view of a symbol changes.
//!
//! ## Architecture
//!
//! - **Parser**: decodes frames, skipping malformed ones and stopping cleanly on truncation
//! - **OrderBook**: per-symbol bid/ask order maps with an incremental price level index
//! - **Depth**: reference aggregation of live orders into price levels
//! - **Snapshot**: change detection, stdout echo and per-symbol history
//! - **Engine**: serial and symbol-sharded parallel stream processors
//!
//! Only per-symbol ordering is guaranteed; symbols are processed independently.
//!
//! ## Example
//!
//! ```rust,no_run
//! use depth_feed::{
//!     engine::{EngineConfig, ParallelExecutor, StreamProcessor},
//!     metrics::Metrics,
//!     shutdown::Shutdown,
//! };
//! use std::{num::NonZeroUsize, sync::Arc};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let feed = tokio::fs::File::open("orders.stream").await?;
//! let depth = NonZeroUsize::new(5).unwrap();
//! let exec = ParallelExecutor::new(EngineConfig::new(depth), Arc::new(Metrics::new()));
//!
//! let report = exec.process(feed, Shutdown::never()).await?;
//! for (symbol, lines) in &report.history.symbols {
//!     println!("{symbol}: {} snapshots", lines.len());
//! }
//! # Ok(())
//! # }
//! ```
pub mod book;
pub mod config;
pub mod depth;
pub mod download;
pub mod engine;
pub mod metrics;
pub mod output;
pub mod parser;
pub mod shutdown;
pub mod snapshot;
pub mod source;
pub mod wire;
