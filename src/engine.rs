// src/engine.rs
//! Stream processors: frame reader → per-symbol book → depth → snapshot sink.
//!
//! [`ParallelExecutor`] gives every symbol its own FIFO channel and tokio task,
//! so symbols progress independently while each symbol sees its frames in
//! arrival order. [`SerialExecutor`] applies frames on the reading task and is
//! meant for sources that must be consumed by a single task, such as stdin.
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::book::{ApplyError, OrderBook, Side};
use crate::metrics::Metrics;
use crate::parser::{Frame, FrameReader, ReaderStats, Symbol};
use crate::shutdown::Shutdown;
use crate::snapshot::{Snapshot, SnapshotCache, SnapshotHistory, SnapshotSink};

const INITIAL_ORDER_CAPACITY: usize = 1_024;

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Price levels per side in every snapshot.
    pub depth: NonZeroUsize,
    /// Also print each emitted snapshot line to stdout.
    pub echo: bool,
}

impl EngineConfig {
    pub fn new(depth: NonZeroUsize) -> Self {
        Self { depth, echo: false }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub history: SnapshotHistory,
    #[serde(skip)]
    pub books: BTreeMap<Symbol, OrderBook>,
    pub stats: ReaderStats,
    /// Symbols whose worker stopped on an apply error. Always empty for the
    /// serial executor, which skips the bad frame and carries on.
    pub failed: Vec<Symbol>,
    pub cancelled: bool,
}

/// Consumes a byte source to completion and returns everything it emitted.
pub trait StreamProcessor {
    fn process<R>(&self, src: R, shutdown: Shutdown) -> impl Future<Output = Result<RunReport>> + Send
    where
        R: AsyncRead + Unpin + Send + 'static;
}

struct SymState {
    symbol: Symbol,
    book: OrderBook,
}

impl SymState {
    fn new(symbol: Symbol) -> Self {
        let mut book = OrderBook::new();
        book.reserve_orders(INITIAL_ORDER_CAPACITY);
        Self { symbol, book }
    }

    /// Applies one frame and offers the resulting view to `sink`.
    fn apply(&mut self, frame: &Frame, depth: usize, sink: &dyn SnapshotSink) -> Result<bool, ApplyError> {
        let op = frame.decode_op()?;
        self.book.apply(op);

        let snapshot = Snapshot {
            seq: frame.seq,
            symbol: self.symbol,
            bids: self.book.levels_depth(Side::Bid, depth),
            asks: self.book.levels_depth(Side::Ask, depth),
        };
        Ok(sink.offer(snapshot))
    }
}

// ---------------------------------------------------------------------------
// serial

pub struct SerialExecutor {
    cfg: EngineConfig,
    metrics: Arc<Metrics>,
}

impl SerialExecutor {
    pub fn new(cfg: EngineConfig, metrics: Arc<Metrics>) -> Self {
        Self { cfg, metrics }
    }
}

impl StreamProcessor for SerialExecutor {
    async fn process<R>(&self, src: R, mut shutdown: Shutdown) -> Result<RunReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let depth = self.cfg.depth.get();
        let cache = SnapshotCache::new(self.cfg.echo).with_metrics(self.metrics.clone());
        let mut reader = FrameReader::new(src).with_metrics(self.metrics.clone());

        let mut books: hashbrown::HashMap<Symbol, SymState> = hashbrown::HashMap::new();
        let mut cancelled = false;

        loop {
            if shutdown.is_cancelled() {
                cancelled = true;
                break;
            }
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => { cancelled = true; break; }
                r = reader.next_frame() => r.context("read feed")?,
            };
            let Some(frame) = next else { break };

            let state = books
                .entry(frame.symbol)
                .or_insert_with(|| SymState::new(frame.symbol));
            match state.apply(&frame, depth, &cache) {
                Ok(_) => self.metrics.inc_applied(),
                // only this frame is lost; the symbol stays live
                Err(e) => {
                    error!(symbol = %frame.symbol, seq = frame.seq, error = %e, "failed to apply frame; skipping it");
                    self.metrics.inc_apply_err();
                }
            }
        }

        if cancelled {
            info!("serial: cancelled");
        }

        Ok(RunReport {
            history: cache.take_history(),
            books: books.into_iter().map(|(sym, st)| (sym, st.book)).collect(),
            stats: reader.stats().clone(),
            failed: Vec::new(),
            cancelled,
        })
    }
}

// ---------------------------------------------------------------------------
// parallel

#[derive(Clone, Debug)]
enum Route {
    Live(mpsc::UnboundedSender<Frame>),
    Failed,
}

struct SymbolExit {
    book: OrderBook,
    failed: bool,
}

/// Routes frames to one ordered channel per symbol, spawning the symbol's
/// worker on first sight.
pub struct SymbolDispatcher {
    routes: Arc<DashMap<Symbol, Route>>,
    workers: Vec<(Symbol, JoinHandle<SymbolExit>)>,
    depth: usize,
    sink: Arc<dyn SnapshotSink>,
    metrics: Arc<Metrics>,
    shutdown: Shutdown,
}

impl SymbolDispatcher {
    pub fn new(depth: usize, sink: Arc<dyn SnapshotSink>, metrics: Arc<Metrics>, shutdown: Shutdown) -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            workers: Vec::new(),
            depth,
            sink,
            metrics,
            shutdown,
        }
    }

    pub fn symbols(&self) -> usize {
        self.workers.len()
    }

    pub fn dispatch(&mut self, frame: Frame) {
        let symbol = frame.symbol;
        let tx = match self.routes.get(&symbol).map(|r| r.value().clone()) {
            Some(Route::Live(tx)) => tx,
            Some(Route::Failed) => {
                self.metrics.inc_dropped();
                return;
            }
            None => self.spawn(symbol),
        };

        if let Err(mpsc::error::SendError(frame)) = tx.send(frame) {
            warn!(%symbol, seq = frame.seq, "symbol worker gone; dropping frame");
            self.routes.insert(symbol, Route::Failed);
            self.metrics.inc_dropped();
        }
    }

    fn spawn(&mut self, symbol: Symbol) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(symbol, Route::Live(tx.clone()));

        let handle = tokio::spawn(symbol_loop(
            SymState::new(symbol),
            rx,
            self.depth,
            self.sink.clone(),
            self.metrics.clone(),
            self.routes.clone(),
            self.shutdown.clone(),
        ));
        self.workers.push((symbol, handle));
        tx
    }

    /// Closes every channel and waits for all workers to drain and exit.
    pub async fn finish(self) -> (BTreeMap<Symbol, OrderBook>, Vec<Symbol>) {
        self.routes.clear();

        let mut books = BTreeMap::new();
        let mut failed = Vec::new();
        for (symbol, handle) in self.workers {
            match handle.await {
                Ok(exit) => {
                    if exit.failed {
                        failed.push(symbol);
                    }
                    books.insert(symbol, exit.book);
                }
                Err(e) => {
                    error!(%symbol, error = %e, "symbol worker aborted");
                    failed.push(symbol);
                }
            }
        }
        failed.sort();
        (books, failed)
    }
}

async fn symbol_loop(
    mut state: SymState,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    depth: usize,
    sink: Arc<dyn SnapshotSink>,
    metrics: Arc<Metrics>,
    routes: Arc<DashMap<Symbol, Route>>,
    mut shutdown: Shutdown,
) -> SymbolExit {
    let symbol = state.symbol;
    debug!(%symbol, "symbol worker started");
    let mut failed = false;

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            f = rx.recv() => match f {
                Some(f) => f,
                None => break,
            },
        };

        match state.apply(&frame, depth, sink.as_ref()) {
            Ok(_) => metrics.inc_applied(),
            Err(e) => {
                error!(%symbol, seq = frame.seq, error = %e, "failed to apply frame; stopping symbol worker");
                metrics.inc_apply_err();
                routes.insert(symbol, Route::Failed);
                failed = true;
                break;
            }
        }
    }

    rx.close();
    if failed {
        while rx.try_recv().is_ok() {
            metrics.inc_dropped();
        }
    }

    debug!(%symbol, failed, "symbol worker stopped");
    SymbolExit {
        book: state.book,
        failed,
    }
}

pub struct ParallelExecutor {
    cfg: EngineConfig,
    metrics: Arc<Metrics>,
}

impl ParallelExecutor {
    pub fn new(cfg: EngineConfig, metrics: Arc<Metrics>) -> Self {
        Self { cfg, metrics }
    }
}

impl StreamProcessor for ParallelExecutor {
    async fn process<R>(&self, src: R, mut shutdown: Shutdown) -> Result<RunReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cache = Arc::new(SnapshotCache::new(self.cfg.echo).with_metrics(self.metrics.clone()));
        let mut dispatcher = SymbolDispatcher::new(
            self.cfg.depth.get(),
            cache.clone(),
            self.metrics.clone(),
            shutdown.clone(),
        );
        let mut reader = FrameReader::new(src).with_metrics(self.metrics.clone());
        let mut cancelled = false;

        let read_res: std::io::Result<()> = async {
            loop {
                if shutdown.is_cancelled() {
                    cancelled = true;
                    return Ok(());
                }
                let next = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        cancelled = true;
                        return Ok(());
                    }
                    r = reader.next_frame() => r?,
                };
                match next {
                    Some(frame) => dispatcher.dispatch(frame),
                    None => return Ok(()),
                }
            }
        }
        .await;

        let symbols = dispatcher.symbols();
        // workers are joined even when reading failed
        let (books, failed) = dispatcher.finish().await;
        read_res.context("read feed")?;

        info!(symbols, failed = failed.len(), cancelled, "parallel: all symbol workers finished");
        Ok(RunReport {
            history: cache.take_history(),
            books,
            stats: reader.stats().clone(),
            failed,
            cancelled,
        })
    }
}
