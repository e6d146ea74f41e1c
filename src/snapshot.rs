// src/snapshot.rs
//! Change detection and history for emitted depth snapshots.
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::book::LevelPxQty;
use crate::metrics::Metrics;
use crate::parser::Symbol;
use crate::wire;

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub seq: u32,
    pub symbol: Symbol,
    pub bids: Vec<LevelPxQty>,
    pub asks: Vec<LevelPxQty>,
}

/// Equal when the visible view is equal; `seq` is ignored.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.bids == other.bids && self.asks == other.asks
    }
}

impl Eq for Snapshot {}

impl Snapshot {
    pub fn render(&self) -> String {
        wire::encode_snapshot(self.seq, self.symbol, &self.bids, &self.asks)
    }
}

/// Receives every freshly aggregated snapshot. Returns whether it was emitted.
pub trait SnapshotSink: Send + Sync {
    fn offer(&self, snapshot: Snapshot) -> bool;
}

/// Emitted lines per symbol plus the combined emission order of all symbols.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotHistory {
    pub symbols: BTreeMap<Symbol, Vec<String>>,
    pub all: Vec<String>,
}

impl SnapshotHistory {
    pub fn lines(&self, symbol: Symbol) -> &[String] {
        self.symbols.get(&symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[derive(Default)]
struct CacheInner {
    last: hashbrown::HashMap<Symbol, Snapshot>,
    history: SnapshotHistory,
}

#[derive(Default)]
pub struct SnapshotCache {
    inner: Mutex<CacheInner>,
    echo: bool,
    metrics: Option<Arc<Metrics>>,
}

impl SnapshotCache {
    /// With `echo`, every emitted line is also written to stdout.
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Default::default()
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn last(&self, symbol: Symbol) -> Option<Snapshot> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last.get(&symbol).cloned()
    }

    pub fn history(&self) -> SnapshotHistory {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.clone()
    }

    pub fn take_history(&self) -> SnapshotHistory {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut inner.history)
    }
}

impl SnapshotSink for SnapshotCache {
    fn offer(&self, snapshot: Snapshot) -> bool {
        // compare, print and append under one lock so "all" matches stdout order
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.last.get(&snapshot.symbol) == Some(&snapshot) {
            return false;
        }

        let line = snapshot.render();
        if self.echo {
            let mut out = std::io::stdout().lock();
            if let Err(e) = writeln!(out, "{line}") {
                debug!(error = %e, "stdout write failed");
            }
        }

        let symbol = snapshot.symbol;
        inner.history.symbols.entry(symbol).or_default().push(line.clone());
        inner.history.all.push(line);
        inner.last.insert(symbol, snapshot);

        if let Some(m) = &self.metrics {
            m.inc_snapshots();
        }
        true
    }
}
