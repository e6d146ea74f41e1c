#![allow(dead_code)]

use depth_feed::book::{Op, Side};
use depth_feed::engine::{EngineConfig, ParallelExecutor, RunReport, SerialExecutor, StreamProcessor};
use depth_feed::metrics::Metrics;
use depth_feed::parser::Symbol;
use depth_feed::shutdown::Shutdown;
use depth_feed::wire;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

pub fn add(order_id: i64, side: Side, volume: i64, price: i32) -> Op {
    Op::Add { order_id, side, volume, price }
}

pub fn update(order_id: i64, side: Side, volume: i64, price: i32) -> Op {
    Op::Update { order_id, side, volume, price }
}

pub fn delete(order_id: i64, side: Side) -> Op {
    Op::Delete { order_id, side }
}

pub fn execute(order_id: i64, side: Side, qty: i64) -> Op {
    Op::Execute { order_id, side, qty }
}

/// Concatenated frames, sequence numbers assigned from 1 in order.
#[derive(Default)]
pub struct Feed {
    buf: Vec<u8>,
    seq: u32,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, symbol: &str, op: Op) -> Self {
        self.seq += 1;
        self.buf.extend_from_slice(&wire::encode_op(self.seq, sym(symbol), &op));
        self
    }

    pub fn raw(mut self, msg_type: u8, body: &[u8]) -> Self {
        self.seq += 1;
        self.buf.extend_from_slice(&wire::encode_raw(self.seq, msg_type, body));
        self
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

pub fn cfg(depth: usize) -> EngineConfig {
    EngineConfig::new(NonZeroUsize::new(depth).unwrap())
}

pub async fn run_serial(feed: Vec<u8>, depth: usize) -> RunReport {
    SerialExecutor::new(cfg(depth), Arc::new(Metrics::new()))
        .process(Cursor::new(feed), Shutdown::never())
        .await
        .unwrap()
}

pub async fn run_parallel(feed: Vec<u8>, depth: usize) -> RunReport {
    ParallelExecutor::new(cfg(depth), Arc::new(Metrics::new()))
        .process(Cursor::new(feed), Shutdown::never())
        .await
        .unwrap()
}
