// src/wire.rs
//! Text rendering of snapshot lines and the binary frame encoder used by
//! tooling and tests to produce feeds.
use bytes::{BufMut, Bytes, BytesMut};
use itoa::Buffer;

use crate::book::{LevelPxQty, Op};
use crate::parser::{MsgType, Symbol, HEADER_LEN, SYMBOL_LEN};

#[inline(always)]
fn push_levels(out: &mut String, buf: &mut Buffer, levels: &[LevelPxQty]) {
    out.push('[');
    for (i, lv) in levels.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push('(');
        out.push_str(buf.format(lv.px));
        out.push_str(", ");
        out.push_str(buf.format(lv.qty));
        out.push(')');
    }
    out.push(']');
}

/// `seq, SYM, [(px, qty), ...], [(px, qty), ...]`, bids first.
pub fn encode_snapshot(seq: u32, symbol: Symbol, bids: &[LevelPxQty], asks: &[LevelPxQty]) -> String {
    let mut out = String::with_capacity(24 + (bids.len() + asks.len()) * 24);
    let mut b = Buffer::new();

    out.push_str(b.format(seq));
    out.push_str(", ");
    out.extend(symbol.chars());
    out.push_str(", ");
    push_levels(&mut out, &mut b, bids);
    out.push_str(", ");
    push_levels(&mut out, &mut b, asks);
    out
}

#[inline(always)]
fn put_symbol(out: &mut BytesMut, symbol: Symbol) {
    let s = symbol.as_bytes();
    out.put_slice(s);
    out.put_bytes(b' ', SYMBOL_LEN - s.len());
}

/// Encodes `op` as one complete wire frame (header, type byte, body).
pub fn encode_op(seq: u32, symbol: Symbol, op: &Op) -> Bytes {
    let (msg_type, order_id, side) = match *op {
        Op::Add { order_id, side, .. } => (MsgType::Add, order_id, side),
        Op::Update { order_id, side, .. } => (MsgType::Update, order_id, side),
        Op::Delete { order_id, side } => (MsgType::Delete, order_id, side),
        Op::Execute { order_id, side, .. } => (MsgType::Execute, order_id, side),
    };
    let body_len = msg_type.body_len();

    let mut out = BytesMut::with_capacity(HEADER_LEN + 1 + body_len);
    out.put_u32_le(seq);
    out.put_u32_le((body_len + 1) as u32);
    out.put_u8(msg_type.to_wire());

    put_symbol(&mut out, symbol);
    out.put_i64_le(order_id);
    out.put_u8(side.to_wire());
    out.put_bytes(0, 3);

    match *op {
        Op::Add { volume, price, .. } | Op::Update { volume, price, .. } => {
            out.put_i64_le(volume);
            out.put_i32_le(price);
            out.put_bytes(0, 4);
        }
        Op::Execute { qty, .. } => out.put_i64_le(qty),
        Op::Delete { .. } => {}
    }

    out.freeze()
}

/// Raw frame with an arbitrary type byte and body, for feeds that must carry
/// malformed messages.
pub fn encode_raw(seq: u32, msg_type: u8, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + 1 + body.len());
    out.put_u32_le(seq);
    out.put_u32_le((body.len() + 1) as u32);
    out.put_u8(msg_type);
    out.put_slice(body);
    out.freeze()
}
