// src/parser.rs
//! Length-prefixed binary frame decoding.
//!
//! Every frame is an 8-byte little-endian header (`seq: u32`,
//! `message_size: u32`) followed by `message_size` bytes: one ASCII type byte
//! and the type-specific body. Bodies start with a 3-byte, space or NUL padded
//! symbol.
//!
//! Malformed frames are logged and skipped; a stream that ends inside a frame
//! is logged and treated as the end of input.
use bytes::{Buf, Bytes, BytesMut};
use serde::{Serialize, Serializer};
use std::fmt::{self, Write as _};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::book::{ApplyError, Op, Side};
use crate::metrics::Metrics;

pub const HEADER_LEN: usize = 8;
pub const MAX_MESSAGE_SIZE: u32 = 1024;
pub const SYMBOL_LEN: usize = 3;

// symbol(3) order_id(8) side(1) reserved(3)
const COMMON_LEN: usize = SYMBOL_LEN + 8 + 1 + 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgType {
    Add,
    Update,
    Delete,
    Execute,
}

impl MsgType {
    #[inline]
    pub fn from_wire(b: u8) -> Option<MsgType> {
        match b {
            b'A' => Some(MsgType::Add),
            b'U' => Some(MsgType::Update),
            b'D' => Some(MsgType::Delete),
            b'E' => Some(MsgType::Execute),
            _ => None,
        }
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        match self {
            MsgType::Add => b'A',
            MsgType::Update => b'U',
            MsgType::Delete => b'D',
            MsgType::Execute => b'E',
        }
    }

    /// Body bytes the type needs, reserved padding included.
    #[inline]
    pub fn body_len(self) -> usize {
        match self {
            MsgType::Add | MsgType::Update => COMMON_LEN + 8 + 4 + 4,
            MsgType::Delete => COMMON_LEN,
            MsgType::Execute => COMMON_LEN + 8,
        }
    }
}

/// Instrument symbol: up to three raw bytes with the padding trimmed.
/// Bytes are kept as received and rendered one `char` per byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    buf: [u8; SYMBOL_LEN],
    len: u8,
}

impl Symbol {
    /// Trims leading and trailing space/NUL padding. `None` when nothing is
    /// left or more than three bytes remain.
    pub fn from_padded(raw: &[u8]) -> Option<Symbol> {
        let is_pad = |b: &u8| *b == 0 || b.is_ascii_whitespace();
        let start = raw.iter().position(|b| !is_pad(b))?;
        let end = raw.iter().rposition(|b| !is_pad(b))? + 1;
        let s = &raw[start..end];
        if s.len() > SYMBOL_LEN {
            return None;
        }

        let mut buf = [0u8; SYMBOL_LEN];
        buf[..s.len()].copy_from_slice(s);
        Some(Symbol {
            buf,
            len: s.len() as u8,
        })
    }

    pub fn new(s: &str) -> Option<Symbol> {
        Self::from_padded(s.as_bytes())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    #[inline]
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.as_bytes().iter().map(|&b| char::from(b))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars().try_for_each(|c| f.write_char(c))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.to_string())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u32,
    pub msg_type: MsgType,
    pub symbol: Symbol,
    /// Body as received, symbol bytes included.
    pub body: Bytes,
}

impl Frame {
    pub fn decode_op(&self) -> Result<Op, ApplyError> {
        let need = self.msg_type.body_len();
        if self.body.len() < need {
            return Err(ApplyError::ShortBody {
                msg_type: self.msg_type.to_wire() as char,
                need,
                got: self.body.len(),
            });
        }

        let mut b = self.body.clone();
        b.advance(SYMBOL_LEN);
        let order_id = b.get_i64_le();
        let side_byte = b.get_u8();
        let side = Side::from_wire(side_byte).ok_or(ApplyError::UnknownSide(side_byte))?;
        b.advance(3);

        let op = match self.msg_type {
            MsgType::Add => {
                let volume = b.get_i64_le();
                let price = b.get_i32_le();
                Op::Add {
                    order_id,
                    side,
                    volume,
                    price,
                }
            }
            MsgType::Update => {
                let volume = b.get_i64_le();
                let price = b.get_i32_le();
                Op::Update {
                    order_id,
                    side,
                    volume,
                    price,
                }
            }
            MsgType::Delete => Op::Delete { order_id, side },
            MsgType::Execute => Op::Execute {
                order_id,
                side,
                qty: b.get_i64_le(),
            },
        };

        Ok(op)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("incomplete header: got {got} of 8 bytes")]
    TruncatedHeader { got: usize },
    #[error("invalid message size {size} at seq {seq}")]
    InvalidSize { seq: u32, size: u32 },
    #[error("missing message type at seq {seq}")]
    MissingType { seq: u32 },
    #[error("invalid message type {byte:#04x} at seq {seq}, skipped {skipped} of {declared} bytes")]
    InvalidType {
        seq: u32,
        byte: u8,
        declared: usize,
        skipped: u64,
    },
    #[error("incomplete body at seq {seq}: got {got} of {expected} bytes")]
    TruncatedBody { seq: u32, got: usize, expected: usize },
    #[error("empty symbol at seq {seq}")]
    EmptySymbol { seq: u32 },
}

impl FrameError {
    /// Fatal errors end the stream; the rest skip one frame.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::TruncatedHeader { .. }
                | FrameError::MissingType { .. }
                | FrameError::TruncatedBody { .. }
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub bytes: u64,
    pub frames: u64,
    pub skipped: u64,
    pub truncated: bool,
}

pub struct FrameReader<R> {
    src: R,
    stats: ReaderStats,
    metrics: Option<Arc<Metrics>>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            stats: ReaderStats::default(),
            metrics: None,
            done: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Next valid frame, `Ok(None)` once the input is exhausted or truncated.
    /// Only errors of the underlying byte source are returned as `Err`.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let mut hdr = [0u8; HEADER_LEN];
            let got = self.read_full(&mut hdr).await?;
            if got == 0 {
                self.done = true;
                return Ok(None);
            }
            if got < HEADER_LEN {
                self.reject(FrameError::TruncatedHeader { got });
                return Ok(None);
            }

            let mut h = &hdr[..];
            let seq = h.get_u32_le();
            let size = h.get_u32_le();
            if size == 0 || size > MAX_MESSAGE_SIZE {
                self.reject(FrameError::InvalidSize { seq, size });
                continue;
            }

            let mut ty = [0u8; 1];
            if self.read_full(&mut ty).await? < 1 {
                self.reject(FrameError::MissingType { seq });
                return Ok(None);
            }

            let body_len = size as usize - 1;
            let Some(msg_type) = MsgType::from_wire(ty[0]) else {
                let skipped = self.discard(body_len as u64).await?;
                self.reject(FrameError::InvalidType {
                    seq,
                    byte: ty[0],
                    declared: body_len,
                    skipped,
                });
                continue;
            };

            let mut body = BytesMut::zeroed(body_len);
            let got = self.read_full(&mut body).await?;
            if got < body_len {
                self.reject(FrameError::TruncatedBody {
                    seq,
                    got,
                    expected: body_len,
                });
                return Ok(None);
            }
            let body = body.freeze();

            let Some(symbol) = Symbol::from_padded(&body[..body_len.min(SYMBOL_LEN)]) else {
                self.reject(FrameError::EmptySymbol { seq });
                continue;
            };

            self.stats.frames += 1;
            if let Some(m) = &self.metrics {
                m.inc_frames();
            }
            return Ok(Some(Frame {
                seq,
                msg_type,
                symbol,
                body,
            }));
        }
    }

    fn reject(&mut self, e: FrameError) {
        if e.is_fatal() {
            warn!(error = %e, "truncated input; stopping");
            self.stats.truncated = true;
            self.done = true;
            if let Some(m) = &self.metrics {
                m.inc_truncated();
            }
        } else {
            warn!(error = %e, "skipping frame");
            self.stats.skipped += 1;
            if let Some(m) = &self.metrics {
                m.inc_skipped();
            }
        }
    }

    /// Reads until `buf` is full or the source is exhausted.
    async fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.src.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.stats.bytes += filled as u64;
        Ok(filled)
    }

    /// Best-effort skip; a short count means the source ran out.
    async fn discard(&mut self, n: u64) -> io::Result<u64> {
        let mut limited = (&mut self.src).take(n);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        self.stats.bytes += skipped;
        Ok(skipped)
    }
}
