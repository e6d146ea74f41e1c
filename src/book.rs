// src/book.rs
//! Per-symbol order book driven by add/update/delete/execute events.
//!
//! Each side keeps the live orders keyed by order id plus an index of price
//! levels (summed volume and resting-order count) that is maintained on every
//! transition, so reading the top N levels never rescans the orders.
//!
//! Transitions on an order id the side does not know are no-ops, not errors.
//! Nothing here validates trading semantics: zero or negative volumes and
//! crossed books are accepted as they arrive.
//!
//! ## Example
//!
//! ```rust
//! use depth_feed::book::{LevelPxQty, Op, OrderBook, Side};
//!
//! let mut book = OrderBook::new();
//! book.apply(Op::Add { order_id: 1, side: Side::Bid, volume: 5, price: 100 });
//! book.apply(Op::Add { order_id: 2, side: Side::Bid, volume: 3, price: 100 });
//! book.apply(Op::Add { order_id: 3, side: Side::Bid, volume: 10, price: 99 });
//!
//! assert_eq!(
//!     book.levels_depth(Side::Bid, 2),
//!     vec![LevelPxQty { px: 100, qty: 8 }, LevelPxQty { px: 99, qty: 10 }]
//! );
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

use crate::depth;

pub type OrderId = i64;
pub type Price = i32;
pub type Volume = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Side byte as carried on the wire: `B` for bids, `S` for asks.
    #[inline]
    pub fn from_wire(b: u8) -> Option<Side> {
        match b {
            b'B' => Some(Side::Bid),
            b'S' => Some(Side::Ask),
            _ => None,
        }
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        match self {
            Side::Bid => b'B',
            Side::Ask => b'S',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LevelPxQty {
    pub px: Price,
    pub qty: Volume,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub volume: Volume,
    pub price: Price,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Add {
        order_id: OrderId,
        side: Side,
        volume: Volume,
        price: Price,
    },
    Update {
        order_id: OrderId,
        side: Side,
        volume: Volume,
        price: Price,
    },
    Delete {
        order_id: OrderId,
        side: Side,
    },
    Execute {
        order_id: OrderId,
        side: Side,
        qty: Volume,
    },
}

/// Failure to turn a frame into an [`Op`]. Raised while applying, so it is
/// scoped to the symbol the frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("body too short for '{msg_type}' message: need {need} bytes, got {got}")]
    ShortBody { msg_type: char, need: usize, got: usize },
    #[error("unknown side byte {0:#04x}")]
    UnknownSide(u8),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOut {
    /// False when the op referenced an order the side does not hold.
    pub mutated: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Level {
    qty: Volume,
    orders: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct BookSide {
    orders: hashbrown::HashMap<OrderId, Order>,
    levels: BTreeMap<Price, Level>,
}

impl BookSide {
    #[inline(always)]
    fn level_add(&mut self, px: Price, qty: Volume) {
        let lv = self.levels.entry(px).or_default();
        lv.qty = lv.qty.wrapping_add(qty);
        lv.orders += 1;
    }

    #[inline(always)]
    fn level_sub(&mut self, px: Price, qty: Volume) {
        if let Some(lv) = self.levels.get_mut(&px) {
            lv.qty = lv.qty.wrapping_sub(qty);
            lv.orders -= 1;
            if lv.orders == 0 {
                self.levels.remove(&px);
            }
        }
    }

    fn add(&mut self, order: Order) {
        if let Some(old) = self.orders.insert(order.order_id, order) {
            self.level_sub(old.price, old.volume);
        }
        self.level_add(order.price, order.volume);
    }

    fn update(&mut self, order_id: OrderId, volume: Volume, price: Price) -> bool {
        let Some(o) = self.orders.get_mut(&order_id) else {
            return false;
        };
        let (old_px, old_qty) = (o.price, o.volume);
        o.volume = volume;
        o.price = price;
        self.level_sub(old_px, old_qty);
        self.level_add(price, volume);
        true
    }

    fn delete(&mut self, order_id: OrderId) -> bool {
        match self.orders.remove(&order_id) {
            Some(old) => {
                self.level_sub(old.price, old.volume);
                true
            }
            None => false,
        }
    }

    fn execute(&mut self, order_id: OrderId, qty: Volume) -> bool {
        let Some(o) = self.orders.get_mut(&order_id) else {
            return false;
        };
        let (px, before) = (o.price, o.volume);
        o.volume = before.wrapping_sub(qty);
        let after = o.volume;

        self.level_sub(px, before);
        if after <= 0 {
            self.orders.remove(&order_id);
        } else {
            self.level_add(px, after);
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn reserve_orders(&mut self, n: usize) {
        self.bids.orders.reserve(n);
        self.asks.orders.reserve(n);
    }

    #[inline(always)]
    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline(always)]
    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn order(&self, side: Side, order_id: OrderId) -> Option<&Order> {
        self.side(side).orders.get(&order_id)
    }

    pub fn orders(&self, side: Side) -> impl Iterator<Item = &Order> + '_ {
        self.side(side).orders.values()
    }

    pub fn order_count(&self, side: Side) -> usize {
        self.side(side).orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.orders.is_empty() && self.asks.orders.is_empty()
    }

    pub fn apply(&mut self, op: Op) -> ApplyOut {
        let mutated = match op {
            Op::Add {
                order_id,
                side,
                volume,
                price,
            } => {
                self.side_mut(side).add(Order {
                    order_id,
                    side,
                    volume,
                    price,
                });
                true
            }

            Op::Update {
                order_id,
                side,
                volume,
                price,
            } => self.side_mut(side).update(order_id, volume, price),

            Op::Delete { order_id, side } => self.side_mut(side).delete(order_id),

            Op::Execute {
                order_id,
                side,
                qty,
            } => self.side_mut(side).execute(order_id, qty),
        };

        ApplyOut { mutated }
    }

    /// Top `depth` levels: bids by descending price, asks by ascending price.
    pub fn levels_depth(&self, side: Side, depth: usize) -> Vec<LevelPxQty> {
        let levels = &self.side(side).levels;
        let take_n = depth.min(levels.len());
        let mut out = Vec::with_capacity(take_n);

        match side {
            Side::Bid => {
                for (&px, lv) in levels.iter().rev().take(take_n) {
                    out.push(LevelPxQty { px, qty: lv.qty });
                }
            }
            Side::Ask => {
                for (&px, lv) in levels.iter().take(take_n) {
                    out.push(LevelPxQty { px, qty: lv.qty });
                }
            }
        }

        out
    }
}

impl OrderBook {
    pub fn assert_invariants(&self) {
        for side in [Side::Bid, Side::Ask] {
            let s = self.side(side);

            // 1) orders are filed under their own id and side
            for (&id, o) in s.orders.iter() {
                assert_eq!(id, o.order_id, "order filed under wrong id");
                assert_eq!(side, o.side, "order {id} filed under wrong side");
            }

            // 2) level index must equal the grouping of live orders
            let mut exp: BTreeMap<Price, Level> = BTreeMap::new();
            for o in s.orders.values() {
                let lv = exp.entry(o.price).or_default();
                lv.qty = lv.qty.wrapping_add(o.volume);
                lv.orders += 1;
            }
            assert_eq!(s.levels, exp, "{side:?} level index mismatch");

            // 3) served depth must equal the reference aggregation
            assert_eq!(
                self.levels_depth(side, usize::MAX),
                depth::aggregate(s.orders.values(), side, usize::MAX),
                "{side:?} depth view mismatch"
            );
        }

        // Note: an id may rest on both sides; sides are independent maps
    }
}
