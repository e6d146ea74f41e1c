// src/depth.rs
//! Reference depth aggregation straight from a side's live orders.
//!
//! [`OrderBook::levels_depth`](crate::book::OrderBook::levels_depth) serves the
//! same view from its incremental level index on the hot path. This module is
//! the oracle it is checked against, by
//! [`OrderBook::assert_invariants`](crate::book::OrderBook::assert_invariants)
//! and the property tests.

use std::collections::BTreeMap;

use crate::book::{LevelPxQty, Order, Price, Side, Volume};

/// Groups `orders` by price, sums the volume per price and returns the first
/// `depth` levels in book order (bids descending, asks ascending).
pub fn aggregate<'a, I>(orders: I, side: Side, depth: usize) -> Vec<LevelPxQty>
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut grouped: BTreeMap<Price, Volume> = BTreeMap::new();
    for o in orders {
        let qty = grouped.entry(o.price).or_insert(0);
        *qty = qty.wrapping_add(o.volume);
    }

    let levels = grouped.into_iter().map(|(px, qty)| LevelPxQty { px, qty });
    match side {
        Side::Bid => levels.rev().take(depth).collect(),
        Side::Ask => levels.take(depth).collect(),
    }
}
