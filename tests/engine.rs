mod common;

use common::{add, cfg, delete, execute, run_parallel, run_serial, sym, update, Feed};
use depth_feed::book::{LevelPxQty, Side};
use depth_feed::engine::{ParallelExecutor, SerialExecutor, StreamProcessor};
use depth_feed::metrics::Metrics;
use depth_feed::shutdown::{self, Shutdown};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn lines(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn aggregates_orders_at_the_same_price() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("AAA", add(2, Side::Bid, 3, 100))
        .op("AAA", add(3, Side::Bid, 10, 99))
        .build();

    let report = run_parallel(feed, 2).await;
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&[
            "1, AAA, [(100, 5)], []",
            "2, AAA, [(100, 8)], []",
            "3, AAA, [(100, 8), (99, 10)], []",
        ])
    );
    assert_eq!(
        report.books[&sym("AAA")].levels_depth(Side::Bid, 2),
        vec![LevelPxQty { px: 100, qty: 8 }, LevelPxQty { px: 99, qty: 10 }]
    );
}

#[tokio::test]
async fn depth_one_only_shows_the_best_level() {
    let feed = Feed::new()
        .op("S", add(1, Side::Bid, 5, 100))
        .op("S", add(2, Side::Bid, 1, 101))
        // below the visible level: no new line
        .op("S", add(3, Side::Bid, 7, 99))
        .op("S", add(4, Side::Ask, 2, 105))
        .op("S", add(5, Side::Ask, 9, 106))
        .build();

    let report = run_serial(feed, 1).await;
    assert_eq!(
        report.history.lines(sym("S")),
        lines(&[
            "1, S, [(100, 5)], []",
            "2, S, [(101, 1)], []",
            "4, S, [(101, 1)], [(105, 2)]",
        ])
    );
}

#[tokio::test]
async fn depth_one_truncates_asks() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Ask, 3, 103))
        .op("AAA", add(2, Side::Ask, 2, 102))
        .op("AAA", add(3, Side::Ask, 1, 101))
        .build();

    let report = run_parallel(feed, 1).await;
    assert_eq!(
        report.history.lines(sym("AAA")).last().map(String::as_str),
        Some("3, AAA, [], [(101, 1)]")
    );
}

#[tokio::test]
async fn matching_execute_clears_the_price() {
    let feed = Feed::new()
        .op("AAA", add(5, Side::Ask, 10, 50))
        .op("AAA", execute(5, Side::Ask, 10))
        .build();

    let report = run_serial(feed, 3).await;
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&["1, AAA, [], [(50, 10)]", "2, AAA, [], []"])
    );
    assert!(report.books[&sym("AAA")].is_empty());
}

#[tokio::test]
async fn full_execute_removes_order_and_level() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Ask, 4, 50))
        .op("AAA", add(2, Side::Ask, 6, 51))
        .op("AAA", execute(1, Side::Ask, 1))
        .op("AAA", execute(1, Side::Ask, 3))
        .build();

    let report = run_parallel(feed, 3).await;
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&[
            "1, AAA, [], [(50, 4)]",
            "2, AAA, [], [(50, 4), (51, 6)]",
            "3, AAA, [], [(50, 3), (51, 6)]",
            "4, AAA, [], [(51, 6)]",
        ])
    );
    let book = &report.books[&sym("AAA")];
    assert!(book.order(Side::Ask, 1).is_none());
    assert_eq!(book.order_count(Side::Ask), 1);
}

#[tokio::test]
async fn unchanged_view_is_not_emitted_again() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("AAA", update(1, Side::Bid, 5, 100))
        .op("AAA", delete(42, Side::Bid))
        .op("AAA", execute(42, Side::Ask, 1))
        .op("AAA", update(1, Side::Bid, 6, 100))
        .build();

    let report = run_serial(feed, 5).await;
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&["1, AAA, [(100, 5)], []", "5, AAA, [(100, 6)], []"])
    );
}

#[tokio::test]
async fn update_moves_volume_between_levels() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("AAA", add(2, Side::Bid, 3, 99))
        .op("AAA", update(1, Side::Bid, 4, 99))
        .op("AAA", delete(2, Side::Bid))
        .build();

    let report = run_parallel(feed, 5).await;
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&[
            "1, AAA, [(100, 5)], []",
            "2, AAA, [(100, 5), (99, 3)], []",
            "3, AAA, [(99, 7)], []",
            "4, AAA, [(99, 4)], []",
        ])
    );
}

#[tokio::test]
async fn truncated_stream_keeps_partial_history() {
    let mut feed = Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("BBB", add(1, Side::Ask, 2, 10))
        .build();
    // header for a 50-byte message followed by only 31 bytes
    feed.extend_from_slice(&3u32.to_le_bytes());
    feed.extend_from_slice(&50u32.to_le_bytes());
    feed.push(b'A');
    feed.extend_from_slice(&[b'C'; 30]);

    for report in [run_serial(feed.clone(), 3).await, run_parallel(feed, 3).await] {
        assert!(report.stats.truncated);
        assert_eq!(report.history.all.len(), 2);
        assert_eq!(report.history.symbols.len(), 2);
        assert!(report.failed.is_empty());
    }
}

fn bad_side_feed() -> Vec<u8> {
    let mut bad_side = b"AAA".to_vec();
    bad_side.extend_from_slice(&9i64.to_le_bytes());
    bad_side.push(b'Q');
    bad_side.extend_from_slice(&[0; 3]);

    Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("BBB", add(1, Side::Bid, 1, 10))
        .raw(b'D', &bad_side)
        .op("AAA", add(2, Side::Bid, 5, 101))
        .op("BBB", add(2, Side::Bid, 1, 11))
        .op("AAA", add(3, Side::Bid, 5, 102))
        .build()
}

#[tokio::test]
async fn apply_error_only_stops_its_symbol_parallel() {
    let metrics = Arc::new(Metrics::new());
    let report = ParallelExecutor::new(cfg(2), metrics.clone())
        .process(Cursor::new(bad_side_feed()), Shutdown::never())
        .await
        .unwrap();

    assert_eq!(report.failed, vec![sym("AAA")]);
    assert_eq!(report.history.lines(sym("AAA")), lines(&["1, AAA, [(100, 5)], []"]));
    assert_eq!(
        report.history.lines(sym("BBB")),
        lines(&["2, BBB, [(10, 1)], []", "5, BBB, [(11, 1), (10, 1)], []"])
    );
    assert_eq!(report.books[&sym("AAA")].order_count(Side::Bid), 1);

    let prom = metrics.prometheus_text();
    assert!(prom.contains("depth_feed_apply_errors_total 1"), "{prom}");
}

#[tokio::test]
async fn serial_skips_bad_frame_and_keeps_symbol_live() {
    let metrics = Arc::new(Metrics::new());
    let report = SerialExecutor::new(cfg(2), metrics.clone())
        .process(Cursor::new(bad_side_feed()), Shutdown::never())
        .await
        .unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(
        report.history.lines(sym("AAA")),
        lines(&[
            "1, AAA, [(100, 5)], []",
            "4, AAA, [(101, 5), (100, 5)], []",
            "6, AAA, [(102, 5), (101, 5)], []",
        ])
    );
    assert_eq!(report.history.lines(sym("BBB")).len(), 2);
    assert_eq!(report.history.all.len(), 5);
    assert_eq!(report.books[&sym("AAA")].order_count(Side::Bid), 3);

    let prom = metrics.prometheus_text();
    assert!(prom.contains("depth_feed_apply_errors_total 1"), "{prom}");
    assert!(prom.contains("depth_feed_frames_dropped_total 0"), "{prom}");
}

#[tokio::test]
async fn per_symbol_order_is_arrival_order() {
    let symbols = ["AAA", "BBB", "CCC", "DDD"];
    let mut feed = Feed::new();
    for i in 0..200i64 {
        let s = symbols[i as usize % symbols.len()];
        feed = feed.op(s, add(i, Side::Ask, 1, 1_000 - i as i32));
    }

    let report = run_parallel(feed.build(), 1).await;
    assert_eq!(report.history.symbols.len(), 4);
    for s in symbols {
        let seqs: Vec<u32> = report
            .history
            .lines(sym(s))
            .iter()
            .map(|l| l.split(", ").next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(seqs.len(), 50, "{s}");
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{s}: {seqs:?}");
    }

    let total: usize = report.history.symbols.values().map(Vec::len).sum();
    assert_eq!(report.history.all.len(), total);
}

#[tokio::test]
async fn serial_matches_parallel_on_mixed_feed() {
    let feed = Feed::new()
        .op("AAA", add(1, Side::Bid, 5, 100))
        .op("BBB", add(1, Side::Ask, 5, 200))
        .op("AAA", add(2, Side::Ask, 4, 101))
        .op("BBB", update(1, Side::Ask, 3, 199))
        .op("AAA", execute(2, Side::Ask, 4))
        .op("BBB", delete(1, Side::Ask))
        .build();

    let serial = run_serial(feed.clone(), 2).await;
    let parallel = run_parallel(feed, 2).await;
    assert_eq!(serial.history.symbols, parallel.history.symbols);
    assert_eq!(serial.books, parallel.books);
    assert_eq!(serial.history.all.len(), 6);
}

#[tokio::test]
async fn triggered_shutdown_stops_before_reading() {
    let feed = Feed::new().op("AAA", add(1, Side::Bid, 5, 100)).build();

    let (trigger, sd) = shutdown::channel();
    trigger.trigger();
    let parallel = ParallelExecutor::new(cfg(1), Arc::new(Metrics::new()))
        .process(Cursor::new(feed.clone()), sd.clone())
        .await
        .unwrap();
    assert!(parallel.cancelled);
    assert!(parallel.history.is_empty());

    let serial = SerialExecutor::new(cfg(1), Arc::new(Metrics::new()))
        .process(Cursor::new(feed), sd)
        .await
        .unwrap();
    assert!(serial.cancelled);
    assert_eq!(serial.stats.frames, 0);
}

#[tokio::test]
async fn shutdown_interrupts_a_stalled_source() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let (trigger, sd) = shutdown::channel();

    let task = tokio::spawn(async move {
        SerialExecutor::new(cfg(1), Arc::new(Metrics::new()))
            .process(rx, sd)
            .await
    });

    tx.write_all(&Feed::new().op("AAA", add(1, Side::Bid, 5, 100)).build())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger();

    let report = task.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.history.lines(sym("AAA")), lines(&["1, AAA, [(100, 5)], []"]));
    drop(tx);
}

#[test]
fn cache_emits_only_changed_views() {
    use depth_feed::snapshot::{Snapshot, SnapshotCache, SnapshotSink};

    let cache = SnapshotCache::new(false);
    let level = |px, qty| vec![LevelPxQty { px, qty }];
    let snap = |seq, bids: Vec<LevelPxQty>| Snapshot {
        seq,
        symbol: sym("AAA"),
        bids,
        asks: Vec::new(),
    };

    assert!(cache.offer(snap(1, Vec::new())));
    assert!(cache.offer(snap(2, level(100, 5))));
    // same view under a later sequence number
    assert!(!cache.offer(snap(3, level(100, 5))));
    assert!(cache.offer(snap(4, level(100, 6))));

    assert_eq!(cache.last(sym("AAA")).map(|s| s.seq), Some(4));
    assert!(cache.last(sym("BBB")).is_none());

    let history = cache.history();
    assert_eq!(
        history.lines(sym("AAA")),
        lines(&["1, AAA, [], []", "2, AAA, [(100, 5)], []", "4, AAA, [(100, 6)], []"])
    );
    assert_eq!(history.all.len(), 3);
    assert_eq!(cache.take_history(), history);
    assert!(cache.history().is_empty());
}

#[test]
fn transitions_on_unknown_ids_do_not_mutate() {
    use depth_feed::book::OrderBook;

    let mut book = OrderBook::new();
    assert!(!book.apply(update(9, Side::Bid, 1, 1)).mutated);
    assert!(!book.apply(delete(9, Side::Bid)).mutated);
    assert!(book.apply(add(9, Side::Bid, 4, 10)).mutated);
    // ids are per side
    assert!(!book.apply(execute(9, Side::Ask, 1)).mutated);
    assert!(book.apply(execute(9, Side::Bid, 1)).mutated);
    assert_eq!(book.order(Side::Bid, 9).map(|o| o.volume), Some(3));
    book.assert_invariants();
}
