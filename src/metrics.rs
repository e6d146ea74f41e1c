// src/metrics.rs
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default, Debug)]
pub struct Metrics {
    pub frames_total: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub truncations: AtomicU64,
    pub frames_applied: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub apply_err: AtomicU64,
    pub snapshots: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_frames(&self) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_truncated(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_applied(&self) {
        self.frames_applied.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_apply_err(&self) {
        self.apply_err.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_snapshots(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prometheus_text(&self) -> String {
        let total = self.frames_total.load(Ordering::Relaxed);
        let skipped = self.frames_skipped.load(Ordering::Relaxed);
        let trunc = self.truncations.load(Ordering::Relaxed);
        let applied = self.frames_applied.load(Ordering::Relaxed);
        let dropped = self.frames_dropped.load(Ordering::Relaxed);
        let aerr = self.apply_err.load(Ordering::Relaxed);
        let snaps = self.snapshots.load(Ordering::Relaxed);

        format!(
            "\
# TYPE depth_feed_frames_total counter
depth_feed_frames_total {total}
# TYPE depth_feed_frames_skipped_total counter
depth_feed_frames_skipped_total {skipped}
# TYPE depth_feed_truncations_total counter
depth_feed_truncations_total {trunc}
# TYPE depth_feed_frames_applied_total counter
depth_feed_frames_applied_total {applied}
# TYPE depth_feed_frames_dropped_total counter
depth_feed_frames_dropped_total {dropped}
# TYPE depth_feed_apply_errors_total counter
depth_feed_apply_errors_total {aerr}
# TYPE depth_feed_snapshots_total counter
depth_feed_snapshots_total {snaps}
"
        )
    }
}
