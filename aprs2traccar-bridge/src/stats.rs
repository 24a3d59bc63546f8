///! Operational counters shared by the feed reader and the dispatcher
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BridgeStats {
    lines: AtomicU64,
    comments: AtomicU64,
    positions: AtomicU64,
    not_position: AtomicU64,
    malformed: AtomicU64,
    matched: AtomicU64,
    pushed: AtomicU64,
    push_failures: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub comments: u64,
    pub positions: u64,
    pub not_position: u64,
    pub malformed: u64,
    pub matched: u64,
    pub pushed: u64,
    pub push_failures: u64,
    pub reconnects: u64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_comment(&self) {
        self.comments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_position(&self) {
        self.positions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_position(&self) {
        self.not_position.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            comments: self.comments.load(Ordering::Relaxed),
            positions: self.positions.load(Ordering::Relaxed),
            not_position: self.not_position.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines ({} comments, {} positions, {} other, {} malformed), {} matched, {} pushed, {} push failures, {} reconnects",
            self.lines,
            self.comments,
            self.positions,
            self.not_position,
            self.malformed,
            self.matched,
            self.pushed,
            self.push_failures,
            self.reconnects
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_display() {
        let stats = BridgeStats::new();
        stats.record_line();
        stats.record_line();
        stats.record_position();
        stats.record_malformed();
        stats.record_reconnect();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines, 2);
        assert_eq!(snapshot.positions, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.pushed, 0);
        assert_eq!(
            snapshot.to_string(),
            "2 lines (0 comments, 1 positions, 0 other, 1 malformed), 0 matched, 0 pushed, 0 push failures, 1 reconnects"
        );
    }
}
