use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counters for the relay engine.
#[derive(Debug, Default)]
pub struct RelayStats {
    broadcasts: AtomicU64,
    recipients: AtomicU64,
    direct_delivered: AtomicU64,
    unknown_recipient: AtomicU64,
    rejected: AtomicU64,
    departures: AtomicU64,
    orphans_closed: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub broadcasts: u64,
    pub recipients: u64,
    pub direct_delivered: u64,
    pub unknown_recipient: u64,
    pub rejected: u64,
    pub departures: u64,
    pub orphans_closed: u64,
}

impl RelayStats {
    pub fn record_broadcast(&self, recipients: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.recipients.fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn record_direct(&self) {
        self.direct_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_recipient(&self) {
        self.unknown_recipient.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_departure(&self) {
        self.departures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphan_closed(&self) {
        self.orphans_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            recipients: self.recipients.load(Ordering::Relaxed),
            direct_delivered: self.direct_delivered.load(Ordering::Relaxed),
            unknown_recipient: self.unknown_recipient.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            departures: self.departures.load(Ordering::Relaxed),
            orphans_closed: self.orphans_closed.load(Ordering::Relaxed),
        }
    }
}
