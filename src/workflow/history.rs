use crate::session::{HistoryRecord, RecordStatus};

/// Snapshot of past sessions, replaced wholesale on every successful fetch.
///
/// Fetches are tagged with tickets. A response older than the snapshot
/// already shown is dropped, and the cache stays loading until the newest
/// request has answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryCache {
    records: Vec<HistoryRecord>,
    requested: u64,
    applied: u64,
    settled: u64,
}

/// Aggregates shown above the history list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub total: usize,
    pub successful: usize,
    pub planar_surfaces: u64,
}

impl HistoryCache {
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.requested > self.settled
    }

    pub fn find(&self, record_id: &str) -> Option<&HistoryRecord> {
        self.records.iter().find(|record| record.id == record_id)
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            total: self.records.len(),
            successful: self
                .records
                .iter()
                .filter(|record| record.status == RecordStatus::Success)
                .count(),
            planar_surfaces: self
                .records
                .iter()
                .map(|record| u64::from(record.planar_surfaces))
                .sum(),
        }
    }

    pub fn begin_fetch(&mut self, ticket: u64) {
        self.requested = self.requested.max(ticket);
    }

    /// Returns `false` when the response is older than the snapshot held, or
    /// was never requested.
    pub fn replace(&mut self, ticket: u64, records: Vec<HistoryRecord>) -> bool {
        if ticket <= self.applied || ticket > self.requested {
            tracing::debug!(ticket, applied = self.applied, "discarding stale history response");
            return false;
        }
        self.records = records;
        self.applied = ticket;
        self.settled = self.settled.max(ticket);
        true
    }

    /// Soft failure: the previous list stays visible.
    pub fn fetch_failed(&mut self, ticket: u64, message: &str) {
        tracing::warn!(
            ticket,
            retained = self.records.len(),
            "failed to fetch history: {message}"
        );
        if ticket <= self.requested {
            self.settled = self.settled.max(ticket);
        }
    }
}
