//! Bounded event history.
//!
//! A ring buffer of [`HistoryRecord`]s: appending beyond capacity evicts
//! the oldest record first.

use std::collections::VecDeque;

use haven_types::event::{Delivery, HistoryRecord};

/// Default number of records returned by a history query.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// History query filter.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    /// Only records on this topic.
    pub topic: Option<String>,
    /// Only records whose metadata names this user.
    pub user_id: Option<String>,
    /// Maximum records returned.
    pub limit: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            topic: None,
            user_id: None,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl HistoryFilter {
    /// Filter on a single topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Restrict to one user.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn matches(&self, record: &HistoryRecord) -> bool {
        if let Some(topic) = &self.topic
            && &record.event.topic != topic
        {
            return false;
        }
        if let Some(user) = &self.user_id
            && record.event.metadata.user_id.as_ref() != Some(user)
        {
            return false;
        }
        true
    }
}

/// Capacity-bounded ring buffer of history records.
pub(crate) struct History {
    records: VecDeque<HistoryRecord>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest when full.
    pub(crate) fn push(&mut self, record: HistoryRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Attach delivery results to a record, if it has not been evicted.
    pub(crate) fn attach_deliveries(&mut self, event_id: &str, deliveries: Vec<Delivery>) {
        if let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|r| r.event.id == event_id)
        {
            record.deliveries = deliveries;
        }
    }

    /// Matching records, newest first.
    pub(crate) fn query(&self, filter: &HistoryFilter) -> Vec<HistoryRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}
