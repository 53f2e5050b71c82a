//! Bounded escalation queue for operator review.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use haven_types::error::{HavenError, Result};
use haven_types::safety::{EscalationEntry, EscalationStatus, SafetyVerdict};

/// Characters of the offending text kept on an entry.
const EXCERPT_CHARS: usize = 200;

/// In-memory queue of escalated verdicts, oldest evicted first.
#[derive(Debug)]
pub struct EscalationQueue {
    entries: Mutex<VecDeque<EscalationEntry>>,
    capacity: usize,
}

impl EscalationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Queue a verdict for review. Returns the new entry's id.
    pub fn enqueue(&self, user_id: &str, verdict: &SafetyVerdict, text: &str) -> String {
        let entry = EscalationEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            verdict: verdict.clone(),
            excerpt: text.chars().take(EXCERPT_CHARS).collect(),
            created_at: Utc::now(),
            status: EscalationStatus::Pending,
            handled_by: None,
            notes: None,
            handled_at: None,
        };
        let id = entry.id.clone();

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity
            && let Some(evicted) = entries.pop_front()
            && evicted.status == EscalationStatus::Pending
        {
            warn!(entry_id = %evicted.id, "escalation queue full, evicted pending entry");
        }
        entries.push_back(entry);
        info!(entry_id = %id, user_id, severity = %verdict.severity, "verdict escalated");
        id
    }

    /// Pending entries, newest first, optionally for one user.
    pub fn pending(&self, user_id: Option<&str>) -> Vec<EscalationEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| e.status == EscalationStatus::Pending)
            .filter(|e| user_id.is_none_or(|u| e.user_id == u))
            .cloned()
            .collect()
    }

    /// Mark an entry handled.
    ///
    /// # Errors
    ///
    /// [`HavenError::Validation`] if the entry does not exist (or was
    /// evicted) or has already been handled.
    pub fn resolve(
        &self,
        entry_id: &str,
        operator_id: &str,
        notes: Option<String>,
    ) -> Result<EscalationEntry> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| HavenError::validation(format!("unknown escalation entry {entry_id}")))?;
        if entry.status == EscalationStatus::Handled {
            return Err(HavenError::validation(format!(
                "escalation entry {entry_id} already handled"
            )));
        }
        entry.status = EscalationStatus::Handled;
        entry.handled_by = Some(operator_id.to_string());
        entry.notes = notes;
        entry.handled_at = Some(Utc::now());
        info!(entry_id, operator_id, "escalation handled");
        Ok(entry.clone())
    }

    /// Entries held, pending or handled.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
