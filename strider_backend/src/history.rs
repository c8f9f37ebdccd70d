use chrono::Utc;
use std::collections::VecDeque;

use crate::transcript::Transcript;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub day: u32,
    pub title: String,
    pub body: String,
}

/// Rolling window of generated posts, mirrored to an unbounded text log.
///
/// The in-memory window is what feeds prompts; the durable copy is a transcript only and
/// a failed write never affects the window.
pub struct HistoryLedger {
    capacity: usize,
    window: VecDeque<HistoryEntry>,
    durable: Option<Transcript>,
}

impl HistoryLedger {
    pub fn new(capacity: usize, durable: Option<Transcript>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
            durable,
        }
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        if let Some(durable) = &self.durable {
            durable.append_best_effort(
                Utc::now(),
                &format!("Day {}", entry.day),
                &[("Title", entry.title.as_str()), ("Body", entry.body.as_str())],
            );
        }

        self.window.push_back(entry);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    /// Up to `k` most recent entries, oldest first.
    pub fn recent_context(&self, k: usize) -> Vec<HistoryEntry> {
        let skip = self.window.len().saturating_sub(k);
        self.window.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.window.back()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
