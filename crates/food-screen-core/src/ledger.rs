use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::inference::PredictionResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Empty,
    NonEmpty,
}

/// Append-only, newest-first history of one session's analyses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLedger {
    entries: VecDeque<PredictionResult>,
}

impl HistoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: PredictionResult) {
        self.entries.push_front(result);
    }

    /// Owned snapshot, newest first.
    #[must_use]
    pub fn all(&self) -> Vec<PredictionResult> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&PredictionResult> {
        self.entries.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn state(&self) -> LedgerState {
        if self.entries.is_empty() {
            LedgerState::Empty
        } else {
            LedgerState::NonEmpty
        }
    }
}
