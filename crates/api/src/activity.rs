use std::{
    collections::VecDeque,
    sync::Mutex,
};

use watchline_domain::TransactionNotice;
use watchline_watcher::{ListenerError, TransactionListener};

/// Bounded in-memory log of the most recent notices, oldest evicted first.
#[derive(Debug)]
pub struct RecentActivity {
    capacity: usize,
    notices: Mutex<VecDeque<TransactionNotice>>,
}

impl RecentActivity {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            notices: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `limit` notices, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TransactionNotice> {
        let notices = self.notices.lock().expect("mutex poisoned");
        notices.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().expect("mutex poisoned").len()
    }
}

impl TransactionListener for RecentActivity {
    fn on_transaction(&self, notice: &TransactionNotice) -> Result<(), ListenerError> {
        let mut notices = self
            .notices
            .lock()
            .map_err(|_| ListenerError::new("activity log poisoned"))?;
        if notices.len() == self.capacity {
            notices.pop_front();
        }
        notices.push_back(notice.clone());
        Ok(())
    }
}
