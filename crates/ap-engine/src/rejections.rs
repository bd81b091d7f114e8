// rejections.rs - Fingerprints of rejected actions, oldest evicted first.
//
// A proposal whose fingerprint is remembered here is dropped instead of
// being queued again. The memory is bounded so a long-running engine that
// keeps rejecting fresh proposals does not grow its snapshot without limit.

use std::collections::{HashSet, VecDeque};

/// Most fingerprints remembered at once.
pub const REJECTION_MEMORY_LIMIT: usize = 1_000;

#[derive(Debug, Clone)]
pub struct RejectionMemory {
    order: VecDeque<String>,
    known: HashSet<String>,
    limit: usize,
}

impl Default for RejectionMemory {
    fn default() -> Self {
        Self::with_limit(REJECTION_MEMORY_LIMIT)
    }
}

impl RejectionMemory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            order: VecDeque::new(),
            known: HashSet::new(),
            limit: limit.max(1),
        }
    }

    /// Rebuild from a saved list, oldest first. Only the newest `limit`
    /// entries survive.
    pub fn restore(fingerprints: Vec<String>, limit: usize) -> Self {
        let mut memory = Self::with_limit(limit);
        for fingerprint in fingerprints {
            memory.remember(fingerprint);
        }
        memory
    }

    /// Remember a fingerprint. Remembering one again makes it the newest.
    pub fn remember(&mut self, fingerprint: String) {
        if !self.known.insert(fingerprint.clone()) {
            self.order.retain(|f| f != &fingerprint);
        }
        self.order.push_back(fingerprint);
        while self.order.len() > self.limit {
            if let Some(evicted) = self.order.pop_front() {
                self.known.remove(&evicted);
            }
        }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.known.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Oldest first, the order `restore` expects.
    pub fn to_vec(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}
