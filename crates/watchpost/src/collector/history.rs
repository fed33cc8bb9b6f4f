use std::collections::{HashMap, VecDeque};

use crate::types::ProbeResult;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded per-service result history, oldest evicted first
#[derive(Debug)]
pub struct History {
    capacity: usize,
    results: HashMap<String, VecDeque<ProbeResult>>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), results: HashMap::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start accepting results for `id`
    pub fn track(&mut self, id: &str) {
        self.results.entry(id.to_string()).or_default();
    }

    pub fn forget(&mut self, id: &str) {
        self.results.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.results.contains_key(id)
    }

    /// Append a result; returns false if its service is not tracked
    pub fn push(&mut self, result: ProbeResult) -> bool {
        let Some(results) = self.results.get_mut(&result.id) else {
            return false;
        };
        results.push_back(result);
        while results.len() > self.capacity {
            results.pop_front();
        }
        true
    }

    pub fn latest(&self, id: &str) -> Option<&ProbeResult> {
        self.results.get(id).and_then(|results| results.back())
    }

    pub fn results(&self, id: &str) -> Option<&VecDeque<ProbeResult>> {
        self.results.get(id)
    }

    /// Copy of the most recent `limit` results, oldest first
    pub fn snapshot(&self, id: &str, limit: Option<usize>) -> Vec<ProbeResult> {
        let Some(results) = self.results.get(id) else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |limit| results.len().saturating_sub(limit));
        results.iter().skip(skip).cloned().collect()
    }

    /// Tracked service ids in ascending order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.results.keys().cloned().collect();
        ids.sort();
        ids
    }
}
