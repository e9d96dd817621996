//! Success and latency bookkeeping per delivery method
//!
//! Relays and proxies come and go; the rotator keeps enough history to try
//! the ones that worked recently first and to rest the ones that keep failing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crawler::strategy::DeliveryMethod;

/// Consecutive failures after which a method is rested
const COOLDOWN_THRESHOLD: u32 = 3;

/// How long a failing method is rested, in seconds
const COOLDOWN_SECS: i64 = 300;

/// Running statistics for one delivery method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyStats {
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub avg_latency_ms: f64,
    pub last_success: Option<i64>,
    pub last_failure: Option<i64>,
}

impl ProxyStats {
    /// Laplace-smoothed success rate minus a small latency penalty
    pub fn score(&self) -> f64 {
        let rate = (self.successes as f64 + 1.0) / (self.successes + self.failures + 2) as f64;
        let penalty = (self.avg_latency_ms / 60_000.0).min(0.2);
        rate - penalty
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    fn is_cooling_down_at(&self, now: i64) -> bool {
        self.consecutive_failures >= COOLDOWN_THRESHOLD
            && self
                .last_failure
                .is_some_and(|t| now - t < COOLDOWN_SECS)
    }
}

/// Shared, cheaply clonable rotator
#[derive(Debug, Clone, Default)]
pub struct ProxyRotator {
    stats: Arc<Mutex<HashMap<String, ProxyStats>>>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl ProxyRotator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProxyStats>> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a successful fetch through `label`
    pub fn record_success(&self, label: &str, latency_ms: u64) {
        self.record_success_at(label, latency_ms, now());
    }

    pub(crate) fn record_success_at(&self, label: &str, latency_ms: u64, at: i64) {
        let mut stats = self.lock();
        let entry = stats.entry(label.to_string()).or_default();
        entry.successes += 1;
        entry.consecutive_failures = 0;
        entry.last_success = Some(at);
        // Exponential moving average keeps old slow runs from dominating
        entry.avg_latency_ms = if entry.successes == 1 {
            latency_ms as f64
        } else {
            entry.avg_latency_ms * 0.7 + latency_ms as f64 * 0.3
        };
    }

    /// Record a failed fetch through `label`
    pub fn record_failure(&self, label: &str) {
        self.record_failure_at(label, now());
    }

    pub(crate) fn record_failure_at(&self, label: &str, at: i64) {
        let mut stats = self.lock();
        let entry = stats.entry(label.to_string()).or_default();
        entry.failures += 1;
        entry.consecutive_failures += 1;
        entry.last_failure = Some(at);
        if entry.consecutive_failures == COOLDOWN_THRESHOLD {
            debug!("{} failed {} times in a row, resting it", label, COOLDOWN_THRESHOLD);
        }
    }

    /// Score of `label`; unknown methods score as a coin flip
    pub fn score(&self, label: &str) -> f64 {
        self.lock().get(label).map(|s| s.score()).unwrap_or(0.5)
    }

    pub fn stats(&self, label: &str) -> Option<ProxyStats> {
        self.lock().get(label).cloned()
    }

    pub fn is_cooling_down(&self, label: &str) -> bool {
        self.is_cooling_down_at(label, now())
    }

    fn is_cooling_down_at(&self, label: &str, at: i64) -> bool {
        self.lock()
            .get(label)
            .is_some_and(|s| s.is_cooling_down_at(at))
    }

    /// Order `methods` best-first, dropping rested ones unless all are rested
    pub fn rank(&self, methods: Vec<DeliveryMethod>) -> Vec<DeliveryMethod> {
        self.rank_at(methods, now())
    }

    pub(crate) fn rank_at(&self, methods: Vec<DeliveryMethod>, at: i64) -> Vec<DeliveryMethod> {
        let mut scored: Vec<(f64, bool, DeliveryMethod)> = methods
            .into_iter()
            .map(|m| {
                let label = m.label();
                (self.score(&label), self.is_cooling_down_at(&label, at), m)
            })
            .collect();

        if scored.iter().any(|(_, cooling, _)| !cooling) {
            scored.retain(|(_, cooling, _)| !cooling);
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, _, m)| m).collect()
    }

    /// Copy of all statistics, sorted by label
    pub fn snapshot(&self) -> Vec<(String, ProxyStats)> {
        let mut all: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Replace statistics for the given labels
    pub fn restore(&self, records: impl IntoIterator<Item = (String, ProxyStats)>) {
        let mut stats = self.lock();
        for (label, record) in records {
            stats.insert(label, record);
        }
    }
}
