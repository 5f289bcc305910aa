//! Per-adapter call statistics, safe under concurrent increment.
//!
//! ```rust
//! use sbprovider::AdapterStats;
//!
//! let stats = AdapterStats::new();
//! stats.record_retry();
//! assert_eq!(stats.snapshot().retries, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::{OperationHooks, ProviderError, TokenUsage};

#[derive(Debug, Default)]
pub struct AdapterStats {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

/// Plain-value view of [`AdapterStats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl AdapterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_usage(&self, usage: TokenUsage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Retry accounting rides the same hook seam the observability crates use,
/// so the retry loop needs no knowledge of the stats object.
impl OperationHooks for AdapterStats {
    fn on_attempt_start(&self, _provider: &str, _operation: &str, attempt: u32) {
        if attempt == 1 {
            self.record_request();
        }
    }

    fn on_retry_scheduled(
        &self,
        _provider: &str,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
        self.record_retry();
    }

    fn on_success(&self, _provider: &str, _operation: &str, _attempts: u32) {
        self.record_success();
    }

    fn on_failure(&self, _provider: &str, _operation: &str, _attempts: u32, _error: &ProviderError) {
        self.record_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_driven_accounting_counts_one_request_per_call() {
        let stats = AdapterStats::new();
        stats.on_attempt_start("p", "complete", 1);
        stats.on_retry_scheduled(
            "p",
            "complete",
            1,
            Duration::from_secs(1),
            &ProviderError::unavailable("oops"),
        );
        stats.on_attempt_start("p", "complete", 2);
        stats.on_success("p", "complete", 2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 0);
    }

    #[test]
    fn usage_totals_accumulate() {
        let stats = AdapterStats::new();
        stats.record_usage(TokenUsage::new(10, 4, 14));
        stats.record_usage(TokenUsage::new(3, 2, 5));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.prompt_tokens, 13);
        assert_eq!(snapshot.completion_tokens, 6);
    }
}
