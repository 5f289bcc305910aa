//! Metrics-based operation hooks for provider attempts and retries.
//!
//! ```rust
//! use sbobserve::MetricsOperationHooks;
//! use sbprovider::OperationHooks;
//!
//! fn accepts_hooks(_hooks: &dyn OperationHooks) {}
//!
//! accepts_hooks(&MetricsOperationHooks);
//! ```

use std::time::Duration;

use sbprovider::{OperationHooks, ProviderError};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsOperationHooks;

impl OperationHooks for MetricsOperationHooks {
    fn on_attempt_start(&self, provider: &str, operation: &str, _attempt: u32) {
        metrics::counter!(
            "switchboard_provider_attempt_start_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(
        &self,
        provider: &str,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        metrics::counter!(
            "switchboard_provider_retry_scheduled_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "switchboard_provider_retry_delay_seconds",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, provider: &str, operation: &str, _attempts: u32) {
        metrics::counter!(
            "switchboard_provider_success_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_failure(&self, provider: &str, operation: &str, _attempts: u32, error: &ProviderError) {
        metrics::counter!(
            "switchboard_provider_failure_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }
}
