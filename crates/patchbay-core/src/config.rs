// ── Runtime monitor configuration ──
//
// Describes how a monitor behaves once running. Never touches disk; the
// CLI builds a `MonitorConfig` (usually from patchbay-config) and hands
// it in.

use std::time::Duration;

use patchbay_engine::SubscriptionFlags;

/// Tuning for a single [`Monitor`](crate::Monitor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Default scope for devices discovered after construction.
    pub autosubscribe: SubscriptionFlags,
    /// Lease handed to the engine with every subscribe request.
    pub subscribe_timeout: Duration,
    /// Longest single wait inside [`Monitor::poll_until`](crate::Monitor::poll_until).
    pub poll_interval: Duration,
    /// Upper bound on updates one poll keeps draining after its first wait.
    pub drain_budget: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            autosubscribe: SubscriptionFlags::empty(),
            subscribe_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            drain_budget: 4096,
        }
    }
}
