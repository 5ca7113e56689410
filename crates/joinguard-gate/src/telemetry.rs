//! Prometheus metrics for the gate

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Gate counters
pub struct GateMetrics {
    pub joins_total: IntCounter,
    pub suspicious_joins_total: IntCounter,
    pub challenges_issued_total: IntCounter,
    pub duplicate_joins_total: IntCounter,
    pub verified_total: IntCounter,
    pub removed_total: IntCounter,
    pub stale_responses_total: IntCounter,
    pub identity_mismatches_total: IntCounter,
    pub platform_failures_total: IntCounterVec,
    pub pending: IntGauge,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self {
            joins_total: IntCounter::new("joinguard_joins_total", "Member joins processed")
                .expect("valid metric"),
            suspicious_joins_total: IntCounter::new(
                "joinguard_suspicious_joins_total",
                "Joins whose profile matched the suspicion heuristic",
            )
            .expect("valid metric"),
            challenges_issued_total: IntCounter::new(
                "joinguard_challenges_issued_total",
                "Verification challenges issued",
            )
            .expect("valid metric"),
            duplicate_joins_total: IntCounter::new(
                "joinguard_duplicate_joins_total",
                "Join notifications absorbed as duplicates",
            )
            .expect("valid metric"),
            verified_total: IntCounter::new("joinguard_verified_total", "Members verified by click")
                .expect("valid metric"),
            removed_total: IntCounter::new("joinguard_removed_total", "Members removed on timeout")
                .expect("valid metric"),
            stale_responses_total: IntCounter::new(
                "joinguard_stale_responses_total",
                "Challenge responses for resolved or unknown verifications",
            )
            .expect("valid metric"),
            identity_mismatches_total: IntCounter::new(
                "joinguard_identity_mismatches_total",
                "Challenge responses from someone other than the challenged member",
            )
            .expect("valid metric"),
            platform_failures_total: IntCounterVec::new(
                Opts::new("joinguard_platform_failures_total", "Failed platform calls"),
                &["action"],
            )
            .expect("valid metric"),
            pending: IntGauge::new("joinguard_pending", "Verifications currently pending")
                .expect("valid metric"),
        }
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.joins_total.clone()))?;
        registry.register(Box::new(self.suspicious_joins_total.clone()))?;
        registry.register(Box::new(self.challenges_issued_total.clone()))?;
        registry.register(Box::new(self.duplicate_joins_total.clone()))?;
        registry.register(Box::new(self.verified_total.clone()))?;
        registry.register(Box::new(self.removed_total.clone()))?;
        registry.register(Box::new(self.stale_responses_total.clone()))?;
        registry.register(Box::new(self.identity_mismatches_total.clone()))?;
        registry.register(Box::new(self.platform_failures_total.clone()))?;
        registry.register(Box::new(self.pending.clone()))?;
        Ok(())
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}
