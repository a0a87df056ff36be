//! Metrics module
//!
//! Prometheus collectors for authentication and authorization outcomes.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "bkt_guard_auth_attempts_total",
        "Authentication attempts",
        &["method", "status"]
    ).unwrap();

    // Authorization metrics
    pub static ref AUTHZ_DECISIONS: CounterVec = register_counter_vec!(
        "bkt_guard_authz_decisions_total",
        "Authorization decisions",
        &["decision"]  // "allow" or "deny"
    ).unwrap();

    pub static ref AUTHZ_DURATION: Histogram = register_histogram!(
        "bkt_guard_authz_duration_seconds",
        "Time spent combining policies for one decision",
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]
    ).unwrap();

    // Policy metrics
    pub static ref POLICY_FAULTS: CounterVec = register_counter_vec!(
        "bkt_guard_policy_faults_total",
        "Stored policies that failed to parse or evaluate",
        &["source"]  // "user", "bucket" or "store"
    ).unwrap();

    pub static ref POLICY_VALIDATION_FAILURES: CounterVec = register_counter_vec!(
        "bkt_guard_policy_validation_failures_total",
        "Policy documents rejected on save",
        &["reason"]
    ).unwrap();
}

/// Record authentication attempt
pub fn record_auth_attempt(method: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    AUTH_ATTEMPTS.with_label_values(&[method, status]).inc();
}

/// Record an authorization decision and how long it took
pub fn record_authz_decision(allowed: bool, duration_secs: f64) {
    let decision = if allowed { "allow" } else { "deny" };
    AUTHZ_DECISIONS.with_label_values(&[decision]).inc();
    AUTHZ_DURATION.observe(duration_secs);
}

/// Record a stored policy that could not be used
pub fn record_policy_fault(source: &str) {
    POLICY_FAULTS.with_label_values(&[source]).inc();
}

/// Record a rejected policy document
pub fn record_policy_validation_failure(reason: &str) {
    POLICY_VALIDATION_FAILURES
        .with_label_values(&[reason])
        .inc();
}

/// Metrics switch carried by each component, set from `metrics.enabled`.
///
/// A disabled recorder drops every observation. The collectors stay
/// registered so `gather_text` output keeps a stable shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorder {
    enabled: bool,
}

impl Default for Recorder {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Recorder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn auth_attempt(&self, method: &str, success: bool) {
        if self.enabled {
            record_auth_attempt(method, success);
        }
    }

    pub fn authz_decision(&self, allowed: bool, duration_secs: f64) {
        if self.enabled {
            record_authz_decision(allowed, duration_secs);
        }
    }

    pub fn policy_fault(&self, source: &str) {
        if self.enabled {
            record_policy_fault(source);
        }
    }

    pub fn policy_validation_failure(&self, reason: &str) {
        if self.enabled {
            record_policy_validation_failure(reason);
        }
    }
}

/// Render the default registry in Prometheus text exposition format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
