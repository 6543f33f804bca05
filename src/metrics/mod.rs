//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission outcomes and latency
//! - Fee corrections
//! - Failures per pipeline stage
//! - Broadcasts whose status could not be observed

use crate::error::SubmitError;
use crate::tx::SubmissionResult;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "strkloop_submissions_total",
        "Submission attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref STAGE_FAILURES: CounterVec = register_counter_vec!(
        "strkloop_stage_failures_total",
        "Failed submission attempts by stage and error kind",
        &["stage", "kind"]
    ).unwrap();

    pub static ref FEE_CORRECTIONS: IntCounter = register_int_counter!(
        "strkloop_fee_corrections_total",
        "Envelopes re-signed with a raised fee cap"
    ).unwrap();

    pub static ref STATUS_UNKNOWN: IntCounter = register_int_counter!(
        "strkloop_status_unknown_total",
        "Broadcast transactions whose status could not be read"
    ).unwrap();

    pub static ref SUBMISSION_LATENCY: HistogramVec = register_histogram_vec!(
        "strkloop_submission_latency_seconds",
        "Time from assembly to resolved status",
        &["outcome"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_submission(result: &Result<SubmissionResult, SubmitError>, latency_secs: f64) {
    let outcome = match result {
        Ok(r) if r.is_status_known() => "resolved",
        Ok(_) => "status_unknown",
        Err(_) => "failed",
    };
    SUBMISSIONS.with_label_values(&[outcome]).inc();
    SUBMISSION_LATENCY
        .with_label_values(&[outcome])
        .observe(latency_secs);
}

pub fn record_stage_failure(err: &SubmitError) {
    STAGE_FAILURES
        .with_label_values(&[err.stage().as_str(), err.kind()])
        .inc();
}

pub fn record_fee_correction() {
    FEE_CORRECTIONS.inc();
}

pub fn record_status_unknown() {
    STATUS_UNKNOWN.inc();
}
