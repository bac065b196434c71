//! Prometheus metrics for the analytics engine
//!
//! Tracks delegation validation outcomes, graph audits, aggregation cost and
//! the snapshot log.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

// ========== Delegation Integrity ==========

/// Delegation validations by outcome (valid / cycle / depth_exceeded / too_complex)
pub static DELEGATION_VALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "govscope_delegation_validations_total",
        "Total delegation validations by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Warning levels emitted by the notifying check
pub static DELEGATION_WARNINGS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "govscope_delegation_warnings_total",
        "Delegation warnings emitted by level",
        &["level"]
    )
    .unwrap()
});

/// Cycle analyses refused because the local graph was too large
pub static TOO_COMPLEX_REFUSALS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "govscope_cycle_analysis_too_complex_total",
        "Cycle analyses refused as too complex for online evaluation"
    )
    .unwrap()
});

/// Loops found by the periodic whole-graph audit
pub static GLOBAL_LOOPS_DETECTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "govscope_global_loops_detected_total",
        "Delegation loops found by the global audit"
    )
    .unwrap()
});

/// Delegation observations recorded
pub static DELEGATIONS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "govscope_delegations_recorded_total",
        "Delegation observations recorded",
        &["kind"]
    )
    .unwrap()
});

// ========== Aggregation ==========

/// Wall-clock cost of windowed aggregations
pub static AGGREGATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "govscope_aggregation_seconds",
        "Time spent in windowed aggregations",
        &["aggregation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap()
});

/// Items skipped by bulk scans because their reads failed
pub static SCAN_ITEMS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "govscope_scan_items_skipped_total",
        "Items excluded from bulk scans after a failed read",
        &["aggregation"]
    )
    .unwrap()
});

// ========== Snapshot Log ==========

/// Snapshots appended to the analytics log
pub static SNAPSHOTS_APPENDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "govscope_snapshots_appended_total",
        "Analytics snapshots appended"
    )
    .unwrap()
});

/// Most recent governance health score (0-100)
pub static HEALTH_SCORE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "govscope_health_score",
        "Most recently computed governance health score"
    )
    .unwrap()
});
