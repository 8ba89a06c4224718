//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `secret_protection_reconciliations_total` - Total number of reconciliations
//! - `secret_protection_reconciliation_errors_total` - Total number of reconciliation errors
//! - `secret_protection_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `secret_protection_finalizers_removed_total` - Finalizers released from secrets
//! - `secret_protection_requeues_total` - Requeues by reason
//! - `secret_protection_conflicts_total` - Optimistic-concurrency conflicts on finalizer writes
//! - `secret_protection_still_needed_total` - Deletions deferred, by the kind that held the secret
//! - `secret_protection_indexed_objects` - Objects cached in the reference index, by kind

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_protection_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_protection_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "secret_protection_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static FINALIZERS_REMOVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_protection_finalizers_removed_total",
        "Total number of protection finalizers released",
    )
    .expect("Failed to create FINALIZERS_REMOVED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_protection_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_protection_conflicts_total",
        "Total number of conflicting finalizer writes",
    )
    .expect("Failed to create CONFLICTS_TOTAL metric - this should never happen")
});

static STILL_NEEDED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_protection_still_needed_total",
            "Total number of deferred deletions by referencing kind",
        ),
        &["kind"],
    )
    .expect("Failed to create STILL_NEEDED_TOTAL metric - this should never happen")
});

static INDEXED_OBJECTS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "secret_protection_indexed_objects",
            "Current number of objects in the reference index by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create INDEXED_OBJECTS metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_REMOVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STILL_NEEDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INDEXED_OBJECTS.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_finalizers_removed() {
    FINALIZERS_REMOVED_TOTAL.inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_conflicts() {
    CONFLICTS_TOTAL.inc();
}

pub fn increment_still_needed(kind: &str) {
    STILL_NEEDED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_indexed_objects(kind: &str, count: usize) {
    INDEXED_OBJECTS
        .with_label_values(&[kind])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        assert_eq!(RECONCILIATION_ERRORS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_labelled_counters() {
        let before = STILL_NEEDED_TOTAL.with_label_values(&["PG"]).get();
        increment_still_needed("PG");
        assert_eq!(STILL_NEEDED_TOTAL.with_label_values(&["PG"]).get(), before + 1u64);

        let before = REQUEUES_TOTAL.with_label_values(&["still_needed"]).get();
        increment_requeues("still_needed");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["still_needed"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_set_indexed_objects() {
        set_indexed_objects("ProjectVPC", 7);
        assert_eq!(INDEXED_OBJECTS.with_label_values(&["ProjectVPC"]).get(), 7);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before_count = RECONCILIATION_DURATION.get_sample_count();
        let before_sum = RECONCILIATION_DURATION.get_sample_sum();
        observe_reconciliation_duration(0.02);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before_count);
        assert!(RECONCILIATION_DURATION.get_sample_sum() >= before_sum + 0.02 - f64::EPSILON);
    }
}
