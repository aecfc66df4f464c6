use serde::Serialize;

// Propagation metrics
// Thread-local storage: each backend runs one propagation at a time
thread_local! {
    static METRICS: std::cell::RefCell<PropagationMetrics> = const { std::cell::RefCell::new(PropagationMetrics::new_const()) };
}

/// Counters accumulated by this backend
#[derive(Debug, Default, Clone)]
struct PropagationMetrics {
    /// Calls into the propagator (fleet, alteration, drop, activation)
    propagations: u64,
    /// Prerequisites returned by the resolver
    prerequisites_resolved: u64,
    /// Rows added to the distributed object catalog
    objects_recorded: u64,
    /// Statements executed on workers, summed over nodes
    statements_sent: u64,
    /// Node-level failures, including unreachable nodes
    remote_failures: u64,
    /// "Value already exists" failures ignored on the enum path
    tolerated_duplicates: u64,
    /// Enum additions that left the fleet inconsistent
    partial_enum_failures: u64,
    /// Total time spent in the propagator (nanoseconds)
    total_timing_ns: u128,
}

impl PropagationMetrics {
    const fn new_const() -> Self {
        Self {
            propagations: 0,
            prerequisites_resolved: 0,
            objects_recorded: 0,
            statements_sent: 0,
            remote_failures: 0,
            tolerated_duplicates: 0,
            partial_enum_failures: 0,
            total_timing_ns: 0,
        }
    }
}

/// Public interface for metrics tracking
pub mod metrics_api {
    use super::*;

    /// Record the start of a propagation
    pub fn record_propagation_start() -> PropagationTimer {
        PropagationTimer::new()
    }

    /// Record completion of a propagation, successful or not
    pub fn record_propagation_complete(prerequisites: usize, timer: PropagationTimer) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            metrics.propagations += 1;
            metrics.prerequisites_resolved += prerequisites as u64;
            metrics.total_timing_ns += timer.elapsed_ns();
        });
    }

    pub fn record_statements_sent(count: usize) {
        METRICS.with(|m| {
            m.borrow_mut().statements_sent += count as u64;
        });
    }

    pub fn record_object_recorded() {
        METRICS.with(|m| {
            m.borrow_mut().objects_recorded += 1;
        });
    }

    pub fn record_remote_failure() {
        METRICS.with(|m| {
            m.borrow_mut().remote_failures += 1;
        });
    }

    pub fn record_tolerated_duplicate() {
        METRICS.with(|m| {
            m.borrow_mut().tolerated_duplicates += 1;
        });
    }

    pub fn record_partial_enum_failure() {
        METRICS.with(|m| {
            m.borrow_mut().partial_enum_failures += 1;
        });
    }

    /// Current counters
    pub fn snapshot() -> PropagationStats {
        METRICS.with(|m| {
            let metrics = m.borrow();
            PropagationStats {
                propagations: metrics.propagations,
                prerequisites_resolved: metrics.prerequisites_resolved,
                objects_recorded: metrics.objects_recorded,
                statements_sent: metrics.statements_sent,
                remote_failures: metrics.remote_failures,
                tolerated_duplicates: metrics.tolerated_duplicates,
                partial_enum_failures: metrics.partial_enum_failures,
                total_timing_ns: metrics.total_timing_ns,
            }
        })
    }

    /// Reset metrics
    pub fn reset_metrics() {
        METRICS.with(|m| {
            *m.borrow_mut() = PropagationMetrics::default();
        });
    }
}

/// Timer for measuring propagation duration
pub struct PropagationTimer {
    start: std::time::Instant,
}

impl PropagationTimer {
    fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    fn elapsed_ns(&self) -> u128 {
        self.start.elapsed().as_nanos()
    }
}

/// Statistics returned by metrics functions
#[derive(Debug, Clone, Serialize)]
pub struct PropagationStats {
    pub propagations: u64,
    pub prerequisites_resolved: u64,
    pub objects_recorded: u64,
    pub statements_sent: u64,
    pub remote_failures: u64,
    pub tolerated_duplicates: u64,
    pub partial_enum_failures: u64,
    pub total_timing_ns: u128,
}

impl PropagationStats {
    /// Convert timing to milliseconds
    pub fn total_timing_ms(&self) -> f64 {
        self.total_timing_ns as f64 / 1_000_000.0
    }

    /// Average statements per propagation
    pub fn statements_per_propagation(&self) -> f64 {
        if self.propagations == 0 {
            0.0
        } else {
            self.statements_sent as f64 / self.propagations as f64
        }
    }
}
