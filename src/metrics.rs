use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for the attempt limiters
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Limiter decisions
    attempt_checks: CounterVec,
    attempts_recorded: CounterVec,
    records_cleared: CounterVec,
    lockouts: CounterVec,
    unknown_limiter_requests: Counter,

    // Storage health
    storage_errors: CounterVec,

    request_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let attempt_checks = CounterVec::new(
            Opts::new(
                "ratelimit_attempt_checks_total",
                "Number of attempt checks by outcome",
            ),
            &["limiter", "outcome"],
        )?;

        let attempts_recorded = CounterVec::new(
            Opts::new(
                "ratelimit_attempts_recorded_total",
                "Number of attempts recorded",
            ),
            &["limiter"],
        )?;

        let records_cleared = CounterVec::new(
            Opts::new(
                "ratelimit_records_cleared_total",
                "Number of explicit record clears",
            ),
            &["limiter"],
        )?;

        let lockouts = CounterVec::new(
            Opts::new(
                "ratelimit_lockouts_total",
                "Number of transitions into lockout",
            ),
            &["limiter"],
        )?;

        let unknown_limiter_requests = Counter::new(
            "ratelimit_unknown_limiter_requests_total",
            "Number of requests naming a limiter that is not configured",
        )?;

        let storage_errors = CounterVec::new(
            Opts::new(
                "ratelimit_storage_errors_total",
                "Number of failed storage operations by type",
            ),
            &["operation"],
        )?;

        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "ratelimit_request_duration_seconds",
            "Duration of limiter operations in seconds",
        ))?;

        registry.register(Box::new(attempt_checks.clone()))?;
        registry.register(Box::new(attempts_recorded.clone()))?;
        registry.register(Box::new(records_cleared.clone()))?;
        registry.register(Box::new(lockouts.clone()))?;
        registry.register(Box::new(unknown_limiter_requests.clone()))?;
        registry.register(Box::new(storage_errors.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            attempt_checks,
            attempts_recorded,
            records_cleared,
            lockouts,
            unknown_limiter_requests,
            storage_errors,
            request_duration,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an allowed check
    pub fn record_allowed(&self, limiter: &str) {
        self.attempt_checks
            .with_label_values(&[limiter, "allowed"])
            .inc();
    }

    /// Record a blocked check
    pub fn record_blocked(&self, limiter: &str) {
        self.attempt_checks
            .with_label_values(&[limiter, "blocked"])
            .inc();
    }

    pub fn record_attempt(&self, limiter: &str) {
        self.attempts_recorded.with_label_values(&[limiter]).inc();
    }

    pub fn record_clear(&self, limiter: &str) {
        self.records_cleared.with_label_values(&[limiter]).inc();
    }

    /// Record a limiter entering lockout
    pub fn record_lockout(&self, limiter: &str) {
        self.lockouts.with_label_values(&[limiter]).inc();
    }

    pub fn record_unknown_limiter(&self) {
        self.unknown_limiter_requests.inc();
    }

    /// Record a failed storage operation ("read", "write" or "delete")
    pub fn record_storage_error(&self, operation: &str) {
        self.storage_errors.with_label_values(&[operation]).inc();
    }

    /// Create a timer for measuring request duration
    pub fn start_request_timer(&self) -> prometheus::HistogramTimer {
        self.request_duration.start_timer()
    }
}
