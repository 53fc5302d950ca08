use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by chrono
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
///
/// Used by tests and simulations to step through windows deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    /// Jump to an absolute instant
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Duration as whole milliseconds, clamped to `i64::MAX`
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Whole seconds covering `millis`, rounded up. Negative spans count as zero.
pub fn ceil_secs(millis: i64) -> u64 {
    u64::try_from(millis).unwrap_or(0).div_ceil(1000)
}

/// Build a storage key from a base key and a caller subject
pub fn subject_key(base: &str, subject: &str) -> String {
    if subject.is_empty() {
        base.to_string()
    } else {
        format!("{}:{}", base, subject)
    }
}

/// Turn a retry-after hint into the message shown to a throttled customer.
///
/// Below one hour the wait is phrased in minutes, otherwise in hours; both
/// round up.
pub fn format_retry_message(retry_after_secs: u64) -> String {
    let minutes = retry_after_secs.div_ceil(60);

    let (amount, unit) = if minutes < 60 {
        (minutes, "minuto")
    } else {
        (minutes.div_ceil(60), "hora")
    };
    let plural = if amount == 1 { "" } else { "s" };

    format!(
        "Has alcanzado el límite de intentos. Por favor, espera {} {}{} antes de intentar nuevamente.",
        amount, unit, plural
    )
}
