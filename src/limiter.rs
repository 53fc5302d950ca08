use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    error::{RateLimitError, Result},
    metrics::Metrics,
    record::AttemptRecord,
    store::AttemptStore,
    utils::{ceil_secs, duration_millis, subject_key, Clock},
};

/// Storage key of the order submission limiter
pub const ORDER_SUBMISSION_KEY: &str = "rate_limit_pedidos";

/// Storage key of the contact message limiter
pub const CONTACT_MESSAGE_KEY: &str = "rate_limit_contacto";

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

/// Fixed parameters of one limiter.
///
/// `window` is both the counting window and the lockout length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterSettings {
    max_attempts: u32,
    window: Duration,
    storage_key: String,
}

impl LimiterSettings {
    /// Validate and build settings
    pub fn new(max_attempts: u32, window: Duration, storage_key: impl Into<String>) -> Result<Self> {
        let storage_key = storage_key.into();

        if max_attempts == 0 {
            return Err(RateLimitError::Config(format!(
                "max_attempts must be positive for limiter '{}'",
                storage_key
            )));
        }
        if window < Duration::from_millis(1) {
            return Err(RateLimitError::Config(format!(
                "window must be at least one millisecond for limiter '{}'",
                storage_key
            )));
        }
        if storage_key.is_empty() {
            return Err(RateLimitError::Config(
                "storage_key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            max_attempts,
            window,
            storage_key,
        })
    }

    /// Three orders per hour
    pub fn order_submission() -> Self {
        Self {
            max_attempts: 3,
            window: ONE_HOUR,
            storage_key: ORDER_SUBMISSION_KEY.to_string(),
        }
    }

    /// Five contact messages per hour
    pub fn contact_message() -> Self {
        Self {
            max_attempts: 5,
            window: ONE_HOUR,
            storage_key: CONTACT_MESSAGE_KEY.to_string(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    fn window_millis(&self) -> i64 {
        duration_millis(self.window)
    }
}

/// Outcome of asking whether an attempt may proceed now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AttemptDecision {
    Allowed { remaining_attempts: u32 },
    Blocked { retry_after_secs: u64 },
}

impl AttemptDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AttemptDecision::Allowed { .. })
    }

    pub fn remaining_attempts(&self) -> Option<u32> {
        match self {
            AttemptDecision::Allowed { remaining_attempts } => Some(*remaining_attempts),
            AttemptDecision::Blocked { .. } => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AttemptDecision::Allowed { .. } => None,
            AttemptDecision::Blocked { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// Keyed attempt counter with lockout.
///
/// Callers check [`can_attempt`](Self::can_attempt) before acting and call
/// [`record_attempt`](Self::record_attempt) once the action went through.
/// Storage failures are logged and never reach the caller; an unreadable
/// record counts as no record at all.
///
/// Reads and writes are not atomic. Two callers racing on the same key can
/// lose an increment or both write the lockout.
#[derive(Clone)]
pub struct RateLimiter {
    settings: LimiterSettings,
    key: String,
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl RateLimiter {
    /// Create a limiter over the given store and clock
    pub fn new(settings: LimiterSettings, store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        let key = settings.storage_key.clone();
        Self {
            settings,
            key,
            store,
            clock,
            metrics: None,
        }
    }

    /// Limiter guarding order submission
    pub fn order_submission(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(LimiterSettings::order_submission(), store, clock)
    }

    /// Limiter guarding contact messages
    pub fn contact_message(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(LimiterSettings::contact_message(), store, clock)
    }

    /// Count storage failures and lockouts in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Same limits, separate record keyed by `subject`
    pub fn for_subject(&self, subject: &str) -> Self {
        Self {
            key: subject_key(&self.settings.storage_key, subject),
            ..self.clone()
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Key this limiter's record is stored under
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Decide whether an attempt may proceed now.
    ///
    /// This is not a pure read: an expired record is deleted, and reaching
    /// the limit writes the lockout back. It never changes the count.
    pub async fn can_attempt(&self) -> AttemptDecision {
        let now = self.clock.now_millis();

        let Some(record) = self.read_record().await else {
            return self.fresh_decision();
        };

        if let Some(blocked_until) = record.blocked_until {
            if now < blocked_until {
                let retry_after_secs = ceil_secs(blocked_until.saturating_sub(now));
                debug!(key = %self.key, retry_after_secs, "attempt blocked by active lockout");
                return AttemptDecision::Blocked { retry_after_secs };
            }

            debug!(key = %self.key, "lockout expired, clearing record");
            self.clear_record().await;
            return self.fresh_decision();
        }

        let window_millis = self.settings.window_millis();
        if record.window_expired(now, window_millis) {
            debug!(key = %self.key, "window expired, clearing record");
            self.clear_record().await;
            return self.fresh_decision();
        }

        if record.count < self.settings.max_attempts {
            return AttemptDecision::Allowed {
                remaining_attempts: self.settings.max_attempts - record.count,
            };
        }

        let locked = AttemptRecord {
            blocked_until: Some(now.saturating_add(window_millis)),
            ..record
        };
        self.write_record(&locked).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_lockout(&self.settings.storage_key);
        }
        debug!(key = %self.key, count = record.count, "attempt limit reached, locking out");

        AttemptDecision::Blocked {
            retry_after_secs: ceil_secs(window_millis),
        }
    }

    /// Count one attempt.
    ///
    /// The limit is not checked here. Window expiry only looks at when the
    /// window opened, so an expired window starts over even while a lockout
    /// written by `can_attempt` is still running.
    pub async fn record_attempt(&self) {
        let now = self.clock.now_millis();

        let next = match self.read_record().await {
            Some(record) if !record.window_expired(now, self.settings.window_millis()) => {
                AttemptRecord {
                    count: record.count.saturating_add(1),
                    ..record
                }
            }
            _ => AttemptRecord::first(now),
        };

        self.write_record(&next).await;
    }

    /// Forget the record. A missing record is fine.
    pub async fn clear_record(&self) {
        if let Err(e) = self.store.delete(&self.key).await {
            warn!(key = %self.key, error = %e, "failed to clear attempt record");
            self.count_storage_error("delete");
        }
    }

    /// Health check for the backing store
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    fn fresh_decision(&self) -> AttemptDecision {
        AttemptDecision::Allowed {
            remaining_attempts: self.settings.max_attempts - 1,
        }
    }

    async fn read_record(&self) -> Option<AttemptRecord> {
        let raw = match self.store.read(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read attempt record");
                self.count_storage_error("read");
                return None;
            }
        };

        match AttemptRecord::decode(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %self.key, error = %e, "discarding unreadable attempt record");
                None
            }
        }
    }

    async fn write_record(&self, record: &AttemptRecord) {
        let result = match record.encode() {
            Ok(raw) => self.store.write(&self.key, &raw).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "failed to save attempt record");
            self.count_storage_error("write");
        }
    }

    fn count_storage_error(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_storage_error(operation);
        }
    }
}
