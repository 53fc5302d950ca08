use std::{collections::HashMap, sync::Arc};
use tracing::info;

use crate::{
    config::ServiceConfig,
    error::{RateLimitError, Result},
    limiter::{AttemptDecision, RateLimiter},
    metrics::Metrics,
    store::AttemptStore,
    utils::Clock,
};

/// Named limiters sharing one store, clock and metrics registry.
///
/// Every call may name a subject (a client address, a session id) which gets
/// its own record under the limiter's limits.
pub struct RateLimitService {
    limiters: HashMap<String, RateLimiter>,
    store: Arc<dyn AttemptStore>,
    metrics: Arc<Metrics>,
}

impl RateLimitService {
    /// Create a service with no limiters
    pub fn new(store: Arc<dyn AttemptStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            limiters: HashMap::new(),
            store,
            metrics,
        }
    }

    /// Build every limiter named in `config`
    pub fn from_config(
        config: &ServiceConfig,
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        config.validate()?;

        let mut service = Self::new(store.clone(), metrics);
        for limiter_config in &config.limiters {
            let settings = limiter_config.to_settings()?;
            service.add_limiter(
                &limiter_config.name,
                RateLimiter::new(settings, store.clone(), clock.clone()),
            );
        }

        Ok(service)
    }

    /// Register a limiter under `name`, replacing any previous one
    pub fn add_limiter(&mut self, name: &str, limiter: RateLimiter) {
        info!(
            limiter = name,
            storage_key = limiter.storage_key(),
            max_attempts = limiter.settings().max_attempts(),
            window_secs = limiter.settings().window().as_secs(),
            "registered limiter"
        );
        let limiter = limiter.with_metrics(self.metrics.clone());
        self.limiters.insert(name.to_string(), limiter);
    }

    pub fn limiter(&self, name: &str) -> Option<&RateLimiter> {
        self.limiters.get(name)
    }

    /// Names of all registered limiters
    pub fn limiter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Check whether `subject` may attempt the action guarded by `name`
    pub async fn check(&self, name: &str, subject: Option<&str>) -> Result<AttemptDecision> {
        let limiter = self.resolve(name, subject)?;
        let _timer = self.metrics.start_request_timer();

        let decision = limiter.can_attempt().await;
        let label = limiter.settings().storage_key();
        if decision.is_allowed() {
            self.metrics.record_allowed(label);
        } else {
            self.metrics.record_blocked(label);
        }

        Ok(decision)
    }

    /// Count an attempt by `subject`
    pub async fn record(&self, name: &str, subject: Option<&str>) -> Result<()> {
        let limiter = self.resolve(name, subject)?;
        let _timer = self.metrics.start_request_timer();

        limiter.record_attempt().await;
        self.metrics.record_attempt(limiter.settings().storage_key());
        Ok(())
    }

    /// Forget `subject`'s record
    pub async fn clear(&self, name: &str, subject: Option<&str>) -> Result<()> {
        let limiter = self.resolve(name, subject)?;
        let _timer = self.metrics.start_request_timer();

        limiter.clear_record().await;
        self.metrics.record_clear(limiter.settings().storage_key());
        Ok(())
    }

    /// Health check for the shared store
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    fn resolve(&self, name: &str, subject: Option<&str>) -> Result<RateLimiter> {
        let Some(limiter) = self.limiters.get(name) else {
            self.metrics.record_unknown_limiter();
            return Err(RateLimitError::LimiterNotFound(name.to_string()));
        };

        Ok(match subject {
            Some(subject) => limiter.for_subject(subject),
            None => limiter.clone(),
        })
    }
}
