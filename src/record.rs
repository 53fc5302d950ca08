//! Persisted shape of a limiter's attempt record.

use serde::{Deserialize, Serialize};

/// Attempts counted in the current window, plus an optional lockout.
///
/// Stored as `{"count": n, "firstAttempt": ms, "blockedUntil": ms}` with
/// `blockedUntil` omitted when there is no lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub count: u32,
    pub first_attempt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<i64>,
}

impl AttemptRecord {
    /// A fresh window opened by one attempt at `now`
    pub fn first(now: i64) -> Self {
        Self {
            count: 1,
            first_attempt: now,
            blocked_until: None,
        }
    }

    /// Whether the counting window has run out at `now`
    pub fn window_expired(&self, now: i64, window_millis: i64) -> bool {
        now.saturating_sub(self.first_attempt) > window_millis
    }

    pub fn encode(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
