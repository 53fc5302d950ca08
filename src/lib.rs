//! Attempt Guard
//!
//! Keyed attempt limiter with lockout, used to throttle storefront actions
//! such as order submission and contact messages. Each limiter counts
//! attempts in a fixed window kept in an external key-value store and, once
//! the limit is reached, refuses further attempts for one more window.
//!
//! Store and clock are injected, so limiters can run against Redis and the
//! wall clock in production and against memory and a manual clock in tests.

pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod metrics;
pub mod record;
pub mod redis;
pub mod service;
pub mod store;
pub mod utils;

// Re-export main types
pub use error::{RateLimitError, Result};
pub use limiter::{AttemptDecision, LimiterSettings, RateLimiter};
pub use service::RateLimitService;
pub use store::{AttemptStore, MemoryStore};
pub use utils::{format_retry_message, Clock, ManualClock, SystemClock};
