//! Utility modules for menugen-ai

pub mod backoff;
pub mod db_retry;
pub mod pool_monitor;
pub mod worker_pool;

pub use backoff::{retry_transient, RetryPolicy, Retryable};
pub use db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
pub use worker_pool::BoundedPool;
