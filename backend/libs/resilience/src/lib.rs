//! Resilience helpers shared by the engagement service and its clients
//!
//! - **Retry**: bounded exponential backoff with jitter, retrying only
//!   errors classified as transient
//! - **Timeout**: deadlines for lock acquisition and client round-trips
//!
//! # Example: retrying a transient failure
//!
//! ```rust,no_run
//! use resilience::{with_retry, RetryConfig, Transient};
//!
//! #[derive(Debug)]
//! struct Busy;
//! impl std::fmt::Display for Busy {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("busy")
//!     }
//! }
//! impl Transient for Busy {
//!     fn is_transient(&self) -> bool { true }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = with_retry(&RetryConfig::default(), || async {
//!         Err::<(), _>(Busy)
//!     })
//!     .await;
//!     assert!(result.is_err());
//! }
//! ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryConfig, RetryError, Transient};
pub use timeout::{with_deadline, with_timeout, TimeoutError};
