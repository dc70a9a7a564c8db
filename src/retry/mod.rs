//! Error classification and retry
//!
//! Every failure the pipeline sees is classified as transient, permanent or
//! unknown. Only transient failures are ever retried.

mod classifier;
mod policy;

pub use classifier::{classify, ErrorClass};
pub use policy::{execute_with_retry, Backoff, RetryPolicy};
