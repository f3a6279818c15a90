//! Executor metrics common types, IDs, and errors.
//!
//! This crate provides foundational types shared across em-core modules:
//! - Stream identity types (application, executor, host tag)
//! - Time units used for rate and duration conversion
//! - Common error types

pub mod error;
pub mod id;
pub mod units;

pub use error::{Error, Result};
pub use id::{ApplicationId, ExecutorId, HostTag};
pub use units::TimeUnit;
