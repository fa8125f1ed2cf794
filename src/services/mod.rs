//! Business-rule services (L5): the state machine and validation
//! lifecycle, built over the repository layer in `crate::database`.

#![cfg(feature = "database")]

pub mod chunking;
pub mod job_service;
pub mod validation_service;

pub use job_service::{CancelOutcome, CompletionResult, DispatchRateLimiter, JobService, StartOutcome};
pub use validation_service::{ValidationLevel, ValidationOutcome, ValidationResult, ValidationService};
