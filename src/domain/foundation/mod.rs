//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and error types used across the billing core.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::UserId;
pub use timestamp::Timestamp;
