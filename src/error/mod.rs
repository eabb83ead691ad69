//! Error handling module for the audit engine.
//!
//! This module provides:
//! - Application-specific error types, one per concern
//! - Structured error information extracted from MongoDB driver errors
//! - A coarse classification of driver errors used by the checks, which
//!   frequently read a refusal as the desired outcome
//!
//! # Example
//!
//! ```rust,no_run
//! use mongoaudit::error::mongo::{classify, ErrorClass};
//!
//! fn refused(err: &mongodb::error::Error) -> bool {
//!     matches!(classify(err), ErrorClass::Unauthorized | ErrorClass::Authentication)
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{AuditError, CatalogError, ConfigError, ConnectionError, Result, UriError};
pub use mongo::{ErrorClass, ErrorInfo};
