//! MongoDB exposure audit library
//!
//! This library runs ordered batteries of security checks against a single
//! MongoDB node and reports one result per check. It can be embedded in other
//! tools; the `mongoaudit` binary is a thin front end over it.
//!
//! # Modules
//!
//! - `uri`: Connection string validation (syntax and DNS stages)
//! - `connection`: Session owning the driver clients, retries, TLS probing
//! - `catalog`: Test definitions, suites, and server version ranges
//! - `checks`: One check per catalog entry, dispatched over `CheckKind`
//! - `roles`: Recursive role expansion and the least-privilege verdict
//! - `runner`: Sequential, short-circuiting test runner
//! - `report`: Result aggregation and serialization
//! - `formatter`: Table and JSON output
//! - `cli`: Command-line interface and progress display
//! - `config`: Configuration management
//! - `error`: Error types and driver error classification
//!
//! # Example
//!
//! ```no_run
//! use mongoaudit::{catalog::{Catalog, Suite}, config::Config, runner::run_audit, uri::validate_uri};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let credential = validate_uri("db.example.com:27017").await?;
//!     let tests = Catalog::builtin()?.suite(Suite::Basic);
//!
//!     for result in run_audit(&credential, &tests, &config).await? {
//!         println!("{}: {}", result.title, result.result);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod checks;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod formatter;
pub mod report;
pub mod roles;
pub mod runner;
pub mod uri;

// Re-export commonly used types
pub use catalog::{Catalog, Suite, TestDefinition};
pub use config::Config;
pub use connection::Session;
pub use error::{AuditError, Result};
pub use formatter::Formatter;
pub use report::{AuditReport, Summary};
pub use runner::{ResultCode, TestResult, TestRunner, run_audit};
pub use uri::{Credential, validate_uri};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
