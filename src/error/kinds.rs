use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`AuditError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Top-level error type for audit operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum AuditError {
    /// Connection string errors.
    Uri(UriError),

    /// Connection-related errors.
    Connection(ConnectionError),

    /// Test catalog errors.
    Catalog(CatalogError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection string errors, split by validation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The string does not follow the connection string grammar.
    Invalid(String),

    /// The string is well formed but its first host does not resolve.
    DomainNotFound(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to build a client for the target.
    ConnectionFailed(String),

    /// Not currently connected to MongoDB.
    NotConnected,

    /// The credentials are missing or were rejected.
    NotAuthenticated,

    /// The server could not be reached at all.
    ServerNotFound(String),

    /// Command execution failed.
    CommandFailed(String),

    /// The server answered with a document of an unexpected shape.
    UnexpectedResponse(String),
}

/// Test catalog errors.
#[derive(Debug)]
pub enum CatalogError {
    /// The catalog document could not be parsed.
    InvalidFormat(String),

    /// Two tests share the same identifier.
    DuplicateId(String),

    /// A test is missing the messages it needs.
    MissingMessages(String),

    /// A version literal could not be parsed.
    InvalidVersion(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Uri(e) => write!(f, "{e}"),
            AuditError::Connection(e) => write!(f, "Connection error: {e}"),
            AuditError::Catalog(e) => write!(f, "Catalog error: {e}"),
            AuditError::Config(e) => write!(f, "Configuration error: {e}"),
            AuditError::Io(e) => write!(f, "I/O error: {e}"),
            AuditError::MongoDb(e) => format_mongodb_error(f, e),
            AuditError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::Invalid(msg) => write!(f, "Invalid URI: {msg}"),
            UriError::DomainNotFound(host) => write!(f, "Invalid domain: {host} not found"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
            ConnectionError::NotAuthenticated => write!(f, "Not authenticated to MongoDB"),
            ConnectionError::ServerNotFound(target) => {
                write!(f, "Couldn't find a MongoDB server at {target}")
            }
            ConnectionError::CommandFailed(msg) => write!(f, "Command failed: {msg}"),
            ConnectionError::UnexpectedResponse(msg) => {
                write!(f, "Unexpected server response: {msg}")
            }
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::InvalidFormat(msg) => write!(f, "Invalid catalog format: {msg}"),
            CatalogError::DuplicateId(id) => write!(f, "Duplicate test id: {id}"),
            CatalogError::MissingMessages(id) => {
                write!(f, "Test '{id}' needs at least a failure and a success message")
            }
            CatalogError::InvalidVersion(v) => write!(f, "Invalid version literal: {v}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for AuditError {}
impl std::error::Error for UriError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for CatalogError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to AuditError ========================= */

impl From<io::Error> for AuditError {
    fn from(err: io::Error) -> Self {
        AuditError::Io(err)
    }
}

impl From<mongodb::error::Error> for AuditError {
    fn from(err: mongodb::error::Error) -> Self {
        AuditError::MongoDb(err)
    }
}

impl From<UriError> for AuditError {
    fn from(err: UriError) -> Self {
        AuditError::Uri(err)
    }
}

impl From<ConnectionError> for AuditError {
    fn from(err: ConnectionError) -> Self {
        AuditError::Connection(err)
    }
}

impl From<CatalogError> for AuditError {
    fn from(err: CatalogError) -> Self {
        AuditError::Catalog(err)
    }
}

impl From<ConfigError> for AuditError {
    fn from(err: ConfigError) -> Self {
        AuditError::Config(err)
    }
}

impl From<String> for AuditError {
    fn from(msg: String) -> Self {
        AuditError::Generic(msg)
    }
}

impl From<&str> for AuditError {
    fn from(msg: &str) -> Self {
        AuditError::Generic(msg.to_owned())
    }
}

impl AuditError {
    /// Whether this error should stop the program before any test runs
    ///
    /// # Returns
    /// * `bool` - True for input errors (bad URI, unknown domain)
    pub fn is_input_error(&self) -> bool {
        matches!(self, AuditError::Uri(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_error_display_distinguishes_stages() {
        let invalid = AuditError::from(UriError::Invalid("missing host".into()));
        let missing = AuditError::from(UriError::DomainNotFound("db.invalid".into()));

        assert_eq!(invalid.to_string(), "Invalid URI: missing host");
        assert_eq!(missing.to_string(), "Invalid domain: db.invalid not found");
        assert!(invalid.is_input_error());
        assert!(missing.is_input_error());
    }

    #[test]
    fn test_generic_conversion() {
        let err: AuditError = "boom".into();
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_catalog_error_display() {
        let err = AuditError::from(CatalogError::DuplicateId("tls_valid".into()));
        assert_eq!(err.to_string(), "Catalog error: Duplicate test id: tls_valid");
    }
}
