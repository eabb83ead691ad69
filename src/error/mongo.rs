use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from MongoDB errors.
///
/// This is intended to be serialized to JSON and consumed by other
/// components (e.g. logging, per-test failure messages).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

/// Coarse classification of driver errors, as seen by the audit checks.
///
/// Several checks treat a failure as the expected, secure outcome, so the
/// checks need to tell an authorization refusal apart from a network problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials were rejected during the handshake.
    Authentication,

    /// The server refused the command for lack of privileges.
    Unauthorized,

    /// No suitable server could be selected before the timeout.
    ServerSelection,

    /// The socket failed underneath the driver.
    Network,

    /// Any other server-side command failure.
    Command,

    /// Everything else (argument errors, BSON errors, ...).
    Other,
}

impl ErrorInfo {
    /// Convert error info to pretty-printed JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Short single-line summary, used where JSON would be too noisy.
    pub fn summary(&self) -> String {
        match (&self.name, &self.message) {
            (Some(name), Some(message)) => format!("{name}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(name), None) => name.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Format MongoDB error messages as pretty JSON wrapped in an `error` field.
///
/// Intended to be used by the parent module's `Display` implementation for
/// `AuditError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string_pretty(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "\n{json_output}")
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code)
                .or_else(|| Some(command_error.code_name.clone()).filter(|n| !n.is_empty()));
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::Io(io_error) => {
            info.error_type = Some("mongo.io_error".to_string());
            info.message = Some(io_error.to_string());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Classify a driver error for the audit checks.
///
/// # Arguments
/// * `error` - Error returned by the MongoDB driver
///
/// # Returns
/// * `ErrorClass` - Coarse category of the failure
pub fn classify(error: &mongodb::error::Error) -> ErrorClass {
    use mongodb::error::ErrorKind;

    match error.kind.as_ref() {
        ErrorKind::Authentication { .. } => ErrorClass::Authentication,
        ErrorKind::Command(command_error) => match command_error.code {
            13 | 8000 => ErrorClass::Unauthorized,
            18 | 11 => ErrorClass::Authentication,
            _ => ErrorClass::Command,
        },
        ErrorKind::ServerSelection { .. } => ErrorClass::ServerSelection,
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => ErrorClass::Network,
        _ => ErrorClass::Other,
    }
}

/// Whether the error means the connection itself is unusable.
pub fn is_connection_failure(error: &mongodb::error::Error) -> bool {
    matches!(
        classify(error),
        ErrorClass::ServerSelection | ErrorClass::Network
    )
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        11 => "UserNotFound",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        59 => "CommandNotFound",
        139 => "JSInterpreterFailure",
        2 => "BadValue",
        8000 => "AtlasError",
        _ => return None,
    };

    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_error_names() {
        assert_eq!(get_error_name(13), Some("Unauthorized".to_string()));
        assert_eq!(get_error_name(18), Some("AuthenticationFailed".to_string()));
        assert_eq!(get_error_name(424242), None);
    }

    #[test]
    fn test_summary_variants() {
        let info = ErrorInfo {
            name: Some("Unauthorized".into()),
            message: Some("not authorized on admin".into()),
            ..Default::default()
        };
        assert_eq!(info.summary(), "Unauthorized: not authorized on admin");
        assert_eq!(ErrorInfo::default().summary(), "unknown error");
    }

    #[test]
    fn test_error_info_json_skips_empty_fields() {
        let info = ErrorInfo {
            message: Some("boom".into()),
            ..Default::default()
        };
        let json = info.to_json().unwrap();
        assert!(json.contains("\"message\": \"boom\""));
        assert!(!json.contains("code"));
    }
}
