//! Result and error model shared by every command.
//!
//! Every command, whether invoked from the interactive shell or headlessly,
//! produces exactly one [`CommandResult`]. Failures carry a [`CommandError`]
//! whose [`ErrorKind`] comes from a closed taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of failure kinds, grouped by concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Path
    InvalidPath,
    PathNotFound,
    NotADirectory,
    NotAFile,
    AlreadyExists,
    ParentNotFound,
    DirectoryNotEmpty,
    EscapeAttempt,

    // Entity
    EntityNotFound,
    DuplicateEntity,
    InvalidEntity,

    // Argument
    MissingArgument,
    InvalidArgument,
    UnknownSubcommand,

    // Operation
    OperationFailed,
    NotSupported,
    PermissionDenied,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPath => "InvalidPath",
            ErrorKind::PathNotFound => "PathNotFound",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::NotAFile => "NotAFile",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::ParentNotFound => "ParentNotFound",
            ErrorKind::DirectoryNotEmpty => "DirectoryNotEmpty",
            ErrorKind::EscapeAttempt => "EscapeAttempt",
            ErrorKind::EntityNotFound => "EntityNotFound",
            ErrorKind::DuplicateEntity => "DuplicateEntity",
            ErrorKind::InvalidEntity => "InvalidEntity",
            ErrorKind::MissingArgument => "MissingArgument",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::UnknownSubcommand => "UnknownSubcommand",
            ErrorKind::OperationFailed => "OperationFailed",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::PermissionDenied => "PermissionDenied",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure: kind, one-line message and optional structured details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub code: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CommandError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPath, message)
    }

    pub fn missing_argument(usage: &str) -> Self {
        Self::new(ErrorKind::MissingArgument, format!("Usage: {usage}"))
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationFailed, message)
    }
}

/// The single externally observable outcome of a command.
///
/// `success == false` always comes with an `error`; [`CommandResult::is_well_formed`]
/// checks that before a result leaves the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult<T = Value> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<CommandError>,
}

impl<T> CommandResult<T> {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
            error: None,
        }
    }

    pub fn with_data(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn failure(error: CommandError) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_well_formed(&self) -> bool {
        self.success || self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.code)
    }
}

impl CommandResult<Value> {
    /// Build a successful result from any serializable payload.
    pub fn from_data<D: Serialize>(data: &D) -> anyhow::Result<Self> {
        Ok(Self::with_data(serde_json::to_value(data)?))
    }

    /// Attach a serializable payload to an existing (possibly failed) result.
    pub fn attach<D: Serialize>(mut self, data: &D) -> anyhow::Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

impl<T> From<CommandError> for CommandResult<T> {
    fn from(error: CommandError) -> Self {
        Self::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_json_shape() {
        let result: CommandResult = CommandResult::failure(CommandError::new(
            ErrorKind::InvalidArgument,
            "Unknown command: frob",
        ));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "data": null,
                "error": {"code": "InvalidArgument", "message": "Unknown command: frob"}
            })
        );
    }

    #[test]
    fn test_well_formed() {
        let ok: CommandResult = CommandResult::ok();
        assert!(ok.is_well_formed());

        let bad: CommandResult = CommandResult {
            success: false,
            data: None,
            message: None,
            error: None,
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn test_error_display_is_message() {
        let err = CommandError::new(ErrorKind::PathNotFound, "No such resource: /a");
        assert_eq!(err.to_string(), "No such resource: /a");
        assert_eq!(err.code.to_string(), "PathNotFound");
    }
}
