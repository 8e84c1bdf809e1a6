//! Error types for the xanadu shell.

use std::io;

/// Errors produced by the xanadu shell.
#[derive(Debug, thiserror::Error)]
pub enum XanaduError {
    /// No registered provider accepted the command name.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("command error: {0}")]
    Command(String),

    /// A script or macro ran out of lines while a continuation was pending.
    #[error("{0} ended before continuation completed.")]
    Incomplete(&'static str),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, XanaduError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_display() {
        let e = XanaduError::UnknownCommand("frobnicate".into());
        assert_eq!(format!("{e}"), "Unknown command: frobnicate");
    }

    #[test]
    fn command_error_display() {
        let e = XanaduError::Command("bad argument".into());
        assert_eq!(format!("{e}"), "command error: bad argument");
    }

    #[test]
    fn incomplete_display() {
        let e = XanaduError::Incomplete("Macro");
        assert_eq!(format!("{e}"), "Macro ended before continuation completed.");
    }

    #[test]
    fn backend_error_display() {
        let e = XanaduError::Backend("connection reset".into());
        assert_eq!(format!("{e}"), "backend error: connection reset");
    }

    #[test]
    fn config_error_display() {
        let e = XanaduError::Config("missing key".into());
        assert_eq!(format!("{e}"), "config error: missing key");
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: XanaduError = io_err.into();
        assert!(matches!(e, XanaduError::Io(_)));
        assert!(format!("{e}").contains("gone"));
    }

    #[test]
    fn toml_error_converts() {
        let err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let e: XanaduError = err.into();
        assert!(format!("{e}").starts_with("TOML parse error"));
    }
}
