//! Error types for hacksim.

use std::io;

use serde::{Deserialize, Serialize};

/// Errors produced by the hacksim engine.
///
/// The first six variants are user errors: they are reported back to the
/// player as a failed command and never abort the session. The remaining
/// variants describe faults outside the player's control.
#[derive(Debug, thiserror::Error)]
pub enum HackError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("missing parent directory: {0}")]
    MissingParent(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`HackError`], suitable for transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    NotEmpty,
    MissingParent,
    UnknownCommand,
    Unavailable,
    Config,
}

impl HackError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::MissingParent(_) => ErrorKind::MissingParent,
            Self::UnknownCommand(_) => ErrorKind::UnknownCommand,
            Self::Unavailable(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Unavailable,
            Self::Config(_) | Self::TomlParse(_) => ErrorKind::Config,
        }
    }

    /// Whether the error was caused by the player's input.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::Config)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = HackError::NotFound("/missions/intro".into());
        assert_eq!(
            format!("{e}"),
            "no such file or directory: /missions/intro"
        );
    }

    #[test]
    fn not_empty_display() {
        let e = HackError::NotEmpty("/logs".into());
        assert_eq!(format!("{e}"), "directory not empty: /logs");
    }

    #[test]
    fn unknown_command_display() {
        let e = HackError::UnknownCommand("sudo".into());
        assert_eq!(format!("{e}"), "unknown command: sudo");
    }

    #[test]
    fn user_errors_are_classified() {
        for e in [
            HackError::NotFound("a".into()),
            HackError::AlreadyExists("a".into()),
            HackError::InvalidArgument("a".into()),
            HackError::NotEmpty("a".into()),
            HackError::MissingParent("a".into()),
            HackError::UnknownCommand("a".into()),
        ] {
            assert!(e.is_user_error(), "{e:?} should be a user error");
        }
    }

    #[test]
    fn unavailable_is_not_user_error() {
        let e = HackError::Unavailable("user store down".into());
        assert_eq!(e.kind(), ErrorKind::Unavailable);
        assert!(!e.is_user_error());
    }

    #[test]
    fn io_error_maps_to_unavailable() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: HackError = io_err.into();
        assert_eq!(e.kind(), ErrorKind::Unavailable);
        assert!(format!("{e}").contains("I/O error"));
    }

    #[test]
    fn toml_error_maps_to_config() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: HackError = toml_err.into();
        assert_eq!(e.kind(), ErrorKind::Config);
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let e: HackError = json_err.into();
        assert!(format!("{e}").contains("JSON error"));
    }

    #[test]
    fn error_kind_serializes_as_name() {
        let json = serde_json::to_string(&ErrorKind::NotEmpty).unwrap();
        assert_eq!(json, "\"NotEmpty\"");
    }
}
