//! Error types for hackshell.

use std::io;

/// Errors produced by the virtual filesystem, the interpreter and its
/// commands.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A path, user or machine that does not exist.
    #[error("{0}: not found")]
    NotFound(String),

    #[error("{0} is a directory, not a file")]
    IsDirectory(String),

    #[error("{0} is not a directory")]
    NotDirectory(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Permission gate denial, or an attempt to read a command marker.
    #[error("permission denied: {0}")]
    Unauthorized(String),

    /// The tree references a payload that is absent from the content store.
    #[error("physical file missing for {0}")]
    PhysicalFileMissing(String),

    /// Malformed quoting or redirection in an input line.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("\"{0}\" is not recognized as an internal or external command")]
    UnknownCommand(String),

    /// Bad usage or any other handler-level failure.
    #[error("{0}")]
    Command(String),

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
pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = ShellError::NotFound("/d/f.txt".into());
        assert_eq!(format!("{e}"), "/d/f.txt: not found");
    }

    #[test]
    fn is_directory_display() {
        let e = ShellError::IsDirectory("/home".into());
        assert_eq!(format!("{e}"), "/home is a directory, not a file");
    }

    #[test]
    fn unauthorized_display() {
        let e = ShellError::Unauthorized("/root".into());
        assert_eq!(format!("{e}"), "permission denied: /root");
    }

    #[test]
    fn unknown_command_display() {
        let e = ShellError::UnknownCommand("frobnicate".into());
        assert_eq!(
            format!("{e}"),
            "\"frobnicate\" is not recognized as an internal or external command"
        );
    }

    #[test]
    fn command_error_is_bare() {
        let e = ShellError::Command("usage: mv <src> <dest>".into());
        assert_eq!(format!("{e}"), "usage: mv <src> <dest>");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: ShellError = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn toml_error_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: ShellError = toml_err.into();
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let e: ShellError = json_err.into();
        assert!(format!("{e}").contains("JSON error"));
    }

    #[test]
    fn result_alias_err() {
        let r: Result<i32> = Err(ShellError::NotEmpty("/tmp".into()));
        assert!(r.is_err());
    }
}
