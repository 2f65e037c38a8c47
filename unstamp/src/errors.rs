/// Error types for unstamp.
///
/// Every fallible operation in the crate returns [`UnstampResult`]. The
/// variants separate the failures a caller is likely to report differently
/// (a missing file, a permission problem, undecodable input, a broken config)
/// from generic I/O failures such as a full disk or a failed rename.
///
/// Cancellation is deliberately absent from this enum: a cancelled run is a
/// normal outcome and is reported through
/// [`ProcessingOutcome`](crate::results::ProcessingOutcome).
///
/// ```rust,ignore
/// match processor.process(path, &cancel, &sink) {
///     Ok(outcome) => // completed or cancelled,
///     Err(UnstampError::FileNotFound(path)) => // nothing to strip,
///     Err(e) => // anything else is a failed run
/// }
/// ```
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for unstamp operations
pub type UnstampResult<T> = Result<T, UnstampError>;

/// Errors that can occur while stripping a file
#[derive(Error, Debug)]
pub enum UnstampError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Invalid UTF-8 in file {path} at line {line}: {source}")]
    EncodingError {
        path: PathBuf,
        line: u64,
        source: std::string::FromUtf8Error,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl UnstampError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn encoding_error(
        path: impl Into<PathBuf>,
        line: u64,
        source: std::string::FromUtf8Error,
    ) -> Self {
        Self::EncodingError {
            path: path.into(),
            line,
            source,
        }
    }

    /// Maps an error from opening `path` onto the dedicated variants.
    pub fn from_open(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}

impl From<config::ConfigError> for UnstampError {
    fn from(err: config::ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let path = Path::new("app.log");
        let err = UnstampError::file_not_found(path);
        assert!(matches!(err, UnstampError::FileNotFound(_)));

        let err = UnstampError::permission_denied(path);
        assert!(matches!(err, UnstampError::PermissionDenied(_)));

        let err = UnstampError::config_error("bad value");
        assert!(matches!(err, UnstampError::ConfigError(_)));

        let source = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let err = UnstampError::encoding_error(path, 7, source);
        assert!(matches!(err, UnstampError::EncodingError { line: 7, .. }));
    }

    #[test]
    fn test_from_open_maps_kinds() {
        let path = Path::new("missing.log");

        let err = UnstampError::from_open(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, UnstampError::FileNotFound(p) if p == path));

        let err = UnstampError::from_open(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, UnstampError::PermissionDenied(_)));

        let err = UnstampError::from_open(path, io::Error::from(io::ErrorKind::WriteZero));
        assert!(matches!(err, UnstampError::IoError(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = UnstampError::file_not_found("app.log");
        assert_eq!(err.to_string(), "File not found: app.log");

        let err = UnstampError::config_error("Missing required field");
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required field"
        );

        let source = String::from_utf8(vec![0xc3, 0x28]).unwrap_err();
        let err = UnstampError::encoding_error("app.log", 3, source);
        assert!(err
            .to_string()
            .starts_with("Invalid UTF-8 in file app.log at line 3:"));
    }
}
