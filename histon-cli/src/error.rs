//! CLI-specific error types and exit code mapping

use histon_core::error::HistonError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Database operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Export HTTP request failed.
    #[error("export request failed: {0}")]
    Http(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from histon-core.
    #[error("{0}")]
    Core(#[from] HistonError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                   |
    /// |------|---------------------------|
    /// | 0    | Success                   |
    /// | 1    | Runtime / command failure |
    /// | 2    | Bad CLI or configuration  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Command(_)
            | Self::Store(_)
            | Self::Http(_)
            | Self::JsonSerialize(_)
            | Self::Io(_)
            | Self::Core(_) => 1,
        }
    }
}

impl From<histon_store::StoreError> for CliError {
    fn from(e: histon_store::StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_2() {
        assert_eq!(CliError::Config("bad".to_owned()).exit_code(), 2);
    }

    #[test]
    fn runtime_errors_exit_1() {
        assert_eq!(CliError::Command("x".to_owned()).exit_code(), 1);
        assert_eq!(CliError::Store("x".to_owned()).exit_code(), 1);
        assert_eq!(CliError::Http("x".to_owned()).exit_code(), 1);
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CliError::Io(io_err).exit_code(), 1);
    }

    #[test]
    fn display_includes_context() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let message = err.to_string();
        assert!(message.contains("configuration error"));
        assert!(message.contains("invalid TOML syntax"));
    }

    #[test]
    fn store_error_converts() {
        let store_err = histon_store::StoreError::Query("boom".to_owned());
        let cli_err: CliError = store_err.into();
        assert!(matches!(cli_err, CliError::Store(_)));
    }
}
