//! CLI-specific error types and exit code mapping

use timebin_core::error::{ConfigError, StageError, TimebinError};
use timebin_edge_detect::EdgeDetectError;
use timebin_pipeline::AnalysisError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration or specification problem found before any row is read.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input that cannot be processed (unsorted or malformed rows).
    #[error("data error: {0}")]
    Data(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from the analysis crates.
    #[error("{0}")]
    Core(#[from] TimebinError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration or specification error     |
    /// | 3    | Input data error (unsorted, malformed)   |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Data(_) => 3,
            Self::Io(_) => 10,
            Self::Core(TimebinError::Config(_)) => 2,
            Self::Core(TimebinError::Stage(
                StageError::TimeWentBackwards { .. } | StageError::Malformed { .. },
            )) => 3,
            Self::Core(TimebinError::Io(_)) => 10,
            Self::Core(TimebinError::Stage(_)) | Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Core(e.into())
    }
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        Self::Core(e.into())
    }
}

impl From<EdgeDetectError> for CliError {
    fn from(e: EdgeDetectError) -> Self {
        Self::Core(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad spec".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = TimebinError::Config(ConfigError::UnknownFunction {
            kind: "extractor".to_owned(),
            name: "nope".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_out_of_order_input() {
        let err: CliError = TimebinError::Stage(StageError::TimeWentBackwards {
            stage: "aggregator".to_owned(),
            previous: 120,
            current: 60,
            index: "i".to_owned(),
            key: "k".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 3, "ordering violation should return exit code 3");
        assert!(err.to_string().contains("aggregator"));
    }

    #[test]
    fn test_exit_code_malformed_input() {
        let err: CliError = TimebinError::Stage(StageError::Malformed {
            stage: "aggregator".to_owned(),
            reason: "expected 5 fields".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_channel_error() {
        let err: CliError = TimebinError::Stage(StageError::ChannelSend("closed".to_owned())).into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);

        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(CliError::Core(TimebinError::Io(io_err)).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("interrupted".to_owned());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "interrupted");
    }

    #[test]
    fn test_from_analysis_error_keeps_config_class() {
        let err: CliError = AnalysisError::UnknownFunction {
            kind: "filter".to_owned(),
            name: "nope".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_from_edge_detect_error() {
        let err: CliError = EdgeDetectError::TimeWentBackwards {
            stage: "edge_detect".to_owned(),
            previous: 120,
            current: 0,
            key: "a".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }
}
