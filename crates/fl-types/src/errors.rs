use thiserror::Error;

/// Main error type for the Frostline system
#[derive(Error, Debug)]
pub enum FlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error(
        "Bisection did not converge after {iterations} iterations: bracket [{low}, {high}] is wider than tolerance {tolerance}"
    )]
    ConvergenceFailure {
        iterations: usize,
        low: f64,
        high: f64,
        tolerance: f64,
    },

    #[error("Search exhausted after {attempts} attempts: {message}")]
    SearchExhausted { attempts: usize, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlError {
    /// Short stable label for the error family, used in diagnostics and
    /// worker reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Oracle(OracleError::ResultUnavailable) => "result_unavailable",
            Self::Oracle(_) => "oracle_execution_error",
            Self::ConvergenceFailure { .. } => "convergence_failure",
            Self::SearchExhausted { .. } => "search_exhausted",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Failures of a single simulation attempt
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Solver `{command}` exited with {status}; see {log}")]
    Execution {
        command: String,
        status: String,
        log: String,
    },

    #[error("Solver `{command}` timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Solver finished but expected output {path} is missing")]
    MissingOutput { path: String },

    #[error("Solver output {path} is malformed: {message}")]
    MalformedOutput { path: String, message: String },

    #[error("No successful execution to read an objective from")]
    ResultUnavailable,

    #[error("Case directory IO failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Frostline operations
pub type FlResult<T> = Result<T, FlError>;

/// Result type alias for oracle calls
pub type OracleResult<T> = Result<T, OracleError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::FlError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::FlError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FlError::ConvergenceFailure {
            iterations: 5,
            low: 290.0,
            high: 295.0,
            tolerance: 1.0,
        };

        assert!(error.to_string().contains("did not converge"));
        assert!(error.to_string().contains("290"));
        assert!(error.to_string().contains("295"));
    }

    #[test]
    fn test_error_conversion() {
        let oracle_error = OracleError::MissingOutput {
            path: "case/results.json".to_string(),
        };
        let fl_error: FlError = oracle_error.into();

        match fl_error {
            FlError::Oracle(_) => (),
            _ => panic!("Expected Oracle error"),
        }
        assert_eq!(fl_error.kind(), "oracle_execution_error");
    }

    #[test]
    fn test_result_unavailable_kind() {
        let err: FlError = OracleError::ResultUnavailable.into();
        assert_eq!(err.kind(), "result_unavailable");
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("Missing required field: {}", "room.dims");
        assert!(config_err.is_config());
        assert!(config_err.to_string().contains("room.dims"));

        let internal_err = internal_error!("Something went wrong");
        assert_eq!(internal_err.kind(), "internal_error");
    }
}
