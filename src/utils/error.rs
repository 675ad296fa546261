use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid extension '{found}' in '{filename}', extension should be '{expected}'")]
    InvalidExtension {
        filename: String,
        found: String,
        expected: String,
    },

    #[error("Parse error in {path} at line {line}: {message}")]
    ParseError {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Missing parameter '{name}' in {path}")]
    MissingParameter { path: String, name: String },

    #[error("Column '{column}' not found or not numeric")]
    ColumnError { column: String },

    #[error("Fit '{method}' failed: {message}")]
    FitError { method: String, message: String },

    #[error("Unknown fit function '{name}'")]
    UnknownFitFunction { name: String },

    #[error("Estimator '{estimator}' is not available for fit '{method}'")]
    UnsupportedEstimator { method: String, estimator: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Analysis,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalysisError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalysisError::ConfigError { .. }
            | AnalysisError::ConfigValidationError { .. }
            | AnalysisError::InvalidConfigValueError { .. }
            | AnalysisError::ValidationError { .. } => ErrorCategory::Configuration,
            AnalysisError::CsvError(_)
            | AnalysisError::InvalidExtension { .. }
            | AnalysisError::ParseError { .. }
            | AnalysisError::MissingParameter { .. }
            | AnalysisError::ColumnError { .. } => ErrorCategory::Input,
            AnalysisError::FitError { .. }
            | AnalysisError::UnknownFitFunction { .. }
            | AnalysisError::UnsupportedEstimator { .. }
            | AnalysisError::ProcessingError { .. } => ErrorCategory::Analysis,
            AnalysisError::ZipError(_) | AnalysisError::SerializationError(_) => {
                ErrorCategory::Output
            }
            AnalysisError::IoError(_) | AnalysisError::TaskError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Analysis => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input | ErrorCategory::Output => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            AnalysisError::InvalidExtension { expected, .. } => {
                format!("Rename the file or pass a path ending in '{}'", expected)
            }
            AnalysisError::ParseError { path, .. } => {
                format!("Check that '{}' matches the configured data format", path)
            }
            AnalysisError::MissingParameter { name, .. } => {
                format!("The file header must define '{}'", name)
            }
            AnalysisError::ColumnError { column } => {
                format!("Check the column name '{}' against the file header", column)
            }
            AnalysisError::UnknownFitFunction { .. } => {
                "Run with --list-fits to see the available fit functions".to_string()
            }
            AnalysisError::UnsupportedEstimator { .. } => {
                "Use the default estimator of the fit function or pick a supported one"
                    .to_string()
            }
            AnalysisError::FitError { .. } => {
                "Provide more data points or check that the model suits the data".to_string()
            }
            AnalysisError::ConfigError { .. }
            | AnalysisError::ConfigValidationError { .. }
            | AnalysisError::InvalidConfigValueError { .. }
            | AnalysisError::ValidationError { .. } => {
                "Review the configuration file against the documented options".to_string()
            }
            AnalysisError::IoError(_) => {
                "Check that the path exists and is readable/writable".to_string()
            }
            AnalysisError::ZipError(_) | AnalysisError::SerializationError(_) => {
                "Check available disk space and output path permissions".to_string()
            }
            AnalysisError::CsvError(_) => {
                "Check the delimiter and row lengths of the input file".to_string()
            }
            AnalysisError::TaskError(_) | AnalysisError::ProcessingError { .. } => {
                "Re-run with --verbose and inspect the log output".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Could not read input data: {}", self),
            ErrorCategory::Analysis => format!("Analysis failed: {}", self),
            ErrorCategory::Output => format!("Could not write results: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_error_message() {
        let err = AnalysisError::InvalidExtension {
            filename: "data.txt".to_string(),
            found: "txt".to_string(),
            expected: ".dat".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid extension 'txt' in 'data.txt', extension should be '.dat'"
        );
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_severity_by_category() {
        let fit = AnalysisError::FitError {
            method: "sine".to_string(),
            message: "singular matrix".to_string(),
        };
        assert_eq!(fit.severity(), ErrorSeverity::Medium);

        let io = AnalysisError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        assert_eq!(io.severity(), ErrorSeverity::Critical);
        assert!(io.user_friendly_message().starts_with("System error"));
    }
}
