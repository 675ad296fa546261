use crate::utils::error::{AnalysisError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_float(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value must be a finite number greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Checks that `start < end` for a time window given in seconds.
pub fn validate_window(field_name: &str, start: f64, end: f64) -> Result<()> {
    if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("[{}, {}]", start, end),
            reason: "Window must satisfy 0 <= start < end".to_string(),
        });
    }
    Ok(())
}

pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        if let Some(extension) = std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
        {
            if !allowed_set.contains(extension) {
                return Err(AnalysisError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        extension,
                        allowed_extensions.join(", ")
                    ),
                });
            }
        } else {
            return Err(AnalysisError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: file.clone(),
                reason: "File has no extension or invalid filename".to_string(),
            });
        }
    }

    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&value) {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Valid values: {}", allowed.join(", ")),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(AnalysisError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("load.output_path", "./output").is_ok());
        assert!(validate_path("load.output_path", "").is_err());
        assert!(validate_path("load.output_path", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window("pulsed.signal", 100e-9, 300e-9).is_ok());
        assert!(validate_window("pulsed.signal", 300e-9, 100e-9).is_err());
        assert!(validate_window("pulsed.signal", -1.0, 1.0).is_err());
        assert!(validate_window("pulsed.signal", 0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["pulsed.dat".to_string(), "vacuum.txt".to_string()];
        assert!(validate_file_extensions("inputs", &files, &["dat", "txt"]).is_ok());

        let invalid_files = vec!["figure.png".to_string()];
        assert!(validate_file_extensions("inputs", &invalid_files, &["dat", "txt"]).is_err());
    }

    #[test]
    fn test_validate_range_and_one_of() {
        assert!(validate_range("extract.concurrent_reads", 4, 1, 64).is_ok());
        assert!(validate_range("extract.concurrent_reads", 65, 1, 64).is_err());
        assert!(validate_one_of("load.output_formats", "tsv", &["tsv", "csv"]).is_ok());
        assert!(validate_one_of("load.output_formats", "xlsx", &["tsv", "csv"]).is_err());
    }
}
