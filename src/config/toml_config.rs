use crate::analysis::{PulsedMethod, PulsedWindows};
use crate::fit::FitMethod;
use crate::io::{check_extension, DataFormat};
use crate::utils::error::{AnalysisError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_CONCURRENT_READS: usize = 4;
pub const OUTPUT_FORMATS: [&str; 3] = ["tsv", "csv", "json"];
const FIT_ERROR_POLICIES: [&str; 2] = ["continue", "abort"];

/// Analysis run described by a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub extract: ExtractConfig,
    pub pulsed: Option<PulsedConfig>,
    #[serde(default)]
    pub fits: Vec<FitConfig>,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
    pub error_handling: Option<ErrorHandlingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub path: String,
    pub format: DataFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub concurrent_reads: Option<usize>,
}

/// Signal extraction for matrix inputs holding one row per laser pulse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulsedConfig {
    #[serde(default)]
    pub method: PulsedMethod,
    #[serde(default)]
    pub windows: PulsedWindows,
    /// Restricts extraction to these inputs; every matrix input when unset.
    pub inputs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Input name, or `<input>_pulsed` for the extracted pulsed signal.
    pub input: String,
    pub method: String,
    pub estimator: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub x_unit: Option<String>,
    pub y_unit: Option<String>,
}

impl FitConfig {
    pub fn fit_method(&self) -> Result<FitMethod> {
        FitMethod::parse(&self.method, self.estimator.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
}

fn default_output_formats() -> Vec<String> {
    vec!["tsv".to_string(), "json".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// `continue` (default) or `abort`.
    pub on_fit_error: Option<String>,
}

impl AnalysisConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AnalysisError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AnalysisError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_path("load.output_path", &self.load.output_path)?;

        if let Some(concurrent) = self.extract.concurrent_reads {
            validation::validate_range("extract.concurrent_reads", concurrent, 1, 64)?;
        }

        for format in &self.load.output_formats {
            validation::validate_one_of("load.output_formats", format, &OUTPUT_FORMATS)?;
        }
        if let Some(compression) = &self.load.compression {
            if compression.enabled {
                validation::validate_non_empty_string(
                    "load.compression.filename",
                    &compression.filename,
                )?;
                validation::validate_file_extensions(
                    "load.compression.filename",
                    std::slice::from_ref(&compression.filename),
                    &["zip"],
                )?;
            }
        }

        let mut names = HashSet::new();
        for input in &self.inputs {
            validation::validate_non_empty_string("inputs.name", &input.name)?;
            validation::validate_path("inputs.path", &input.path)?;
            if !names.insert(input.name.as_str()) {
                return Err(AnalysisError::InvalidConfigValueError {
                    field: "inputs.name".to_string(),
                    value: input.name.clone(),
                    reason: "Input names must be unique".to_string(),
                });
            }
            if let Some(extension) = input.format.extension() {
                check_extension(&input.path, extension).map_err(|e| {
                    AnalysisError::InvalidConfigValueError {
                        field: "inputs.path".to_string(),
                        value: input.path.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        if let Some(pulsed) = &self.pulsed {
            let w = &pulsed.windows;
            validation::validate_window("pulsed.windows.signal", w.signal_start, w.signal_end)?;
            if pulsed.method != PulsedMethod::Mean {
                validation::validate_window("pulsed.windows.norm", w.norm_start, w.norm_end)?;
            }
            validation::validate_positive_float("pulsed.windows.bin_width", w.bin_width)?;
            for name in pulsed.inputs.iter().flatten() {
                let input = self.input(name).ok_or_else(|| unknown_input("pulsed.inputs", name))?;
                if !input.format.is_matrix() {
                    return Err(AnalysisError::InvalidConfigValueError {
                        field: "pulsed.inputs".to_string(),
                        value: name.clone(),
                        reason: format!("Format '{}' does not hold laser pulses", input.format),
                    });
                }
            }
        }

        for fit in &self.fits {
            fit.fit_method()
                .map_err(|e| AnalysisError::InvalidConfigValueError {
                    field: "fits.method".to_string(),
                    value: fit.method.clone(),
                    reason: e.to_string(),
                })?;
            let source = fit.input.strip_suffix("_pulsed").filter(|_| self.pulsed.is_some());
            let known = self.input(&fit.input).is_some()
                || source.is_some_and(|name| self.pulsed_inputs().iter().any(|i| i.name == name));
            if !known {
                return Err(unknown_input("fits.input", &fit.input));
            }
        }

        if let Some(policy) = self
            .error_handling
            .as_ref()
            .and_then(|e| e.on_fit_error.as_deref())
        {
            validation::validate_one_of("error_handling.on_fit_error", policy, &FIT_ERROR_POLICIES)?;
        }

        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&InputConfig> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Matrix inputs that go through pulsed signal extraction.
    pub fn pulsed_inputs(&self) -> Vec<&InputConfig> {
        let Some(pulsed) = &self.pulsed else {
            return Vec::new();
        };
        self.inputs
            .iter()
            .filter(|input| input.format.is_matrix())
            .filter(|input| {
                pulsed
                    .inputs
                    .as_ref()
                    .map_or(true, |names| names.contains(&input.name))
            })
            .collect()
    }

    pub fn concurrent_reads(&self) -> usize {
        self.extract
            .concurrent_reads
            .unwrap_or(DEFAULT_CONCURRENT_READS)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn abort_on_fit_error(&self) -> bool {
        self.error_handling
            .as_ref()
            .and_then(|e| e.on_fit_error.as_deref())
            == Some("abort")
    }

    pub fn writes_format(&self, format: &str) -> bool {
        self.load.output_formats.iter().any(|f| f == format)
    }

    /// Archive file name when compression is enabled.
    pub fn archive_name(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }
}

fn unknown_input(field: &str, name: &str) -> AnalysisError {
    AnalysisError::InvalidConfigValueError {
        field: field.to_string(),
        value: name.to_string(),
        reason: "No input with this name".to_string(),
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[pipeline]
name = "rabi-analysis"
description = "Rabi oscillation on NV 3"
version = "1.0.0"

[[inputs]]
name = "rabi"
path = "data/rabi_raw"
format = "qudi-matrix-transposed"

[[inputs]]
name = "spectrum"
path = "data/pl.txt"
format = "oceanoptics"

[pulsed]
method = "mean-norm"

[[fits]]
input = "rabi_pulsed"
method = "sineexponentialdecay"

[[fits]]
input = "spectrum"
method = "lorentzian"
estimator = "peak"
x = "wavelength"
y = "intensity"

[load]
output_path = "./results"
output_formats = ["tsv", "json"]
"#;

    #[test]
    fn test_parse_analysis_config() {
        let config = AnalysisConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.pipeline.name, "rabi-analysis");
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.inputs[0].format, DataFormat::QudiMatrixTransposed);
        assert_eq!(config.concurrent_reads(), DEFAULT_CONCURRENT_READS);

        let pulsed = config.pulsed.as_ref().unwrap();
        assert_eq!(pulsed.method, PulsedMethod::MeanNorm);
        assert_eq!(pulsed.windows, PulsedWindows::default());
        assert_eq!(config.pulsed_inputs().len(), 1);

        assert_eq!(config.fits[1].fit_method().unwrap().to_string(), "lorentzian (peak)");
        assert!(!config.abort_on_fit_error());
        assert!(config.archive_name().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("HIRA_TEST_OUTPUT", "/tmp/hira-output");

        let toml_content = r#"
[pipeline]
name = "env"

[load]
output_path = "${HIRA_TEST_OUTPUT}"
"#;

        let config = AnalysisConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.load.output_path, "/tmp/hira-output");
        assert_eq!(config.load.output_formats, vec!["tsv", "json"]);

        std::env::remove_var("HIRA_TEST_OUTPUT");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_format = BASIC.replace(r#"["tsv", "json"]"#, r#"["xlsx"]"#);
        let config = AnalysisConfig::from_toml_str(&bad_format).unwrap();
        assert!(config.validate().is_err());

        let bad_fit = BASIC.replace("\"lorentzian\"", "\"voigt\"");
        let config = AnalysisConfig::from_toml_str(&bad_fit).unwrap();
        assert!(config.validate().is_err());

        let bad_estimator = BASIC.replace("\"peak\"", "\"N14\"");
        let config = AnalysisConfig::from_toml_str(&bad_estimator).unwrap();
        assert!(config.validate().is_err());

        let bad_input = BASIC.replace("input = \"spectrum\"", "input = \"odmr\"");
        let config = AnalysisConfig::from_toml_str(&bad_input).unwrap();
        assert!(config.validate().is_err());

        let bad_extension = BASIC.replace("data/pl.txt", "data/pl.csv");
        let config = AnalysisConfig::from_toml_str(&bad_extension).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_window() {
        let toml_content = r#"
[pipeline]
name = "windows"

[[inputs]]
name = "t1"
path = "data/t1_raw.dat"
format = "qudi-matrix"

[pulsed]
method = "mean"

[pulsed.windows]
signal_start = 3e-7
signal_end = 1e-7

[load]
output_path = "./out"
"#;
        let config = AnalysisConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());

        let fixed = toml_content.replace("signal_end = 1e-7", "signal_end = 5e-7");
        let config = AnalysisConfig::from_toml_str(&fixed).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_policy_and_compression() {
        let toml_content = r#"
[pipeline]
name = "strict"

[load]
output_path = "./out"
output_formats = ["csv"]
compression = { enabled = true, filename = "analysis.zip" }

[error_handling]
on_fit_error = "abort"
"#;
        let config = AnalysisConfig::from_toml_str(toml_content).unwrap();
        assert!(config.abort_on_fit_error());
        assert_eq!(config.archive_name(), Some("analysis.zip"));
        assert!(config.writes_format("csv"));
        assert!(!config.writes_format("tsv"));
        assert!(config.validate().is_ok());

        let unknown = toml_content.replace("\"abort\"", "\"retry\"");
        let config = AnalysisConfig::from_toml_str(&unknown).unwrap();
        assert!(config.validate().is_err());

        let tarball = toml_content.replace("analysis.zip", "analysis.tar");
        let config = AnalysisConfig::from_toml_str(&tarball).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = AnalysisConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "rabi-analysis");
        let paths: Vec<&str> = config.inputs.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["data/rabi_raw", "data/pl.txt"]);
    }
}
