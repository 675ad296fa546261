use hira_analysis::config::toml_config::AnalysisConfig;
use hira_analysis::utils::validation::Validate;
use hira_analysis::{AnalysisEngine, AnalysisPipeline, LocalStorage};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LASERS: usize = 60;

/// Raw pulsed data: the first four bins of every laser pulse carry a Rabi oscillation.
fn write_rabi_raw(dir: &Path) {
    let mut text = String::from("#bin width (s):1e-09\n#number of lasers:60\n#=====\n");
    for i in 0..LASERS {
        let level = 100.0 + 20.0 * (2.0 * PI * 0.05 * i as f64 + 0.3).sin();
        text.push_str(&format!("{l} {l} {l} {l} 0 0 0 0\n", l = level));
    }
    fs::write(dir.join("rabi_raw.dat"), text).unwrap();
}

/// OceanOptics spectrum with a single Lorentzian line.
fn write_spectrum(dir: &Path) {
    let mut text = String::new();
    for i in 0..13 {
        text.push_str(&format!("header line {}\n", i));
    }
    text.push_str(">>>>>Begin Spectral Data<<<<<\n");
    for i in 0..121 {
        let x = 637.0 + i as f64 * 0.025;
        let y = 100.0 + 1000.0 * 0.04 / ((x - 638.5).powi(2) + 0.04);
        text.push_str(&format!("{}\t{}\n", x, y));
    }
    text.push_str(">>>>>End Spectral Data<<<<<\n");
    fs::write(dir.join("pl.txt"), text).unwrap();
}

fn config(output_formats: &str, extra: &str) -> AnalysisConfig {
    let toml_content = format!(
        r#"
[pipeline]
name = "integration"
version = "1.0.0"

[[inputs]]
name = "rabi"
path = "rabi_raw"
format = "qudi-matrix"

[[inputs]]
name = "spectrum"
path = "pl.txt"
format = "oceanoptics"

[extract]
concurrent_reads = 1

[pulsed]
method = "mean"

[pulsed.windows]
signal_start = 0.0
signal_end = 4e-9

[[fits]]
input = "rabi_pulsed"
method = "sine"

[[fits]]
input = "spectrum"
method = "lorentzian"
estimator = "peak"
x_unit = "nm"

{}

[load]
output_path = "results"
output_formats = {}
"#,
        extra, output_formats
    );
    let config = AnalysisConfig::from_toml_str(&toml_content).unwrap();
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn test_end_to_end_analysis_on_local_files() {
    let temp_dir = TempDir::new().unwrap();
    write_rabi_raw(temp_dir.path());
    write_spectrum(temp_dir.path());

    let storage = LocalStorage::new(temp_dir.path());
    let pipeline = AnalysisPipeline::new(storage, config(r#"["tsv", "json"]"#, ""));
    let engine = AnalysisEngine::new_with_monitoring(pipeline, false);

    let location = engine.run().await.unwrap();
    let results = temp_dir.path().join("results");
    assert_eq!(location, results.display().to_string());

    let pulsed = fs::read_to_string(results.join("rabi_pulsed.tsv")).unwrap();
    let lines: Vec<&str> = pulsed.lines().collect();
    assert_eq!(lines[0], "laser\tsignal\terror");
    assert_eq!(lines.len(), LASERS + 1);

    let curve = fs::read_to_string(results.join("rabi_pulsed_sine_fit.tsv")).unwrap();
    assert_eq!(curve.lines().count(), LASERS * 10 + 1);
    assert!(results.join("spectrum_lorentzian_fit.tsv").exists());
    assert!(!results.join("rabi_pulsed.csv").exists());

    let fits: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(results.join("fits.json")).unwrap()).unwrap();
    let fits = fits.as_array().unwrap();
    assert_eq!(fits.len(), 2);

    let rabi = &fits[0];
    assert_eq!(rabi["method"], "sine");
    assert_eq!(rabi["success"], true);
    let frequency = rabi["parameters"]["frequency"]["value"].as_f64().unwrap();
    assert!((frequency - 0.05).abs() < 1e-4, "frequency {}", frequency);

    let line = &fits[1];
    assert_eq!(line["estimator"], "peak");
    assert_eq!(line["success"], true);
    let center = line["results"]["Center"]["value"].as_f64().unwrap();
    assert!((center - 638.5).abs() < 1e-3, "center {}", center);
    assert_eq!(line["results"]["Center"]["unit"], "nm");
}

#[tokio::test]
async fn test_compressed_output_and_recorded_fit_failure() {
    let temp_dir = TempDir::new().unwrap();
    write_rabi_raw(temp_dir.path());
    write_spectrum(temp_dir.path());

    let extra = r#"
[[fits]]
input = "spectrum"
method = "gaussian"
y = "no such column"
"#;
    let mut config = config(r#"["csv", "json"]"#, extra);
    config.load.compression = Some(hira_analysis::config::toml_config::CompressionConfig {
        enabled: true,
        filename: "analysis.zip".to_string(),
    });

    let storage = LocalStorage::new(temp_dir.path());
    let engine = AnalysisEngine::new(AnalysisPipeline::new(storage, config));
    let location = engine.run().await.unwrap();
    assert!(location.ends_with("analysis.zip"));

    let zip_data = fs::read(temp_dir.path().join("results/analysis.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
    let mut file_names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    file_names.sort();
    assert_eq!(
        file_names,
        vec![
            "fits.json",
            "rabi_pulsed.csv",
            "rabi_pulsed_sine_fit.csv",
            "spectrum_lorentzian_fit.csv",
        ]
    );

    let fits: serde_json::Value = {
        let mut file = archive.by_name("fits.json").unwrap();
        let mut content = String::new();
        std::io::Read::read_to_string(&mut file, &mut content).unwrap();
        serde_json::from_str(&content).unwrap()
    };
    let failed = &fits.as_array().unwrap()[2];
    assert_eq!(failed["method"], "gaussian");
    assert_eq!(failed["success"], false);
    assert!(failed["message"].as_str().unwrap().contains("no such column"));
}

#[tokio::test]
async fn test_missing_input_fails_the_run() {
    let temp_dir = TempDir::new().unwrap();
    write_spectrum(temp_dir.path());

    let storage = LocalStorage::new(temp_dir.path());
    let engine = AnalysisEngine::new(AnalysisPipeline::new(storage, config(r#"["tsv"]"#, "")));
    let err = engine.run().await.unwrap_err();
    assert_eq!(err.severity(), hira_analysis::utils::error::ErrorSeverity::Critical);
    assert!(!temp_dir.path().join("results").exists());
}
