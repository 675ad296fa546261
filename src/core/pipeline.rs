use crate::analysis::{self, PulsedSignal};
use crate::config::toml_config::{AnalysisConfig, FitConfig};
use crate::domain::model::{AnalysisOutput, Column, DataContent, Dataset, FitSummary, Grid2D, Table};
use crate::domain::ports::{Pipeline, Storage};
use crate::fit::{AnalysisLogic, FitMethod, Units};
use crate::io::{decode_dataset, resolve_path, table_to_delimited, table_to_tsv};
use crate::utils::error::{AnalysisError, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use zip::write::{FileOptions, ZipWriter};

pub const FITS_FILENAME: &str = "fits.json";

/// Reads the configured inputs, extracts pulsed signals, runs the configured fits and
/// writes tables and fit summaries through `storage`.
pub struct AnalysisPipeline<S: Storage> {
    storage: Arc<S>,
    config: AnalysisConfig,
}

impl<S: Storage + 'static> AnalysisPipeline<S> {
    pub fn new(storage: S, config: AnalysisConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Output files as (file name, content), in write order.
    fn render(&self, result: &AnalysisOutput) -> Result<Vec<(String, Vec<u8>)>> {
        let mut files = Vec::new();
        for (name, table) in &result.tables {
            if self.config.writes_format("tsv") {
                files.push((format!("{}.tsv", name), table_to_tsv(table)?));
            }
            if self.config.writes_format("csv") {
                files.push((format!("{}.csv", name), table_to_delimited(table, b',')?));
            }
        }
        if self.config.writes_format("json") {
            files.push((
                FITS_FILENAME.to_string(),
                serde_json::to_vec_pretty(&result.fits)?,
            ));
        }
        Ok(files)
    }

    fn output_file(&self, name: &str) -> String {
        Path::new(&self.config.load.output_path)
            .join(name)
            .to_string_lossy()
            .into_owned()
    }
}

#[async_trait::async_trait]
impl<S: Storage + 'static> Pipeline for AnalysisPipeline<S> {
    async fn extract(&self) -> Result<Vec<Dataset>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_reads()));
        let mut handles = Vec::with_capacity(self.config.inputs.len());

        for input in &self.config.inputs {
            let storage = Arc::clone(&self.storage);
            let semaphore = Arc::clone(&semaphore);
            let input = input.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    AnalysisError::ProcessingError {
                        message: format!("read limiter closed: {}", e),
                    }
                })?;
                let path = resolve_path(&input.path, input.format)?
                    .to_string_lossy()
                    .into_owned();
                let source = storage.location(&path);
                tracing::debug!("Reading '{}' from {}", input.name, source);

                let bytes = storage.read_file(&path).await?;
                tokio::task::spawn_blocking(move || {
                    decode_dataset(&source, &bytes, input.format, &input.name)
                })
                .await?
            }));
        }

        let mut datasets = Vec::with_capacity(handles.len());
        for handle in handles {
            let dataset = handle.await??;
            tracing::info!(
                "Read '{}' ({}, {} rows)",
                dataset.name,
                dataset.content.kind(),
                dataset.content.rows()
            );
            datasets.push(dataset);
        }
        Ok(datasets)
    }

    async fn transform(&self, data: Vec<Dataset>) -> Result<AnalysisOutput> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || run_analysis(&config, &data)).await?
    }

    async fn load(&self, result: AnalysisOutput) -> Result<String> {
        let files = self.render(&result)?;
        tracing::debug!("Writing {} output files", files.len());

        if let Some(archive) = self.config.archive_name() {
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, content) in &files {
                    zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
                    zip.write_all(content)?;
                }
                let cursor = zip.finish()?;
                cursor.into_inner()
            };

            let path = self.output_file(archive);
            tracing::debug!("Writing ZIP file ({} bytes) to {}", zip_data.len(), path);
            self.storage.write_file(&path, &zip_data).await?;
            return Ok(self.storage.location(&path));
        }

        for (name, content) in &files {
            let path = self.output_file(name);
            self.storage.write_file(&path, content).await?;
            tracing::debug!("Wrote {}", path);
        }
        Ok(self.storage.location(&self.config.load.output_path))
    }
}

/// Pulsed extraction followed by the configured fits.
pub fn run_analysis(config: &AnalysisConfig, datasets: &[Dataset]) -> Result<AnalysisOutput> {
    let mut output = AnalysisOutput::default();

    if let Some(pulsed) = &config.pulsed {
        for input in config.pulsed_inputs() {
            let dataset = find_dataset(datasets, &input.name)?;
            let DataContent::Matrix(laser_data) = &dataset.content else {
                return Err(AnalysisError::ProcessingError {
                    message: format!(
                        "input '{}' holds a {}, pulsed extraction needs a matrix",
                        input.name,
                        dataset.content.kind()
                    ),
                });
            };
            let signal = analysis::analyse(pulsed.method, laser_data, &pulsed.windows);
            tracing::info!(
                "Extracted {} laser pulses from '{}' ({})",
                signal.len(),
                input.name,
                pulsed.method
            );
            output
                .tables
                .push((format!("{}_pulsed", input.name), pulsed_table(&signal)?));
        }
    }

    for fit in &config.fits {
        match run_fit(fit, datasets, &output.tables) {
            Ok((name, table, summary)) => {
                tracing::info!(
                    "Fit {} on '{}': {} (reduced chi² {:.4e})",
                    summary.method,
                    fit.input,
                    summary.message,
                    summary.redchi.unwrap_or(f64::NAN)
                );
                output.tables.push((name, table));
                output.fits.push(summary);
            }
            Err(e) if config.abort_on_fit_error() => return Err(e),
            Err(e) => {
                tracing::warn!("Fit {} on '{}' failed: {}", fit.method, fit.input, e);
                let (method, estimator) = match fit.fit_method() {
                    Ok(m) => (m.model.name().to_string(), m.estimator.name().to_string()),
                    Err(_) => (fit.method.clone(), fit.estimator.clone().unwrap_or_default()),
                };
                output
                    .fits
                    .push(FitSummary::failed(&fit.input, &method, &estimator, e.to_string()));
            }
        }
    }

    Ok(output)
}

fn find_dataset<'a>(datasets: &'a [Dataset], name: &str) -> Result<&'a Dataset> {
    datasets
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| AnalysisError::ProcessingError {
            message: format!("input '{}' was not extracted", name),
        })
}

fn pulsed_table(signal: &PulsedSignal) -> Result<Table> {
    let mut table = Table::new();
    table.push_column(
        "laser",
        Column::Float((0..signal.len()).map(|i| i as f64).collect()),
    )?;
    table.push_column("signal", Column::Float(signal.signal.clone()))?;
    table.push_column("error", Column::Float(signal.error.clone()))?;
    Ok(table)
}

enum FitData<'a> {
    Table(&'a Table),
    Grid(&'a Grid2D),
}

/// Produced tables shadow inputs of the same name.
fn fit_data<'a>(
    name: &str,
    datasets: &'a [Dataset],
    tables: &'a [(String, Table)],
) -> Result<FitData<'a>> {
    if let Some((_, table)) = tables.iter().find(|(n, _)| n == name) {
        return Ok(FitData::Table(table));
    }
    match &find_dataset(datasets, name)?.content {
        DataContent::Table(table) => Ok(FitData::Table(table)),
        DataContent::Grid(grid) => Ok(FitData::Grid(grid)),
        DataContent::Matrix(_) => Err(AnalysisError::ProcessingError {
            message: format!(
                "input '{}' is raw laser data, fit '{}_pulsed' instead",
                name, name
            ),
        }),
    }
}

fn run_fit(
    fit: &FitConfig,
    datasets: &[Dataset],
    tables: &[(String, Table)],
) -> Result<(String, Table, FitSummary)> {
    let method: FitMethod = fit.fit_method()?;
    let defaults = Units::default();
    let logic = AnalysisLogic::with_units(
        fit.x_unit.clone().unwrap_or(defaults.x),
        fit.y_unit.clone().unwrap_or(defaults.y),
    );
    let name = format!("{}_{}_fit", fit.input, method.model.name());

    match fit_data(&fit.input, datasets, tables)? {
        FitData::Table(table) => {
            let names = table.column_names();
            let x = fit.x.as_deref().or(names.first().copied()).unwrap_or("x");
            let y = fit.y.as_deref().or(names.get(1).copied()).unwrap_or("y");
            let output = logic.fit(x, y, table, method)?;

            let mut curve = Table::new();
            curve.push_column("fit_x", Column::Float(output.fit_x))?;
            curve.push_column("fit_y", Column::Float(output.fit_y))?;
            Ok((name, curve, output.result.summary(&fit.input)))
        }
        FitData::Grid(grid) => {
            let output = logic.fit_2d(grid, method)?;
            let points = grid.points();

            let mut surface = Table::new();
            surface.push_column("x", Column::Float(points.iter().map(|p| p.0).collect()))?;
            surface.push_column("y", Column::Float(points.iter().map(|p| p.1).collect()))?;
            surface.push_column("data", Column::Float(points.iter().map(|p| p.2).collect()))?;
            surface.push_column("fit", Column::Float(output.result.best_fit.clone()))?;
            Ok((name, surface, output.result.summary(&fit.input)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn put(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                AnalysisError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn location(&self, path: &str) -> String {
            format!("mock://{}", path)
        }
    }

    fn config(extra: &str) -> AnalysisConfig {
        let toml_content = format!(
            r#"
[pipeline]
name = "test"

[[inputs]]
name = "laser"
path = "laser"
format = "qudi-matrix"

[[inputs]]
name = "decay"
path = "decay.dat"
format = "qudi"

[pulsed]
method = "mean"

[pulsed.windows]
signal_start = 0.0
signal_end = 4e-9
bin_width = 1e-9

{}

[load]
output_path = "out"
output_formats = ["tsv", "csv", "json"]
"#,
            extra
        );
        AnalysisConfig::from_toml_str(&toml_content).unwrap()
    }

    fn laser_file() -> String {
        let mut text = String::from("#bin width (s):1e-09\n#=====\n");
        for level in [10, 20, 30] {
            text.push_str(&format!("{l} {l} {l} {l} 0 0\n", l = level));
        }
        text
    }

    fn decay_file() -> String {
        let mut text = String::from("# Parameters\n#=====\n# time (s)\tcounts\n");
        for i in 0..40 {
            let t = i as f64 * 0.25;
            text.push_str(&format!("{}\t{}\n", t, 5.0 * (-t / 2.0).exp() + 1.0));
        }
        text
    }

    async fn seeded_storage() -> MockStorage {
        let storage = MockStorage::default();
        storage.put("laser.dat", laser_file().as_bytes()).await;
        storage.put("decay.dat", decay_file().as_bytes()).await;
        storage
    }

    #[tokio::test]
    async fn test_extract_keeps_config_order() {
        let storage = seeded_storage().await;
        let pipeline = AnalysisPipeline::new(storage, config(""));

        let datasets = pipeline.extract().await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].name, "laser");
        assert_eq!(datasets[0].source, "mock://laser.dat");
        assert_eq!(datasets[0].content.kind(), "matrix");
        assert_eq!(datasets[1].content.kind(), "table");
    }

    #[tokio::test]
    async fn test_extract_missing_input_fails() {
        let pipeline = AnalysisPipeline::new(MockStorage::default(), config(""));
        let err = pipeline.extract().await.unwrap_err();
        assert!(matches!(err, AnalysisError::IoError(_)));
    }

    #[tokio::test]
    async fn test_transform_pulsed_and_fit() {
        let storage = seeded_storage().await;
        let pipeline = AnalysisPipeline::new(
            storage,
            config(
                r#"
[[fits]]
input = "decay"
method = "decayexponential"
x = "time (s)"
y = "counts"
x_unit = "s"
"#,
            ),
        );
        let datasets = pipeline.extract().await.unwrap();
        let output = pipeline.transform(datasets).await.unwrap();

        let names: Vec<&str> = output.tables.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["laser_pulsed", "decay_decayexponential_fit"]);

        let pulsed = &output.tables[0].1;
        assert_eq!(pulsed.floats("signal").unwrap(), &[10.0, 20.0, 30.0]);
        assert_eq!(pulsed.floats("laser").unwrap(), &[0.0, 1.0, 2.0]);

        let summary = &output.fits[0];
        assert!(summary.success, "{}", summary.message);
        assert!((summary.parameters["lifetime"].value - 2.0).abs() < 1e-3);
        assert_eq!(output.tables[1].1.len(), 400);
    }

    #[tokio::test]
    async fn test_failed_fit_is_recorded_or_aborts() {
        let fits = r#"
[[fits]]
input = "decay"
method = "lorentzian"
y = "missing"
"#;
        let storage = seeded_storage().await;
        let pipeline = AnalysisPipeline::new(storage.clone(), config(fits));
        let datasets = pipeline.extract().await.unwrap();
        let output = pipeline.transform(datasets.clone()).await.unwrap();
        assert_eq!(output.fits.len(), 1);
        assert!(!output.fits[0].success);
        assert_eq!(output.fits[0].estimator, "dip");

        let strict = format!("{}\n[error_handling]\non_fit_error = \"abort\"\n", fits);
        let pipeline = AnalysisPipeline::new(storage, config(&strict));
        assert!(pipeline.transform(datasets).await.is_err());
    }

    #[tokio::test]
    async fn test_load_writes_each_format() {
        let storage = MockStorage::default();
        let pipeline = AnalysisPipeline::new(storage.clone(), config(""));

        let mut table = Table::new();
        table
            .push_column("laser", Column::Float(vec![0.0, 1.0]))
            .unwrap();
        let output = AnalysisOutput {
            tables: vec![("laser_pulsed".to_string(), table)],
            fits: vec![FitSummary::failed("decay", "sine", "generic", "boom".into())],
        };

        let location = pipeline.load(output).await.unwrap();
        assert_eq!(location, "mock://out");

        let tsv = storage.get_file("out/laser_pulsed.tsv").await.unwrap();
        assert_eq!(String::from_utf8(tsv).unwrap(), "laser\n0\n1\n");
        assert!(storage.get_file("out/laser_pulsed.csv").await.is_some());

        let json = storage.get_file("out/fits.json").await.unwrap();
        let fits: Vec<FitSummary> = serde_json::from_slice(&json).unwrap();
        assert_eq!(fits[0].message, "boom");
    }

    #[tokio::test]
    async fn test_load_bundles_zip_archive() {
        let storage = MockStorage::default();
        let mut config = config("");
        config.load.compression = Some(crate::config::toml_config::CompressionConfig {
            enabled: true,
            filename: "analysis.zip".to_string(),
        });
        let pipeline = AnalysisPipeline::new(storage.clone(), config);

        let signal = analysis::analyse_mean(
            &DMatrix::from_row_slice(1, 4, &[1.0, 1.0, 1.0, 1.0]),
            0.0,
            4e-9,
            1e-9,
        );
        let output = AnalysisOutput {
            tables: vec![("laser_pulsed".to_string(), pulsed_table(&signal).unwrap())],
            fits: Vec::new(),
        };

        let location = pipeline.load(output).await.unwrap();
        assert_eq!(location, "mock://out/analysis.zip");

        let zip_bytes = storage.get_file("out/analysis.zip").await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut file_names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        file_names.sort();
        assert_eq!(
            file_names,
            vec!["fits.json", "laser_pulsed.csv", "laser_pulsed.tsv"]
        );
        assert!(storage.get_file("out/laser_pulsed.tsv").await.is_none());
    }
}
