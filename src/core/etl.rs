use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::{Phase, SystemMonitor};

/// Drives a pipeline through extract, transform and load.
pub struct AnalysisEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> AnalysisEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    /// Records CPU, memory and duration of every phase when `enabled`.
    pub fn new_with_monitoring(pipeline: P, enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting analysis");
        self.monitor.begin();

        tracing::info!("Extracting inputs...");
        let datasets = self.pipeline.extract().await?;
        tracing::info!("Extracted {} datasets", datasets.len());
        for dataset in &datasets {
            tracing::debug!(
                "  {} <- {} ({}, {} rows, {} parameters)",
                dataset.name,
                dataset.source,
                dataset.content.kind(),
                dataset.content.rows(),
                dataset.parameters.len()
            );
        }
        self.monitor.record(Phase::Extract, datasets.len());

        tracing::info!("Analysing...");
        let output = self.pipeline.transform(datasets).await?;
        let failed = output.fits.iter().filter(|fit| !fit.success).count();
        tracing::info!(
            "Produced {} tables and {} fits ({} unsuccessful)",
            output.tables.len(),
            output.fits.len(),
            failed
        );
        self.monitor.record(Phase::Analyse, output.fits.len());

        tracing::info!("Writing results...");
        let tables = output.tables.len();
        let location = self.pipeline.load(output).await?;
        tracing::info!("Output saved to: {}", location);
        self.monitor.record(Phase::Write, tables);
        self.monitor.log_summary();

        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AnalysisOutput, Column, DataContent, Dataset, Parameters, Table};
    use crate::utils::error::AnalysisError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct CountingPipeline {
        calls: AtomicUsize,
        fail_transform: bool,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Vec<Dataset>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut table = Table::new();
            table.push_column("x", Column::Float(vec![1.0, 2.0]))?;
            Ok(vec![Dataset {
                name: "spectrum".to_string(),
                source: "spectrum.txt".to_string(),
                content: DataContent::Table(table),
                parameters: Parameters::new(),
            }])
        }

        async fn transform(&self, data: Vec<Dataset>) -> Result<AnalysisOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_transform {
                return Err(AnalysisError::ProcessingError {
                    message: "no signal".to_string(),
                });
            }
            let tables = data
                .into_iter()
                .filter_map(|d| match d.content {
                    DataContent::Table(t) => Some((d.name, t)),
                    _ => None,
                })
                .collect();
            Ok(AnalysisOutput {
                tables,
                fits: Vec::new(),
            })
        }

        async fn load(&self, result: AnalysisOutput) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("out/{}", result.tables[0].0))
        }
    }

    #[tokio::test]
    async fn test_run_passes_through_all_phases() {
        let engine = AnalysisEngine::new(CountingPipeline::default());
        let location = assert_ok!(engine.run().await);
        assert_eq!(location, "out/spectrum");
        assert_eq!(engine.pipeline().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_at_failing_phase() {
        let engine = AnalysisEngine::new_with_monitoring(
            CountingPipeline {
                fail_transform: true,
                ..Default::default()
            },
            true,
        );
        assert_err!(engine.run().await);
        assert_eq!(engine.pipeline().calls.load(Ordering::SeqCst), 2);
    }
}
