use crate::domain::model::{AnalysisOutput, Dataset};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Human readable location of `path`, used in log lines and returned output paths.
    fn location(&self, path: &str) -> String;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Dataset>>;
    async fn transform(&self, data: Vec<Dataset>) -> Result<AnalysisOutput>;
    async fn load(&self, result: AnalysisOutput) -> Result<String>;
}
