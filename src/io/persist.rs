use crate::domain::model::Table;
use crate::io::check_extension;
use crate::utils::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

fn prepare_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Serializes a table as tab separated UTF-8 text.
pub fn table_to_tsv(table: &Table) -> Result<Vec<u8>> {
    table_to_delimited(table, b'\t')
}

pub fn table_to_delimited(table: &Table, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(table.column_names())?;
    for row in 0..table.len() {
        writer.write_record(table.row(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

/// Saves a table as tab separated text. The path must end in `.csv` (appended when the
/// file name has no extension); missing parent directories are created.
pub fn save_table(table: &Table, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = check_extension(path, ".csv")?;
    prepare_parent(&path)?;
    fs::write(&path, table_to_tsv(table)?)?;
    tracing::debug!("Saved {} rows to {}", table.len(), path.display());
    Ok(path)
}

/// Saves processed results as pretty printed JSON for later analysis.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = check_extension(path, ".json")?;
    prepare_parent(&path)?;
    fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = check_extension(path, ".json")?;
    let data = fs::read(&path)?;
    Ok(serde_json::from_slice(&data)?)
}
