use crate::domain::model::Table;
use crate::io::{check_extension, read_text, split_delimited};
use crate::utils::error::{AnalysisError, Result};
use std::path::Path;

pub(crate) const HEADER_LINES: usize = 14;

/// Reads a spectrum saved by an OceanOptics spectrometer into `wavelength` and
/// `intensity` columns.
pub fn read_oceanoptics_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = check_extension(path, ".txt")?;
    let text = read_text(&path)?;
    parse_oceanoptics_table(&text).map_err(|message| AnalysisError::ParseError {
        path: path.display().to_string(),
        line: HEADER_LINES + 1,
        message,
    })
}

pub(crate) fn parse_oceanoptics_table(text: &str) -> std::result::Result<Table, String> {
    // The spectrum ends with an ">>>>>End Spectral Data<<<<<" marker.
    let body: String = text
        .lines()
        .skip(HEADER_LINES)
        .filter(|line| !line.starts_with(">>>>>"))
        .map(|line| format!("{}\n", line))
        .collect();
    let rows = split_delimited(&body, b'\t').map_err(|e| e.to_string())?;
    Table::from_rows(vec!["wavelength".into(), "intensity".into()], rows)
        .map_err(|e| e.to_string())
}
