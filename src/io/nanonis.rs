use crate::domain::model::{parse_float, ParamValue, Parameters, Table};
use crate::io::{check_extension, read_text, split_delimited};
use crate::utils::error::{AnalysisError, Result};
use std::path::Path;

const OSCILLATION_PREFIX: &str = "Oscillation Control>";

/// Reads the data block of a Nanonis `.dat` export. The block starts after the first
/// `[DATA]` or `#=====` marker line; its first line is the header.
pub fn read_nanonis_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = check_extension(path, ".dat")?;
    let text = read_text(&path)?;
    parse_nanonis_table(&text).map_err(|message| AnalysisError::ParseError {
        path: path.display().to_string(),
        line: 0,
        message,
    })
}

pub(crate) fn parse_nanonis_table(text: &str) -> std::result::Result<Table, String> {
    let skip_rows = text
        .lines()
        .position(|line| line.contains("[DATA]") || line.contains("#====="))
        .map(|idx| idx + 1)
        .unwrap_or(0);

    let body: String = text
        .lines()
        .skip(skip_rows)
        .map(|line| format!("{}\n", line))
        .collect();
    let mut rows = split_delimited(&body, b'\t').map_err(|e| e.to_string())?;
    if rows.is_empty() {
        return Err("no data block found".to_string());
    }
    let names = rows.remove(0);
    Table::from_rows(names, rows).map_err(|e| e.to_string())
}

/// Reads the `label<TAB>value<TAB>` header of a Nanonis `.dat` export. Reading stops at
/// the first empty line; user fields and continuation lines are skipped.
pub fn read_nanonis_parameters(path: impl AsRef<Path>) -> Result<Parameters> {
    let path = check_extension(path, ".dat")?;
    let text = read_text(&path)?;
    Ok(parse_nanonis_parameters(&text))
}

pub(crate) fn parse_nanonis_parameters(text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        let mut fields = line.split('\t');
        let label = fields.next().unwrap_or_default();
        if line.contains("User") || label.is_empty() {
            continue;
        }
        let Some(raw) = fields.next() else {
            tracing::debug!("Skipping Nanonis header line without value: {}", line);
            continue;
        };

        let value = match parse_float(raw.trim()) {
            Some(number) => ParamValue::Float(number),
            None => ParamValue::Str(raw.to_string()),
        };
        let label = label.replace(OSCILLATION_PREFIX, "");
        parameters.insert(label, value);
    }
    parameters
}
