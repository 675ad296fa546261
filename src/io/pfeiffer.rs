use crate::domain::model::{Column, Table};
use crate::io::{channel_to_gauge_names, check_extension, parse_datetime, read_text, split_delimited};
use crate::utils::error::{AnalysisError, Result};
use std::path::Path;

const HEADER_ROW: usize = 1;
const DATA_START_ROW: usize = 5;

/// Reads a log written by the Pfeiffer vacuum monitoring software.
///
/// The header goes through [`channel_to_gauge_names`], which leaves it unchanged when it
/// holds anything besides gauge channels. The `Date` and `Time` columns are merged into a
/// leading `Datetime` column.
pub fn read_pfeiffer_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = check_extension(path, ".txt")?;
    let text = read_text(&path)?;
    parse_pfeiffer_table(&text).map_err(|(line, message)| AnalysisError::ParseError {
        path: path.display().to_string(),
        line,
        message,
    })
}

pub(crate) fn parse_pfeiffer_table(text: &str) -> std::result::Result<Table, (usize, String)> {
    let lines: Vec<&str> = text.lines().collect();
    let header_line = lines
        .get(HEADER_ROW)
        .ok_or((HEADER_ROW + 1, "missing header row".to_string()))?;
    let header_fields: Vec<String> = header_line
        .split('\t')
        .map(|name| name.trim().to_string())
        .collect();
    let header = channel_to_gauge_names(&header_fields);

    let body: String = lines
        .iter()
        .skip(DATA_START_ROW)
        .map(|line| format!("{}\n", line))
        .collect();
    let rows = split_delimited(&body, b'\t').map_err(|e| (DATA_START_ROW + 1, e.to_string()))?;
    let mut table =
        Table::from_rows(header, rows).map_err(|e| (DATA_START_ROW + 1, e.to_string()))?;

    let dates = text_column(&mut table, "Date")?;
    let times = text_column(&mut table, "Time")?;
    let mut stamps = Vec::with_capacity(dates.len());
    for (row, (date, time)) in dates.iter().zip(&times).enumerate() {
        let combined = format!("{} {}", date, time);
        let stamp = parse_datetime(&combined).ok_or_else(|| {
            (
                DATA_START_ROW + row + 1,
                format!("unrecognised timestamp '{}'", combined),
            )
        })?;
        stamps.push(stamp);
    }
    table
        .insert_column(0, "Datetime", Column::Timestamp(stamps))
        .map_err(|e| (0, e.to_string()))?;
    Ok(table)
}

fn text_column(table: &mut Table, name: &str) -> std::result::Result<Vec<String>, (usize, String)> {
    match table.drop_column(name) {
        Some(Column::Text(values)) => Ok(values),
        Some(Column::Float(values)) => Ok(values.iter().map(|v| v.to_string()).collect()),
        Some(Column::Timestamp(_)) | None => {
            Err((HEADER_ROW + 1, format!("missing '{}' column", name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAMPLE: &str = "PV TurboViewer export\n\
Date\tTime\tCH 1\tCH 2\tCH 3\n\
unit\tunit\tmbar\tmbar\tmbar\n\
\n\
----\n\
24.06.2022\t09:20:15\t1.2E-9\t3.0E-7\t4.1E-3\n\
24.06.2022\t09:20:16\t1.1E-9\t3.1E-7\t4.0E-3\n";

    #[test]
    fn test_parse_pfeiffer_table() {
        let table = parse_pfeiffer_table(SAMPLE).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Datetime", "CH 1", "CH 2", "CH 3"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.floats("CH 1").unwrap(), &[1.2e-9, 1.1e-9]);
        let stamps = table.column("Datetime").unwrap().as_timestamps().unwrap();
        assert_eq!(stamps[1].second(), 16);
    }

    #[test]
    fn test_missing_time_column_is_an_error() {
        let text = "x\nDate\tCH 1\n\n\n\n24.06.2022\t1.0\n";
        assert!(parse_pfeiffer_table(text).is_err());
    }
}
