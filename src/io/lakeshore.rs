use crate::domain::model::{Column, Table};
use crate::io::{check_extension, parse_datetime, read_text, split_delimited};
use crate::utils::error::{AnalysisError, Result};
use chrono::Duration;
use std::path::Path;

const TIMESTAMP_ROW: usize = 1;
const HEADER_ROW: usize = 3;

/// Reads a log from the Lakeshore temperature monitor software.
///
/// The software saves tab delimited text with an `.xls` extension. The start time sits in
/// the second cell of the second row and the `Time` column counts milliseconds from it;
/// a `Datetime` column with absolute times is appended.
pub fn read_lakeshore_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = check_extension(path, ".xls")?;
    let text = read_text(&path)?;
    parse_lakeshore_table(&text).map_err(|(line, message)| AnalysisError::ParseError {
        path: path.display().to_string(),
        line,
        message,
    })
}

pub(crate) fn parse_lakeshore_table(text: &str) -> std::result::Result<Table, (usize, String)> {
    let lines: Vec<&str> = text.lines().collect();
    let raw_timestamp = lines
        .get(TIMESTAMP_ROW)
        .and_then(|line| line.split('\t').nth(1))
        .ok_or((TIMESTAMP_ROW + 1, "missing start timestamp".to_string()))?;
    let start = parse_datetime(raw_timestamp).ok_or_else(|| {
        (
            TIMESTAMP_ROW + 1,
            format!("unrecognised timestamp '{}'", raw_timestamp.trim()),
        )
    })?;

    let body: String = lines
        .iter()
        .skip(HEADER_ROW)
        .map(|line| format!("{}\n", line))
        .collect();
    let mut rows = split_delimited(&body, b'\t').map_err(|e| (HEADER_ROW + 1, e.to_string()))?;
    if rows.is_empty() {
        return Err((HEADER_ROW + 1, "missing header row".to_string()));
    }
    let names = rows.remove(0);
    let mut table = Table::from_rows(names, rows).map_err(|e| (HEADER_ROW + 1, e.to_string()))?;

    let offsets = table
        .floats("Time")
        .map_err(|_| (HEADER_ROW + 1, "missing numeric 'Time' column".to_string()))?;
    let stamps = offsets
        .iter()
        .map(|&ms| start + Duration::microseconds((ms * 1e3).round() as i64))
        .collect();
    table
        .push_column("Datetime", Column::Timestamp(stamps))
        .map_err(|e| (0, e.to_string()))?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAMPLE: &str = "Lakeshore Model 336\n\
Start\tJun 24, 2022 09:20:15 CET\n\
\n\
Time\tChannel A (K)\tChannel B (K)\n\
0\t4.21\t4.35\n\
1500\t4.22\t4.36\n";

    #[test]
    fn test_parse_lakeshore_table() {
        let table = parse_lakeshore_table(SAMPLE).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Time", "Channel A (K)", "Channel B (K)", "Datetime"]
        );
        let stamps = table.column("Datetime").unwrap().as_timestamps().unwrap();
        assert_eq!(stamps[0].hour(), 9);
        assert_eq!(stamps[1].second(), 16);
        assert_eq!(stamps[1].nanosecond(), 500_000_000);
    }

    #[test]
    fn test_bad_timestamp_is_reported_on_row_two() {
        let text = "title\nStart\tyesterday\n\nTime\n0\n";
        let err = parse_lakeshore_table(text).unwrap_err();
        assert_eq!(err.0, 2);
    }
}
