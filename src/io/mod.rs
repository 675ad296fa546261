//! Readers and writers for the measurement files produced around the setup: qudi data
//! files, Nanonis scanning-probe exports, Pfeiffer vacuum logs, Lakeshore temperature
//! logs and OceanOptics spectra.

pub mod lakeshore;
pub mod nanonis;
pub mod oceanoptics;
pub mod persist;
pub mod pfeiffer;
pub mod qudi;

use crate::domain::model::{DataContent, Dataset, Parameters};
use crate::utils::error::{AnalysisError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use lakeshore::read_lakeshore_table;
pub use nanonis::{read_nanonis_parameters, read_nanonis_table};
pub use oceanoptics::read_oceanoptics_table;
pub use persist::{load_json, save_json, save_table, table_to_delimited, table_to_tsv};
pub use pfeiffer::read_pfeiffer_table;
pub use qudi::{
    read_confocal, read_matrix, read_matrix_transposed, read_qudi_parameters, read_qudi_table,
};

/// File layouts understood by [`read_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataFormat {
    /// qudi `.dat` file with a tab separated table after the header.
    Qudi,
    /// qudi `.dat` file holding a plain numeric matrix, e.g. raw laser pulses.
    QudiMatrix,
    /// Same as [`DataFormat::QudiMatrix`] with rows and columns swapped.
    QudiMatrixTransposed,
    /// qudi confocal scan image.
    Confocal,
    Nanonis,
    Pfeiffer,
    Lakeshore,
    Oceanoptics,
}

impl DataFormat {
    pub const ALL: [DataFormat; 8] = [
        DataFormat::Qudi,
        DataFormat::QudiMatrix,
        DataFormat::QudiMatrixTransposed,
        DataFormat::Confocal,
        DataFormat::Nanonis,
        DataFormat::Pfeiffer,
        DataFormat::Lakeshore,
        DataFormat::Oceanoptics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DataFormat::Qudi => "qudi",
            DataFormat::QudiMatrix => "qudi-matrix",
            DataFormat::QudiMatrixTransposed => "qudi-matrix-transposed",
            DataFormat::Confocal => "confocal",
            DataFormat::Nanonis => "nanonis",
            DataFormat::Pfeiffer => "pfeiffer",
            DataFormat::Lakeshore => "lakeshore",
            DataFormat::Oceanoptics => "oceanoptics",
        }
    }

    /// Formats read as a plain matrix of laser pulses.
    pub fn is_matrix(&self) -> bool {
        matches!(self, DataFormat::QudiMatrix | DataFormat::QudiMatrixTransposed)
    }

    /// Extension enforced by the reader, if any.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            DataFormat::Nanonis => Some(".dat"),
            DataFormat::Pfeiffer | DataFormat::Oceanoptics => Some(".txt"),
            DataFormat::Lakeshore => Some(".xls"),
            _ => None,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns `path` when its file name ends with `extension`, appends `extension` when the
/// file name has none, and rejects any other extension.
pub fn check_extension(path: impl AsRef<Path>, extension: &str) -> Result<PathBuf> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if filename.ends_with(extension) {
        return Ok(path.to_path_buf());
    }
    if let Some((_, found)) = filename.rsplit_once('.') {
        return Err(AnalysisError::InvalidExtension {
            filename: filename.clone(),
            found: found.to_string(),
            expected: extension.to_string(),
        });
    }
    let mut appended = path.as_os_str().to_owned();
    appended.push(extension);
    Ok(PathBuf::from(appended))
}

/// Replaces Pfeiffer channel names with the gauge locations.
///
/// The mapping is all or nothing: if any name is not a known channel the names are
/// returned unchanged.
pub fn channel_to_gauge_names(channel_names: &[String]) -> Vec<String> {
    let gauges: Option<Vec<String>> = channel_names
        .iter()
        .map(|name| match name.trim() {
            "CH 1" => Some("Main".to_string()),
            "CH 2" => Some("Prep".to_string()),
            "CH 3" => Some("Backing".to_string()),
            _ => None,
        })
        .collect();
    gauges.unwrap_or_else(|| channel_names.to_vec())
}

/// Path a reader for `format` opens: qudi files get `.dat` appended when missing and the
/// instrument formats enforce their extension.
pub fn resolve_path(path: &str, format: DataFormat) -> Result<PathBuf> {
    match format.extension() {
        Some(extension) => check_extension(path, extension),
        None => Ok(qudi::with_dat_extension(path)),
    }
}

/// Reads one input file into a [`Dataset`].
pub fn read_dataset(path: &str, format: DataFormat, name: &str) -> Result<Dataset> {
    let resolved = resolve_path(path, format)?;
    tracing::debug!("Reading {} as {}", resolved.display(), format);
    let bytes = std::fs::read(&resolved)?;
    decode_dataset(&resolved.display().to_string(), &bytes, format, name)
}

/// Decodes the raw content of one input file. `source` is only used for naming the
/// dataset and in parse errors.
pub fn decode_dataset(source: &str, bytes: &[u8], format: DataFormat, name: &str) -> Result<Dataset> {
    let text = String::from_utf8_lossy(bytes);
    let at_line = |(line, message): (usize, String)| AnalysisError::ParseError {
        path: source.to_string(),
        line,
        message,
    };
    let anywhere = |message: String| AnalysisError::ParseError {
        path: source.to_string(),
        line: 0,
        message,
    };

    let (content, parameters) = match format {
        DataFormat::Qudi => (
            DataContent::Table(qudi::parse_qudi_table(&text).map_err(anywhere)?),
            qudi::parse_qudi_parameters(&text),
        ),
        DataFormat::QudiMatrix => (
            DataContent::Matrix(qudi::parse_matrix(&text).map_err(at_line)?),
            qudi::parse_qudi_parameters(&text),
        ),
        DataFormat::QudiMatrixTransposed => (
            DataContent::Matrix(qudi::parse_matrix(&text).map_err(at_line)?.transpose()),
            qudi::parse_qudi_parameters(&text),
        ),
        DataFormat::Confocal => {
            let parameters = qudi::parse_qudi_parameters(&text);
            let data = qudi::parse_matrix(&text).map_err(at_line)?;
            let grid = qudi::confocal_grid(&parameters, data, source)?;
            (DataContent::Grid(grid), parameters)
        }
        DataFormat::Nanonis => (
            DataContent::Table(nanonis::parse_nanonis_table(&text).map_err(anywhere)?),
            nanonis::parse_nanonis_parameters(&text),
        ),
        DataFormat::Pfeiffer => (
            DataContent::Table(pfeiffer::parse_pfeiffer_table(&text).map_err(at_line)?),
            Parameters::new(),
        ),
        DataFormat::Lakeshore => (
            DataContent::Table(lakeshore::parse_lakeshore_table(&text).map_err(at_line)?),
            Parameters::new(),
        ),
        DataFormat::Oceanoptics => (
            DataContent::Table(
                oceanoptics::parse_oceanoptics_table(&text)
                    .map_err(|message| at_line((oceanoptics::HEADER_LINES + 1, message)))?,
            ),
            Parameters::new(),
        ),
    };

    Ok(Dataset {
        name: name.to_string(),
        source: source.to_string(),
        content,
        parameters,
    })
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

/// Splits tab separated text into trimmed rows, skipping blank lines. Trailing empty
/// cells are dropped so exports that end every line with a tab parse cleanly.
pub(crate) fn split_delimited(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        while row.last().is_some_and(|cell| cell.is_empty()) {
            row.pop();
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

const DATETIME_FORMATS: [&str; 12] = [
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d-%b-%y %H:%M:%S%.f",
    "%d-%b-%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%a, %b %d, %Y %H:%M:%S",
    "%A, %B %d, %Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

/// Time zone abbreviations accepted at the end of a timestamp. Lab logs are written in
/// CET; like the logging software, the offset is taken as zero.
const ZERO_OFFSET_ZONES: [&str; 4] = ["CET", "UTC", "GMT", "Z"];

/// Parses the timestamp spellings found in instrument logs as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let mut text = raw.trim();
    if let Some((head, zone)) = text.rsplit_once(' ') {
        if ZERO_OFFSET_ZONES.contains(&zone) {
            text = head.trim_end();
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_check_extension() {
        assert_eq!(
            check_extension("data/scan.dat", ".dat").unwrap(),
            PathBuf::from("data/scan.dat")
        );
        assert_eq!(
            check_extension("data/scan", ".dat").unwrap(),
            PathBuf::from("data/scan.dat")
        );
        let err = check_extension("data/scan.txt", ".dat").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid extension 'txt' in 'scan.txt', extension should be '.dat'"
        );
    }

    #[test]
    fn test_channel_to_gauge_names() {
        let channels = vec!["CH 1".to_string(), "CH 3".to_string(), "CH 2".to_string()];
        assert_eq!(
            channel_to_gauge_names(&channels),
            vec!["Main", "Backing", "Prep"]
        );

        let header: Vec<String> = ["Date", "Time", "CH 1", "CH 2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(channel_to_gauge_names(&header), header);

        let unknown = vec!["CH 1".to_string(), "CH 4".to_string()];
        assert_eq!(channel_to_gauge_names(&unknown), unknown);
    }

    #[test]
    fn test_parse_datetime_variants() {
        let dt = parse_datetime("24.06.2022 09:20:15").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2022, 6, 24));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (9, 20, 15));

        let cet = parse_datetime("Jun 24, 2022 09:20:15 CET").unwrap();
        assert_eq!(cet, dt);

        assert!(parse_datetime("2022-06-24 09:20:15.250").is_some());
        assert!(parse_datetime("not a date").is_none());
    }

    #[test]
    fn test_resolve_path_per_format() {
        assert_eq!(
            resolve_path("runs/rabi", DataFormat::QudiMatrix).unwrap(),
            PathBuf::from("runs/rabi.dat")
        );
        assert_eq!(
            resolve_path("logs/pressure", DataFormat::Pfeiffer).unwrap(),
            PathBuf::from("logs/pressure.txt")
        );
        assert!(resolve_path("logs/temperature.txt", DataFormat::Lakeshore).is_err());
    }

    #[test]
    fn test_decode_dataset_qudi_matrix() {
        let text = "#bin width (s):1e-09\n#=====\n1 2 3\n4 5 6\n";
        let dataset =
            decode_dataset("rabi.dat", text.as_bytes(), DataFormat::QudiMatrixTransposed, "rabi")
                .unwrap();
        assert_eq!(dataset.name, "rabi");
        assert_eq!(dataset.parameters.get_f64("bin width (s)"), Some(1e-9));
        match dataset.content {
            DataContent::Matrix(m) => {
                assert_eq!((m.nrows(), m.ncols()), (3, 2));
                assert_eq!(m[(2, 1)], 6.0);
            }
            other => panic!("unexpected content {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_dataset_reports_source_in_errors() {
        let err = decode_dataset("ragged.dat", b"1 2\n3\n", DataFormat::QudiMatrix, "ragged")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ragged.dat"), "{}", message);
    }

    #[test]
    fn test_split_delimited_drops_trailing_tabs() {
        let rows = split_delimited("a\tb\t\n1\t2\t\n\n3\t4\n", b'\t').unwrap();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"], vec!["3", "4"]]);
    }
}
