use crate::domain::model::{parse_float, Grid2D, ParamValue, Parameters, Table};
use crate::io::{read_text, split_delimited};
use crate::utils::error::{AnalysisError, Result};
use chrono::NaiveDateTime;
use nalgebra::DMatrix;
use std::path::{Path, PathBuf};

const HEADER_END: &str = "#=====";
const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %Hh%Mmin%Ss";

pub(crate) fn with_dat_extension(path: &str) -> PathBuf {
    if path.ends_with(".dat") {
        PathBuf::from(path)
    } else {
        PathBuf::from(format!("{}.dat", path))
    }
}

/// Extracts the `# label: value` parameters from the header of a qudi data file.
///
/// Values are read as literals (numbers, booleans, `None`, quoted strings, lists and
/// tuples). Lines that do not parse are skipped.
pub fn read_qudi_parameters(path: &str) -> Result<Parameters> {
    let path = with_dat_extension(path);
    let text = read_text(&path)?;
    Ok(parse_qudi_parameters(&text))
}

pub(crate) fn parse_qudi_parameters(text: &str) -> Parameters {
    let mut params = Parameters::new();
    for line in text.lines() {
        if line == HEADER_END {
            break;
        }
        let Some(line) = line.get(1..) else {
            continue;
        };
        match line.matches(':').count() {
            1 => {
                let Some((label, value)) = line.split_once(':') else {
                    continue;
                };
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if let Some(parsed) = parse_literal(value) {
                    params.insert(label, parsed);
                }
            }
            3 => {
                let mut parts = line.split(':');
                let label = parts.next().unwrap_or_default();
                let joined: String = parts.collect();
                if let Ok(naive) = NaiveDateTime::parse_from_str(joined.trim(), TIMESTAMP_FORMAT)
                {
                    params.insert(label, ParamValue::Timestamp(naive.and_utc()));
                }
            }
            _ => {}
        }
    }
    params
}

/// Parses a Python style literal as written by qudi into file headers.
pub(crate) fn parse_literal(raw: &str) -> Option<ParamValue> {
    let text = raw.trim();
    match text {
        "" => return None,
        "True" => return Some(ParamValue::Bool(true)),
        "False" => return Some(ParamValue::Bool(false)),
        "None" => return Some(ParamValue::None),
        _ => {}
    }

    if let Ok(value) = text.replace('_', "").parse::<i64>() {
        if !text.starts_with('_') && !text.ends_with('_') {
            return Some(ParamValue::Int(value));
        }
    }
    if looks_numeric(text) {
        if let Ok(value) = text.parse::<f64>() {
            return Some(ParamValue::Float(value));
        }
    }

    let bytes = text.as_bytes();
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if text.len() >= 2 && (first == b'\'' || first == b'"') && last == first {
        let inner = &text[1..text.len() - 1];
        if inner.contains(first as char) {
            return None;
        }
        return Some(ParamValue::Str(inner.to_string()));
    }
    if (first == b'[' && last == b']') || (first == b'(' && last == b')') {
        let inner = &text[1..text.len() - 1];
        let mut items = Vec::new();
        for item in split_top_level(inner)? {
            if item.trim().is_empty() {
                continue;
            }
            items.push(parse_literal(item)?);
        }
        return Some(ParamValue::List(items));
    }
    None
}

// Rejects words like "inf" or "nan" that f64::from_str accepts but Python literals do not.
fn looks_numeric(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && text.chars().any(|c| c.is_ascii_digit())
}

fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return None;
                    }
                }
                ',' if depth == 0 => {
                    items.push(&text[start..idx]);
                    start = idx + 1;
                }
                _ => {}
            },
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    items.push(&text[start..]);
    Some(items)
}

/// Reads a qudi data file into a [`Table`]. Column names come from the last comment
/// line before the data.
pub fn read_qudi_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let text = read_text(path)?;
    parse_qudi_table(&text).map_err(|message| AnalysisError::ParseError {
        path: path.display().to_string(),
        line: 0,
        message,
    })
}

pub(crate) fn parse_qudi_table(text: &str) -> std::result::Result<Table, String> {
    let names_line = text
        .lines()
        .take_while(|line| line.starts_with('#'))
        .last()
        .ok_or_else(|| "file has no header".to_string())?;
    let names: Vec<String> = names_line[1..]
        .trim()
        .split('\t')
        .map(str::to_string)
        .collect();

    let body: String = text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| format!("{}\n", line))
        .collect();
    let rows = split_delimited(&body, b'\t').map_err(|e| e.to_string())?;
    Table::from_rows(names, rows).map_err(|e| e.to_string())
}

/// Reads whitespace separated numbers into a matrix. `#` starts a comment and cells
/// that are not numbers become NaN.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<DMatrix<f64>> {
    let path = path.as_ref();
    let text = read_text(path)?;
    parse_matrix(&text).map_err(|(line, message)| AnalysisError::ParseError {
        path: path.display().to_string(),
        line,
        message,
    })
}

pub fn read_matrix_transposed(path: impl AsRef<Path>) -> Result<DMatrix<f64>> {
    Ok(read_matrix(path)?.transpose())
}

pub(crate) fn parse_matrix(text: &str) -> std::result::Result<DMatrix<f64>, (usize, String)> {
    let mut values = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0;

    for (idx, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        if content.trim().is_empty() {
            continue;
        }
        let row: Vec<f64> = content
            .split_whitespace()
            .map(|cell| parse_float(cell).unwrap_or(f64::NAN))
            .collect();
        match ncols {
            None => ncols = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err((
                    idx + 1,
                    format!("expected {} columns, found {}", expected, row.len()),
                ));
            }
            Some(_) => {}
        }
        values.extend(row);
        nrows += 1;
    }

    Ok(DMatrix::from_row_slice(nrows, ncols.unwrap_or(0), &values))
}

fn axis_bound(params: &Parameters, keys: &[&str], path: &str) -> Result<f64> {
    keys.iter()
        .find_map(|key| params.get_f64(key))
        .ok_or_else(|| AnalysisError::MissingParameter {
            path: path.to_string(),
            name: keys[0].to_string(),
        })
}

pub(crate) fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Reads a qudi confocal image. Rows are ordered by descending x so the scan origin sits
/// in the lower left corner.
pub fn read_confocal(path: &str) -> Result<Grid2D> {
    let params = read_qudi_parameters(path)?;
    let data = read_matrix(path)?;
    confocal_grid(&params, data, path)
}

/// Builds the confocal image from the header parameters and the raw matrix.
pub(crate) fn confocal_grid(params: &Parameters, data: DMatrix<f64>, path: &str) -> Result<Grid2D> {
    let x_min = axis_bound(params, &["X image min (m)", "X image min"], path)?;
    let x_max = axis_bound(params, &["X image max (m)", "X image max"], path)?;
    let y_min = axis_bound(params, &["Y image min", "Y image min (m)"], path)?;
    let y_max = axis_bound(params, &["Y image max", "Y image max (m)"], path)?;

    let x = linspace(x_min, x_max, data.nrows());
    let y = linspace(y_min, y_max, data.ncols());
    Ok(sort_rows_descending(x, y, data))
}

fn sort_rows_descending(x: Vec<f64>, y: Vec<f64>, data: DMatrix<f64>) -> Grid2D {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| x[b].total_cmp(&x[a]));

    let values = DMatrix::from_fn(data.nrows(), data.ncols(), |i, j| data[(order[i], j)]);
    let x = order.iter().map(|&i| x[i]).collect();
    Grid2D { x, y, values }
}
