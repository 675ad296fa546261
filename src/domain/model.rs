use crate::utils::error::{AnalysisError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single column of a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum Column {
    Float(Vec<f64>),
    Text(Vec<String>),
    Timestamp(Vec<DateTime<Utc>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamps(&self) -> Option<&[DateTime<Utc>]> {
        match self {
            Column::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Column::Float(v) => format_float(v[row]),
            Column::Text(v) => v[row].clone(),
            Column::Timestamp(v) => v[row].to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    /// Builds a column from raw cells: numeric when every non-empty cell parses as a
    /// float (empty cells become NaN), text otherwise.
    pub fn from_cells(cells: Vec<String>) -> Self {
        let mut floats = Vec::with_capacity(cells.len());
        for cell in &cells {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                floats.push(f64::NAN);
                continue;
            }
            match parse_float(trimmed) {
                Some(value) => floats.push(value),
                None => return Column::Text(cells),
            }
        }
        Column::Float(floats)
    }
}

pub(crate) fn parse_float(cell: &str) -> Option<f64> {
    match cell.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => cell.parse::<f64>().ok(),
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Column oriented table with ordered, uniquely named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let at = self.columns.len();
        self.insert_column(at, name, column)
    }

    pub fn insert_column(
        &mut self,
        at: usize,
        name: impl Into<String>,
        column: Column,
    ) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.len() {
            return Err(AnalysisError::ProcessingError {
                message: format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    self.len()
                ),
            });
        }
        if self.column(&name).is_some() {
            return Err(AnalysisError::ProcessingError {
                message: format!("duplicate column '{}'", name),
            });
        }
        let at = at.min(self.columns.len());
        self.columns.insert(at, (name, column));
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let position = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(position).1)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .and_then(Column::as_floats)
            .ok_or_else(|| AnalysisError::ColumnError {
                column: name.to_string(),
            })
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Parses delimited rows into a table using `names` as the header. Short rows are
    /// padded with empty cells; rows longer than the header are an error.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut cells: Vec<Vec<String>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (line, row) in rows.into_iter().enumerate() {
            if row.len() > names.len() {
                return Err(AnalysisError::ProcessingError {
                    message: format!(
                        "row {} has {} fields, header has {}",
                        line + 1,
                        row.len(),
                        names.len()
                    ),
                });
            }
            let mut row = row.into_iter();
            for column in cells.iter_mut() {
                column.push(row.next().unwrap_or_default());
            }
        }

        let mut table = Table::new();
        for (name, column) in names.into_iter().zip(cells) {
            table.push_column(name, Column::from_cells(column))?;
        }
        Ok(table)
    }

    /// Parses delimited text. With `names` every line is data; without, the first line
    /// is the header.
    pub fn from_delimited(text: &str, separator: u8, names: Option<Vec<String>>) -> Result<Self> {
        let mut rows = crate::io::split_delimited(text, separator)?;
        let names = match names {
            Some(names) => names,
            None if rows.is_empty() => return Ok(Table::new()),
            None => rows.remove(0),
        };
        Self::from_rows(names, rows)
    }

    /// Formatted cells of one row; NaN is written as an empty cell.
    pub fn row(&self, index: usize) -> Vec<String> {
        self.columns.iter().map(|(_, c)| c.cell(index)).collect()
    }

    pub fn to_delimited(&self, separator: char) -> String {
        let sep = separator.to_string();
        let mut lines = Vec::with_capacity(self.len() + 1);
        lines.push(self.column_names().join(&sep));
        for row in 0..self.len() {
            lines.push(self.row(row).join(&sep));
        }
        lines.join("\n")
    }
}

/// Values found in instrument file headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Header parameters keyed by label, in label order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters(pub BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: ParamValue) {
        self.0.insert(label.into(), value);
    }

    pub fn get(&self, label: &str) -> Option<&ParamValue> {
        self.0.get(label)
    }

    pub fn get_f64(&self, label: &str) -> Option<f64> {
        self.get(label).and_then(ParamValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Confocal scan image with its physical axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid2D {
    /// Row coordinates, one per matrix row.
    pub x: Vec<f64>,
    /// Column coordinates, one per matrix column.
    pub y: Vec<f64>,
    pub values: DMatrix<f64>,
}

impl Grid2D {
    /// Flattens the grid into `(x, y, value)` triples in row-major order.
    pub fn points(&self) -> Vec<(f64, f64, f64)> {
        let mut points = Vec::with_capacity(self.values.len());
        for (i, &x) in self.x.iter().enumerate() {
            for (j, &y) in self.y.iter().enumerate() {
                points.push((x, y, self.values[(i, j)]));
            }
        }
        points
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataContent {
    Table(Table),
    Matrix(DMatrix<f64>),
    Grid(Grid2D),
}

impl DataContent {
    pub fn kind(&self) -> &'static str {
        match self {
            DataContent::Table(_) => "table",
            DataContent::Matrix(_) => "matrix",
            DataContent::Grid(_) => "grid",
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            DataContent::Table(t) => t.len(),
            DataContent::Matrix(m) => m.nrows(),
            DataContent::Grid(g) => g.values.nrows(),
        }
    }
}

/// One input file after extraction.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub source: String,
    pub content: DataContent,
    pub parameters: Parameters,
}

/// Serializable summary of one fit, written to `fits.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    pub input: String,
    pub method: String,
    pub estimator: String,
    pub success: bool,
    pub message: String,
    pub chisqr: Option<f64>,
    pub redchi: Option<f64>,
    pub parameters: BTreeMap<String, FitValue>,
    pub results: BTreeMap<String, crate::fit::ResultEntry>,
}

impl FitSummary {
    /// Record of a fit that raised an error before producing a result.
    pub fn failed(input: &str, method: &str, estimator: &str, message: String) -> Self {
        Self {
            input: input.to_string(),
            method: method.to_string(),
            estimator: estimator.to_string(),
            success: false,
            message,
            chisqr: None,
            redchi: None,
            parameters: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitValue {
    pub value: f64,
    pub stderr: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutput {
    pub tables: Vec<(String, Table)>,
    pub fits: Vec<FitSummary>,
}
