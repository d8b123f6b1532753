//! In-memory table produced from one staged file

use serde::Serialize;
use std::collections::HashSet;

/// Cell spellings read as missing values
pub const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

/// A parsed table, consumed once by the sink
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl TableBatch {
    /// Build a typed batch from header names and raw string rows
    ///
    /// Every row must already have `headers.len()` cells.
    pub fn from_raw(name: impl Into<String>, headers: Vec<String>, raw_rows: Vec<Vec<String>>) -> Self {
        let names = normalize_headers(headers);
        let types: Vec<ColumnType> = (0..names.len())
            .map(|idx| infer_column_type(raw_rows.iter().map(|row| row[idx].as_str())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(cell, column_type)| convert_cell(cell, *column_type))
                    .collect()
            })
            .collect();

        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, column_type)| Column { name, column_type })
            .collect();

        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn is_null(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Narrowest type every non-null cell fits: integer, float, boolean, text
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut integer = true;
    let mut float = true;
    let mut boolean = true;
    let mut seen = false;

    for cell in cells.filter(|c| !is_null(c)) {
        seen = true;
        integer = integer && cell.parse::<i64>().is_ok();
        float = float && cell.parse::<f64>().is_ok_and(f64::is_finite);
        boolean = boolean && parse_bool(cell).is_some();
        if !integer && !float && !boolean {
            return ColumnType::Text;
        }
    }

    match (seen, integer, float, boolean) {
        (false, ..) => ColumnType::Text,
        (true, true, _, _) => ColumnType::Integer,
        (true, _, true, _) => ColumnType::Float,
        (true, _, _, true) => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

fn convert_cell(cell: String, column_type: ColumnType) -> Value {
    if is_null(&cell) {
        return Value::Null;
    }
    // Inference guarantees the parse succeeds for typed columns.
    match column_type {
        ColumnType::Integer => cell.parse().map(Value::Integer).unwrap_or(Value::Text(cell)),
        ColumnType::Float => cell.parse().map(Value::Float).unwrap_or(Value::Text(cell)),
        ColumnType::Boolean => parse_bool(&cell).map(Value::Boolean).unwrap_or(Value::Text(cell)),
        ColumnType::Text => Value::Text(cell),
    }
}

/// Name empty headers `Unnamed: <idx>` and suffix repeats with `.1`, `.2`...
pub fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());

    for (idx, header) in headers.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            header
        };

        let mut candidate = base.clone();
        let mut counter = 1;
        while taken.contains(&candidate) {
            candidate = format!("{}.{}", base, counter);
            counter += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }

    out
}
