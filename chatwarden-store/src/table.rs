// chatwarden-store/src/table.rs
//! Tabular blob codec.
//!
//! A blob is a tab-separated table: one header row naming the columns, then
//! one row per record. Column types are not written out — they are inferred
//! dynamically on decode, per column across the whole table: integer if every
//! cell parses as `i64`, boolean if every cell is `true`/`false`, otherwise
//! string. A header-only table is a valid, distinct state from a missing blob.
//!
//! License: MIT OR Apache-2.0

use thiserror::Error;

/// A single decoded table cell. The variant reflects the inferred type of the
/// whole column, so consumers should use the coercing accessors rather than
/// matching variants directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Integer value, coercing numeric text. A `Text` cell that happens to
    /// hold digits still counts; inference already collapsed all-numeric
    /// columns, but single cells are coerced for robustness.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Text(s) => s.parse().ok(),
            Cell::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(v) => Some(*v),
            Cell::Text(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Cell::Int(_) => None,
        }
    }

    /// String rendering of the cell, whatever the inferred type. Numeric user
    /// ids survive a round trip through an `Int`-inferred column this way.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Int(v) => v.to_string(),
            Cell::Bool(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

/// Decode/encode failures for a single blob.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("blob is missing its header row")]
    MissingHeader,

    #[error("header mismatch: expected columns {expected:?}, found {found:?}")]
    ColumnMismatch { expected: Vec<String>, found: Vec<String> },

    #[error("row {line} has {found} cells, expected {expected}")]
    RowArity { line: usize, expected: usize, found: usize },

    #[error("row {line}, column '{column}': expected {expected}")]
    CellType { line: usize, column: String, expected: &'static str },

    #[error("row {line} contains an invalid escape sequence")]
    BadEscape { line: usize },
}

/// A decoded table: column names plus rows of typed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Implemented by every record type the [`crate::RecordStore`] persists.
pub trait TableRecord: Clone + Send + Sync + 'static {
    /// Ordered column names. Stable across releases: the durable header is
    /// validated against this on every hydration.
    fn columns() -> &'static [&'static str];

    fn to_row(&self) -> Vec<Cell>;

    fn from_row(line: usize, row: &[Cell]) -> Result<Self, CodecError>;
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str, line: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            _ => return Err(CodecError::BadEscape { line }),
        }
    }
    Ok(out)
}

/// Encodes records of type `T` into the durable tabular form.
///
/// Encoding is deterministic: the same records always yield byte-identical
/// output, which is what makes repeated flushes of a clean cache idempotent.
pub fn encode_records<T: TableRecord>(records: &[T]) -> String {
    let mut out = String::new();
    out.push_str(&T::columns().join("\t"));
    out.push('\n');
    for record in records {
        let row = record.to_row();
        let rendered: Vec<String> = row.iter().map(|c| escape(&c.to_text())).collect();
        out.push_str(&rendered.join("\t"));
        out.push('\n');
    }
    out
}

/// Decodes a durable blob into records of type `T`, inferring column types
/// from the data first and validating the header against `T::columns()`.
pub fn decode_records<T: TableRecord>(blob: &str) -> Result<Vec<T>, CodecError> {
    let table = decode_table(blob)?;

    let expected: Vec<String> = T::columns().iter().map(|c| c.to_string()).collect();
    if table.columns != expected {
        return Err(CodecError::ColumnMismatch { expected, found: table.columns });
    }

    let mut records = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        // Header is line 1; data rows start at line 2.
        records.push(T::from_row(i + 2, row)?);
    }
    Ok(records)
}

/// Decodes a blob into an untyped [`Table`], running column-type inference.
pub fn decode_table(blob: &str) -> Result<Table, CodecError> {
    let mut lines = blob.lines();
    let header = lines.next().ok_or(CodecError::MissingHeader)?;
    if header.is_empty() {
        return Err(CodecError::MissingHeader);
    }
    let columns: Vec<String> = header.split('\t').map(|c| c.to_string()).collect();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.is_empty() {
            continue; // trailing newline
        }
        let line_no = i + 2;
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != columns.len() {
            return Err(CodecError::RowArity {
                line: line_no,
                expected: columns.len(),
                found: cells.len(),
            });
        }
        let mut row = Vec::with_capacity(cells.len());
        for cell in cells {
            row.push(unescape(cell, line_no)?);
        }
        raw_rows.push(row);
    }

    let types = infer_column_types(columns.len(), &raw_rows);
    let rows = raw_rows
        .into_iter()
        .map(|raw| {
            raw.into_iter()
                .zip(&types)
                .map(|(value, ty)| match ty {
                    ColumnType::Int => Cell::Int(value.parse().unwrap_or_default()),
                    ColumnType::Bool => Cell::Bool(value == "true"),
                    ColumnType::Text => Cell::Text(value),
                })
                .collect()
        })
        .collect();

    Ok(Table { columns, rows })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Int,
    Bool,
    Text,
}

fn infer_column_types(width: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    (0..width)
        .map(|col| {
            if rows.is_empty() {
                return ColumnType::Text;
            }
            if rows.iter().all(|r| r[col].parse::<i64>().is_ok()) {
                ColumnType::Int
            } else if rows.iter().all(|r| r[col] == "true" || r[col] == "false") {
                ColumnType::Bool
            } else {
                ColumnType::Text
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        name: String,
        count: i64,
        active: bool,
    }

    impl TableRecord for Sample {
        fn columns() -> &'static [&'static str] {
            &["name", "count", "active"]
        }

        fn to_row(&self) -> Vec<Cell> {
            vec![Cell::text(&self.name), Cell::Int(self.count), Cell::Bool(self.active)]
        }

        fn from_row(line: usize, row: &[Cell]) -> Result<Self, CodecError> {
            Ok(Sample {
                name: row[0].to_text(),
                count: row[1].as_int().ok_or(CodecError::CellType {
                    line,
                    column: "count".into(),
                    expected: "integer",
                })?,
                active: row[2].as_bool().ok_or(CodecError::CellType {
                    line,
                    column: "active".into(),
                    expected: "boolean",
                })?,
            })
        }
    }

    fn samples() -> Vec<Sample> {
        vec![
            Sample { name: "alpha".into(), count: 3, active: true },
            Sample { name: "beta\twith tab".into(), count: -9, active: false },
        ]
    }

    #[test]
    fn round_trips_records() {
        let encoded = encode_records(&samples());
        let decoded: Vec<Sample> = decode_records(&encoded).unwrap();
        assert_eq!(decoded, samples());
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(encode_records(&samples()), encode_records(&samples()));
    }

    #[test]
    fn empty_table_is_valid_and_distinct_from_missing() {
        let encoded = encode_records::<Sample>(&[]);
        assert_eq!(encoded, "name\tcount\tactive\n");
        let decoded: Vec<Sample> = decode_records(&encoded).unwrap();
        assert!(decoded.is_empty());
        // A genuinely missing blob has no header at all.
        assert!(matches!(decode_records::<Sample>(""), Err(CodecError::MissingHeader)));
    }

    #[test]
    fn infers_column_types_across_the_whole_column() {
        let table = decode_table("id\tnote\n17\tyes\n42\ttrue\n").unwrap();
        assert_eq!(table.rows[0][0], Cell::Int(17));
        // "yes" forces the note column to Text even though one cell is "true".
        assert_eq!(table.rows[1][1], Cell::Text("true".into()));
    }

    #[test]
    fn numeric_text_survives_int_inference() {
        // A user-id column of all-numeric snowflakes infers as Int; the
        // coercing accessor must render it back as the original string.
        let table = decode_table("user\n170915625722576896\n").unwrap();
        assert_eq!(table.rows[0][0].to_text(), "170915625722576896");
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(matches!(
            decode_records::<Sample>("name\tcount\tactive\nonly-one-cell\n"),
            Err(CodecError::RowArity { line: 2, .. })
        ));
        assert!(matches!(
            decode_records::<Sample>("wrong\theader\trow\n"),
            Err(CodecError::ColumnMismatch { .. })
        ));
        assert!(matches!(
            decode_table("a\nbad\\escape\\q\n"),
            Err(CodecError::BadEscape { line: 2 })
        ));
    }
}
