use crate::utils::{Result, TapError};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

/// Field name carrying `"<file>:<row>"` on every emitted record.
pub const REPLICATION_KEY: &str = "replication_key";

/// A typed CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Decimal(Decimal),
    /// Numbers `Decimal` cannot hold exactly: past 28 significant digits or
    /// outside its range.
    Float(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Integer, then decimal, then text. Empty text is `Null`.
    pub fn coerce(raw: &str) -> Self {
        if raw.is_empty() {
            return FieldValue::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return FieldValue::Integer(i);
        }
        if looks_numeric(raw) {
            if significant_digits(raw) <= MAX_DECIMAL_DIGITS {
                let parsed = Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw));
                if let Ok(d) = parsed {
                    return FieldValue::Decimal(d);
                }
            }
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return FieldValue::Float(f);
                }
            }
        }
        FieldValue::Text(raw.to_string())
    }
}

const MAX_DECIMAL_DIGITS: usize = 28;

// Keeps rust_decimal's lenient parser away from things like "1_000".
fn looks_numeric(raw: &str) -> bool {
    raw.bytes().any(|b| b.is_ascii_digit())
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

// Mantissa digits that carry value; rust_decimal rounds anything past 28.
fn significant_digits(raw: &str) -> usize {
    let mantissa = raw.split(['e', 'E']).next().unwrap_or(raw);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    let digits = if mantissa.contains('.') {
        digits.trim_end_matches('0')
    } else {
        digits
    };
    digits.len()
}

/// Ordered, duplicate-free column names. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Arc<[String]>,
}

impl ColumnSchema {
    /// Builds a schema from a configured header; duplicates are rejected.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(TapError::ConfigError(format!(
                    "duplicate column '{}' in header",
                    column
                )));
            }
        }
        Ok(Self {
            columns: columns.into(),
        })
    }

    /// Builds a schema from a header row found in a file. Repeated names
    /// get `_2`, `_3`, ... appended. Returns the renamed originals.
    pub fn from_header_row(row: Vec<String>) -> (Self, Vec<String>) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut renamed = Vec::new();
        let mut columns = Vec::with_capacity(row.len());

        for name in row {
            if seen.insert(name.clone()) {
                columns.push(name);
                continue;
            }
            let mut n = 2;
            let unique = loop {
                let candidate = format!("{}_{}", name, n);
                if !seen.contains(&candidate) {
                    break candidate;
                }
                n += 1;
            };
            seen.insert(unique.clone());
            renamed.push(name);
            columns.push(unique);
        }

        (
            Self {
                columns: columns.into(),
            },
            renamed,
        )
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::<String>::new().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Element-wise comparison against a raw row.
    pub fn matches_row(&self, row: &[String]) -> bool {
        self.columns.len() == row.len() && self.columns.iter().zip(row).all(|(c, r)| c == r)
    }
}

/// One typed row plus the position it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub file_name: Arc<str>,
    pub row_number: u64,
    pub columns: ColumnSchema,
    pub values: Vec<FieldValue>,
}

impl Record {
    /// Positional mapping; short rows are padded with `Null`, long rows truncated.
    pub fn from_tokens(
        file_name: Arc<str>,
        row_number: u64,
        columns: ColumnSchema,
        tokens: Vec<String>,
    ) -> Self {
        let width = columns.len();
        let mut values: Vec<FieldValue> = tokens
            .iter()
            .take(width)
            .map(|t| FieldValue::coerce(t))
            .collect();
        values.resize(width, FieldValue::Null);

        Self {
            file_name,
            row_number,
            columns,
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.position(column).map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn replication_key(&self) -> String {
        format_position(&self.file_name, self.row_number)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(REPLICATION_KEY, &self.replication_key())?;
        map.end()
    }
}

/// Zero-padded so lexicographic order of the rendered value follows row order.
pub fn format_position(file_name: &str, row_number: u64) -> String {
    format!("{}:{:09}", file_name, row_number)
}
