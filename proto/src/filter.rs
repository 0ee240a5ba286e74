//! Row filters in the realtime service's `column=op.value` syntax.
//!
//! The filter string travels to the backend verbatim; the parsed form is used by
//! in-process feeds to decide which changes a channel should see.

use serde_json::{Map, Value};
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::error::FilterParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = FilterParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "in" => FilterOp::In,
            other => return Err(FilterParseError::UnknownOperator(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

impl RowFilter {
    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        let (column, rest) = input.split_once('=').ok_or_else(|| FilterParseError::MissingEquals(input.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(FilterParseError::EmptyColumn);
        }
        let (op, value) = rest.split_once('.').ok_or_else(|| FilterParseError::MissingOperator(input.to_string()))?;
        let op: FilterOp = op.parse()?;

        let values = match op {
            FilterOp::In => {
                let inner = value
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'))
                    .ok_or_else(|| FilterParseError::InvalidList(value.to_string()))?;
                inner.split(',').map(|v| v.trim().trim_matches('"').to_string()).filter(|v| !v.is_empty()).collect()
            }
            _ => vec![value.to_string()],
        };

        Ok(Self { column: column.to_string(), op, values })
    }

    /// Whether a row satisfies this filter. A row without the column never matches.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        let Some(value) = row.get(&self.column).and_then(scalar_text) else {
            return false;
        };
        let Some(first) = self.values.first() else {
            return false;
        };
        match self.op {
            FilterOp::Eq => value == *first,
            FilterOp::Neq => value != *first,
            FilterOp::In => self.values.iter().any(|v| *v == value),
            FilterOp::Lt => compare(&value, first) == Ordering::Less,
            FilterOp::Lte => compare(&value, first) != Ordering::Greater,
            FilterOp::Gt => compare(&value, first) == Ordering::Greater,
            FilterOp::Gte => compare(&value, first) != Ordering::Less,
        }
    }
}

impl FromStr for RowFilter {
    type Err = FilterParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            FilterOp::In => write!(f, "{}=in.({})", self.column, self.values.join(",")),
            op => write!(f, "{}={}.{}", self.column, op.as_str(), self.values.first().map(String::as_str).unwrap_or_default()),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// numeric when both sides parse, lexicographic otherwise
fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}
