/// Multi-key ordering of composed records
///
/// Keys are applied in order; the first key that tells two records apart
/// decides. Records equal on every key keep their original relative order.
use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort entry as written in configuration: a bare field name or an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortParam {
    Name(String),
    Spec {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        reverse: bool,
        #[serde(default)]
        number: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub name: String,
    /// Compare values as parsed floats
    pub numeric: bool,
    pub reverse: bool,
}

impl SortKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            numeric: false,
            reverse: false,
        }
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let a = field(a, &self.name);
        let b = field(b, &self.name);

        let ordering = if self.numeric {
            compare_numeric(a, b)
        } else {
            compare_values(a, b)
        };

        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Turn configured sort entries into keys; an object entry without a name fails
pub fn sanitize_sort_params(params: &[SortParam]) -> Result<Vec<SortKey>, ValidationError> {
    params
        .iter()
        .enumerate()
        .map(|(index, param)| match param {
            SortParam::Name(name) => Ok(SortKey::new(name.clone())),
            SortParam::Spec {
                name,
                reverse,
                number,
            } => {
                let name = name
                    .clone()
                    .ok_or(ValidationError::MissingSortName { index })?;
                Ok(SortKey {
                    name,
                    numeric: *number,
                    reverse: *reverse,
                })
            }
        })
        .collect()
}

/// Stable sort of `records` by `keys`
pub fn sort_records(records: &mut [Value], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }

    records.sort_by(|a, b| {
        keys.iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|value| !value.is_null())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Relational comparison; missing and null values come first
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                compare_floats(a.as_f64(), b.as_f64())
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            // Mixed types order by type rank so the order stays total
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

/// Numeric comparison after parsing both sides as floats.
/// Values that do not parse sort after every number.
pub fn compare_numeric(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    compare_floats(a.and_then(parse_float), b.and_then(parse_float))
}

fn compare_floats(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Parse the longest leading decimal number, the way quote feeds send
/// values like "1.0843" or "12.5%"
pub fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_float(s.trim_start()),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|v| !v.is_nan())
}

fn parse_leading_float(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }

    let mut best = None;
    while end < bytes.len() {
        let c = bytes[end];
        match c {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
                best = Some(end);
            }
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                end += 1;
            }
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                end += 1;
                if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                    end += 1;
                }
            }
            _ => break,
        }
    }

    if let Some(best) = best {
        return text[..best].parse::<f64>().ok();
    }

    let rest = text.trim_start_matches(['+', '-']);
    if rest.starts_with("Infinity") {
        return Some(if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    None
}
