use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::types::error::DatabaseError;

/// Jet column types that can take part in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Byte,
    Int,
    Long,
    Money,
    Float,
    Double,
    DateTime,
    Binary,
    Text,
    Memo,
    Guid,
    Numeric,
    BigInt,
}

impl DataType {
    pub fn from_u8(value: u8) -> Result<Self, DatabaseError> {
        match value {
            0x01 => Ok(DataType::Boolean),
            0x02 => Ok(DataType::Byte),
            0x03 => Ok(DataType::Int),
            0x04 => Ok(DataType::Long),
            0x05 => Ok(DataType::Money),
            0x06 => Ok(DataType::Float),
            0x07 => Ok(DataType::Double),
            0x08 => Ok(DataType::DateTime),
            0x09 => Ok(DataType::Binary),
            0x0A => Ok(DataType::Text),
            0x0C => Ok(DataType::Memo),
            0x0F => Ok(DataType::Guid),
            0x10 => Ok(DataType::Numeric),
            0x13 => Ok(DataType::BigInt),
            _ => Err(DatabaseError::TypeMismatch {
                column: String::new(),
                expected: "indexable column type".to_string(),
                actual: format!("type code {:#04x}", value),
            }),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            DataType::Boolean => 0x01,
            DataType::Byte => 0x02,
            DataType::Int => 0x03,
            DataType::Long => 0x04,
            DataType::Money => 0x05,
            DataType::Float => 0x06,
            DataType::Double => 0x07,
            DataType::DateTime => 0x08,
            DataType::Binary => 0x09,
            DataType::Text => 0x0A,
            DataType::Memo => 0x0C,
            DataType::Guid => 0x0F,
            DataType::Numeric => 0x10,
            DataType::BigInt => 0x13,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::Text | DataType::Memo)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Byte => "BYTE",
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Money => "MONEY",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::DateTime => "SHORT_DATE_TIME",
            DataType::Binary => "BINARY",
            DataType::Text => "TEXT",
            DataType::Memo => "MEMO",
            DataType::Guid => "GUID",
            DataType::Numeric => "NUMERIC",
            DataType::BigInt => "BIG_INT",
        };
        f.write_str(name)
    }
}

/// A column value as handed over by the row layer.
///
/// `Money` holds the amount scaled by 10^4. `Numeric` holds an unscaled integer and
/// its scale. `Guid` holds the 16 bytes in textual (big-endian) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(u8),
    Int(i16),
    Long(i32),
    BigInt(i64),
    Money(i64),
    Float(f32),
    Double(f64),
    Numeric { unscaled: i128, scale: u8 },
    DateTime(NaiveDateTime),
    Text(String),
    Binary(Vec<u8>),
    Guid([u8; 16]),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Byte(_) => "BYTE",
            Value::Int(_) => "INT",
            Value::Long(_) => "LONG",
            Value::BigInt(_) => "BIG_INT",
            Value::Money(_) => "MONEY",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Numeric { .. } => "NUMERIC",
            Value::DateTime(_) => "SHORT_DATE_TIME",
            Value::Text(_) => "TEXT",
            Value::Binary(_) => "BINARY",
            Value::Guid(_) => "GUID",
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Widens any integral value; `None` for other kinds.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Parses `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}` (braces optional).
    pub fn guid_from_str(text: &str) -> Result<Self, DatabaseError> {
        let hex: String = text
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .chars()
            .filter(|c| *c != '-')
            .collect();
        if hex.len() != 32 {
            return Err(DatabaseError::TypeMismatch {
                column: String::new(),
                expected: "GUID".to_string(),
                actual: text.to_string(),
            });
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                DatabaseError::TypeMismatch {
                    column: String::new(),
                    expected: "GUID".to_string(),
                    actual: text.to_string(),
                }
            })?;
        }
        Ok(Value::Guid(bytes))
    }
}

/// Converts the mixed-endian GUID layout used in data rows to textual byte order.
pub fn guid_from_stored(stored: [u8; 16]) -> [u8; 16] {
    let mut out = stored;
    out[0..4].reverse();
    out[4..6].reverse();
    out[6..8].reverse();
    out
}

/// Inverse of [`guid_from_stored`].
pub fn guid_to_stored(canonical: [u8; 16]) -> [u8; 16] {
    guid_from_stored(canonical)
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn jet_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Jet stores dates as fractional days since 1899-12-30.
pub fn date_to_jet_days(value: &NaiveDateTime) -> f64 {
    let millis = (*value - jet_epoch()).num_milliseconds();
    millis as f64 / MILLIS_PER_DAY
}

pub fn jet_days_to_date(days: f64) -> Result<NaiveDateTime, DatabaseError> {
    if !days.is_finite() {
        return Err(DatabaseError::decode(format!("invalid date value {}", days)));
    }
    let millis = (days * MILLIS_PER_DAY).round() as i64;
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| jet_epoch().checked_add_signed(delta))
        .ok_or_else(|| DatabaseError::decode(format!("date out of range: {}", days)))
}
