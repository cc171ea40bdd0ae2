use serde::{Deserialize, Serialize};

use crate::{
    index::{
        char_table::CharTable,
        text::{decode_text, encode_text},
    },
    types::{
        ColumnNumber,
        error::DatabaseError,
        value::{DataType, Value, date_to_jet_days, jet_days_to_date},
    },
};

pub const ASCENDING_START_FLAG: u8 = 0x7F;
pub const ASCENDING_NULL_FLAG: u8 = 0x00;
pub const DESCENDING_START_FLAG: u8 = !ASCENDING_START_FLAG;
pub const DESCENDING_NULL_FLAG: u8 = !ASCENDING_NULL_FLAG;

const BOOLEAN_TRUE: u8 = 0x00;
const BOOLEAN_FALSE: u8 = 0xFF;

const BINARY_CHUNK_LENGTH: usize = 8;
const BINARY_MORE_FOLLOWS: u8 = 0x09;

const NUMERIC_LENGTH: usize = 16;
const MAX_NUMERIC_SCALE: u8 = 28;

/// One column of an index: which table column it reads and how it sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column_number: ColumnNumber,
    pub name: String,
    pub data_type: DataType,
    pub ascending: bool,
    /// Digits after the decimal point; only used by `Numeric` columns.
    pub scale: u8,
}

impl ColumnSpec {
    pub fn new(column_number: ColumnNumber, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            column_number,
            name: name.into(),
            data_type,
            ascending: true,
            scale: 0,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = scale;
        self
    }

    /// Boolean columns always produce a value byte, so they never count as null.
    pub fn is_null(&self, value: &Value) -> bool {
        value.is_null() && self.data_type != DataType::Boolean
    }

    fn mismatch(&self, value: &Value) -> DatabaseError {
        DatabaseError::TypeMismatch {
            column: self.name.clone(),
            expected: self.data_type.to_string(),
            actual: value.type_name().to_string(),
        }
    }

    fn overflow(&self, value: &Value) -> DatabaseError {
        DatabaseError::TypeMismatch {
            column: self.name.clone(),
            expected: self.data_type.to_string(),
            actual: format!("out of range {:?}", value),
        }
    }

    fn integral(&self, value: &Value, min: i64, max: i64) -> Result<i64, DatabaseError> {
        let widened = value.as_i64().ok_or_else(|| self.mismatch(value))?;
        if widened < min || widened > max {
            return Err(self.overflow(value));
        }
        Ok(widened)
    }

    /// Appends this column's contribution to an index key.
    pub fn encode(
        &self,
        value: &Value,
        table: &CharTable,
        out: &mut Vec<u8>,
    ) -> Result<(), DatabaseError> {
        let start = out.len();
        self.encode_ascending(value, table, out)?;
        if !self.ascending {
            for byte in &mut out[start..] {
                *byte = !*byte;
            }
        }
        Ok(())
    }

    fn encode_ascending(
        &self,
        value: &Value,
        table: &CharTable,
        out: &mut Vec<u8>,
    ) -> Result<(), DatabaseError> {
        if self.data_type == DataType::Boolean {
            let flag = match value {
                Value::Boolean(true) => BOOLEAN_TRUE,
                Value::Boolean(false) | Value::Null => BOOLEAN_FALSE,
                other => return Err(self.mismatch(other)),
            };
            out.push(flag);
            return Ok(());
        }

        if value.is_null() {
            out.push(ASCENDING_NULL_FLAG);
            return Ok(());
        }
        out.push(ASCENDING_START_FLAG);

        match self.data_type {
            DataType::Byte => {
                out.push(self.integral(value, 0, u8::MAX as i64)? as u8);
            }
            DataType::Int => {
                let v = self.integral(value, i16::MIN as i64, i16::MAX as i64)? as i16;
                out.extend_from_slice(&flip_sign(&v.to_be_bytes()));
            }
            DataType::Long => {
                let v = self.integral(value, i32::MIN as i64, i32::MAX as i64)? as i32;
                out.extend_from_slice(&flip_sign(&v.to_be_bytes()));
            }
            DataType::BigInt => {
                let v = self.integral(value, i64::MIN, i64::MAX)?;
                out.extend_from_slice(&flip_sign(&v.to_be_bytes()));
            }
            DataType::Money => {
                let v = match value {
                    Value::Money(v) => *v,
                    other => other
                        .as_i64()
                        .and_then(|v| v.checked_mul(10_000))
                        .ok_or_else(|| self.mismatch(other))?,
                };
                out.extend_from_slice(&flip_sign(&v.to_be_bytes()));
            }
            DataType::Float => {
                let v = match value {
                    Value::Float(v) => *v,
                    other => return Err(self.mismatch(other)),
                };
                out.extend_from_slice(&encode_floating(&v.to_be_bytes(), v.is_sign_negative()));
            }
            DataType::Double => {
                let v = match value {
                    Value::Double(v) => *v,
                    Value::Float(v) => *v as f64,
                    other => return Err(self.mismatch(other)),
                };
                out.extend_from_slice(&encode_floating(&v.to_be_bytes(), v.is_sign_negative()));
            }
            DataType::DateTime => {
                let days = match value {
                    Value::DateTime(v) => date_to_jet_days(v),
                    other => return Err(self.mismatch(other)),
                };
                out.extend_from_slice(&encode_floating(
                    &days.to_be_bytes(),
                    days.is_sign_negative(),
                ));
            }
            DataType::Numeric => {
                let unscaled = self.rescale(value)?;
                out.extend_from_slice(&flip_sign(&unscaled.to_be_bytes()));
            }
            DataType::Text | DataType::Memo => match value {
                Value::Text(text) => encode_text(text, table, out),
                other => return Err(self.mismatch(other)),
            },
            DataType::Binary => match value {
                Value::Binary(bytes) => encode_chunked(bytes, out),
                other => return Err(self.mismatch(other)),
            },
            DataType::Guid => match value {
                Value::Guid(bytes) => encode_chunked(bytes, out),
                other => return Err(self.mismatch(other)),
            },
            DataType::Boolean => unreachable!("handled above"),
        }
        Ok(())
    }

    fn rescale(&self, value: &Value) -> Result<i128, DatabaseError> {
        if self.scale > MAX_NUMERIC_SCALE {
            return Err(self.overflow(value));
        }
        let (unscaled, scale) = match value {
            Value::Numeric { unscaled, scale } => (*unscaled, *scale),
            other => (
                other.as_i64().ok_or_else(|| self.mismatch(other))? as i128,
                0,
            ),
        };
        if scale > MAX_NUMERIC_SCALE {
            return Err(self.overflow(value));
        }
        if scale <= self.scale {
            10i128
                .checked_pow((self.scale - scale) as u32)
                .and_then(|factor| unscaled.checked_mul(factor))
                .ok_or_else(|| self.overflow(value))
        } else {
            // extra digits are truncated toward zero
            Ok(unscaled / 10i128.pow((scale - self.scale) as u32))
        }
    }

    /// Reads this column's contribution back; returns the value and the bytes consumed.
    pub fn decode(&self, bytes: &[u8], table: &CharTable) -> Result<(Value, usize), DatabaseError> {
        if self.ascending {
            self.decode_ascending(bytes, table)
        } else {
            let inverted: Vec<u8> = bytes.iter().map(|byte| !byte).collect();
            self.decode_ascending(&inverted, table)
        }
    }

    fn decode_ascending(
        &self,
        bytes: &[u8],
        table: &CharTable,
    ) -> Result<(Value, usize), DatabaseError> {
        let flag = *bytes
            .first()
            .ok_or_else(|| DatabaseError::decode(format!("no bytes left for column {}", self.name)))?;

        if self.data_type == DataType::Boolean {
            return match flag {
                BOOLEAN_TRUE => Ok((Value::Boolean(true), 1)),
                BOOLEAN_FALSE => Ok((Value::Boolean(false), 1)),
                other => Err(DatabaseError::decode(format!(
                    "invalid boolean flag {:#04x} in column {}",
                    other, self.name
                ))),
            };
        }
        match flag {
            ASCENDING_NULL_FLAG => return Ok((Value::Null, 1)),
            ASCENDING_START_FLAG => {}
            other => {
                return Err(DatabaseError::decode(format!(
                    "invalid start flag {:#04x} in column {}",
                    other, self.name
                )));
            }
        }

        let body = &bytes[1..];
        let (value, consumed) = match self.data_type {
            DataType::Byte => (Value::Byte(take::<1>(body)?[0]), 1),
            DataType::Int => (Value::Int(i16::from_be_bytes(unflip(take::<2>(body)?))), 2),
            DataType::Long => (Value::Long(i32::from_be_bytes(unflip(take::<4>(body)?))), 4),
            DataType::BigInt => (Value::BigInt(i64::from_be_bytes(unflip(take::<8>(body)?))), 8),
            DataType::Money => (Value::Money(i64::from_be_bytes(unflip(take::<8>(body)?))), 8),
            DataType::Float => (
                Value::Float(f32::from_be_bytes(decode_floating(take::<4>(body)?))),
                4,
            ),
            DataType::Double => (
                Value::Double(f64::from_be_bytes(decode_floating(take::<8>(body)?))),
                8,
            ),
            DataType::DateTime => {
                let days = f64::from_be_bytes(decode_floating(take::<8>(body)?));
                (Value::DateTime(jet_days_to_date(days)?), 8)
            }
            DataType::Numeric => (
                Value::Numeric {
                    unscaled: i128::from_be_bytes(unflip(take::<NUMERIC_LENGTH>(body)?)),
                    scale: self.scale,
                },
                NUMERIC_LENGTH,
            ),
            DataType::Text | DataType::Memo => {
                let (text, consumed) = decode_text(body, table)?;
                (Value::Text(text), consumed)
            }
            DataType::Binary => {
                let (bytes, consumed) = decode_chunked(body)?;
                (Value::Binary(bytes), consumed)
            }
            DataType::Guid => {
                let (bytes, consumed) = decode_chunked(body)?;
                let guid: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| DatabaseError::decode("GUID key is not 16 bytes"))?;
                (Value::Guid(guid), consumed)
            }
            DataType::Boolean => unreachable!("handled above"),
        };
        Ok((value, consumed + 1))
    }
}

fn flip_sign<const N: usize>(bytes: &[u8; N]) -> [u8; N] {
    let mut out = *bytes;
    out[0] ^= 0x80;
    out
}

fn unflip<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    flip_sign(&bytes)
}

/// Negative floating values are fully inverted so that larger magnitudes sort first.
fn encode_floating<const N: usize>(bytes: &[u8; N], negative: bool) -> [u8; N] {
    if negative {
        bytes.map(|byte| !byte)
    } else {
        flip_sign(bytes)
    }
}

fn decode_floating<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    if bytes[0] & 0x80 == 0 {
        bytes.map(|byte| !byte)
    } else {
        flip_sign(&bytes)
    }
}

fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], DatabaseError> {
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            DatabaseError::decode(format!("expected {} value bytes, got {}", N, bytes.len()))
        })
}

/// Zero-padded 8-byte chunks, each followed by `0x09` when more data follows or by the
/// length of the final chunk.
fn encode_chunked(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.is_empty() {
        out.extend_from_slice(&[0u8; BINARY_CHUNK_LENGTH]);
        out.push(0);
        return;
    }
    let mut chunks = bytes.chunks(BINARY_CHUNK_LENGTH).peekable();
    while let Some(chunk) = chunks.next() {
        out.extend_from_slice(chunk);
        out.extend(std::iter::repeat_n(0u8, BINARY_CHUNK_LENGTH - chunk.len()));
        if chunks.peek().is_some() {
            out.push(BINARY_MORE_FOLLOWS);
        } else {
            out.push(chunk.len() as u8);
        }
    }
}

fn decode_chunked(bytes: &[u8]) -> Result<(Vec<u8>, usize), DatabaseError> {
    let mut out = Vec::new();
    let mut position = 0;
    loop {
        let chunk = bytes
            .get(position..position + BINARY_CHUNK_LENGTH + 1)
            .ok_or_else(|| DatabaseError::decode("binary key ends inside a chunk"))?;
        position += BINARY_CHUNK_LENGTH + 1;
        match chunk[BINARY_CHUNK_LENGTH] {
            BINARY_MORE_FOLLOWS => out.extend_from_slice(&chunk[..BINARY_CHUNK_LENGTH]),
            length if (length as usize) <= BINARY_CHUNK_LENGTH => {
                out.extend_from_slice(&chunk[..length as usize]);
                return Ok((out, position));
            }
            other => {
                return Err(DatabaseError::decode(format!(
                    "invalid binary chunk marker {:#04x}",
                    other
                )));
            }
        }
    }
}
