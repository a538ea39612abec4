use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::Value;
use crate::msgpack::marker::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{kind} of length {len} exceeds the msgpack limit")]
    TooLarge { kind: &'static str, len: usize },
}

/// Packs a value into its MessagePack representation.
///
/// UUIDs and date/times are written as strings, sets as arrays.
///
/// # Errors
///
/// Fails with [`EncodeError::TooLarge`] if a string, binary payload or
/// container holds more than `u32::MAX` elements.
pub fn pack(value: &Value) -> Result<Bytes, EncodeError> {
    let mut encoder = Encoder { dst: BytesMut::new() };
    encoder.encode(value)?;
    Ok(encoder.dst.freeze())
}

struct Encoder {
    dst: BytesMut,
}

impl Encoder {
    fn encode(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => self.dst.put_u8(NIL),
            Value::Bool(false) => self.dst.put_u8(FALSE),
            Value::Bool(true) => self.dst.put_u8(TRUE),
            Value::Int(i) => self.encode_int(*i),
            Value::UInt(u) => self.encode_uint(*u),
            Value::Float(f) => {
                self.dst.put_u8(FLOAT64);
                self.dst.put_f64(*f);
            }
            Value::Str(s) => self.encode_str(s)?,
            Value::Bytes(b) => self.encode_bin(b)?,
            Value::Array(items) | Value::Set(items) => {
                self.encode_len(items.len(), "array", FIXARRAY, 16, ARRAY16, ARRAY32)?;
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(map) => {
                self.encode_len(map.len(), "map", FIXMAP, 16, MAP16, MAP32)?;
                for (key, value) in map {
                    self.encode_str(key)?;
                    self.encode(value)?;
                }
            }
            Value::Uuid(_) | Value::DateTime(_) | Value::NaiveDateTime(_) | Value::Date(_) => {
                self.encode_str(&value.temporal_string().unwrap_or_default())?;
            }
        }
        Ok(())
    }

    fn encode_int(&mut self, value: i64) {
        if value >= 0 {
            self.encode_uint(value.unsigned_abs());
            return;
        }

        if value >= -32 {
            // negative fixint, the low five bits of the two's complement
            self.dst.put_u8(NEGATIVE_FIXINT | (value as u8 & 0x1F));
        } else if let Ok(v) = i8::try_from(value) {
            self.dst.put_u8(INT8);
            self.dst.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.dst.put_u8(INT16);
            self.dst.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.dst.put_u8(INT32);
            self.dst.put_i32(v);
        } else {
            self.dst.put_u8(INT64);
            self.dst.put_i64(value);
        }
    }

    fn encode_uint(&mut self, value: u64) {
        if value < 128 {
            self.dst.put_u8(value as u8);
        } else if let Ok(v) = u8::try_from(value) {
            self.dst.put_u8(UINT8);
            self.dst.put_u8(v);
        } else if let Ok(v) = u16::try_from(value) {
            self.dst.put_u8(UINT16);
            self.dst.put_u16(v);
        } else if let Ok(v) = u32::try_from(value) {
            self.dst.put_u8(UINT32);
            self.dst.put_u32(v);
        } else {
            self.dst.put_u8(UINT64);
            self.dst.put_u64(value);
        }
    }

    fn encode_str(&mut self, value: &str) -> Result<(), EncodeError> {
        let len = value.len();
        if len < 32 {
            self.dst.put_u8(FIXSTR | len as u8);
        } else if let Ok(len) = u8::try_from(len) {
            self.dst.put_u8(STR8);
            self.dst.put_u8(len);
        } else if let Ok(len) = u16::try_from(len) {
            self.dst.put_u8(STR16);
            self.dst.put_u16(len);
        } else if let Ok(len) = u32::try_from(len) {
            self.dst.put_u8(STR32);
            self.dst.put_u32(len);
        } else {
            return Err(EncodeError::TooLarge { kind: "str", len });
        }
        self.dst.put_slice(value.as_bytes());
        Ok(())
    }

    fn encode_bin(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        let len = value.len();
        if let Ok(len) = u8::try_from(len) {
            self.dst.put_u8(BIN8);
            self.dst.put_u8(len);
        } else if let Ok(len) = u16::try_from(len) {
            self.dst.put_u8(BIN16);
            self.dst.put_u16(len);
        } else if let Ok(len) = u32::try_from(len) {
            self.dst.put_u8(BIN32);
            self.dst.put_u32(len);
        } else {
            return Err(EncodeError::TooLarge { kind: "bin", len });
        }
        self.dst.put_slice(value);
        Ok(())
    }

    fn encode_len(
        &mut self,
        len: usize,
        kind: &'static str,
        fix_marker: u8,
        fix_limit: usize,
        marker16: u8,
        marker32: u8,
    ) -> Result<(), EncodeError> {
        if len < fix_limit {
            self.dst.put_u8(fix_marker | len as u8);
        } else if let Ok(len) = u16::try_from(len) {
            self.dst.put_u8(marker16);
            self.dst.put_u16(len);
        } else if let Ok(len) = u32::try_from(len) {
            self.dst.put_u8(marker32);
            self.dst.put_u32(len);
        } else {
            return Err(EncodeError::TooLarge { kind, len });
        }
        Ok(())
    }
}
