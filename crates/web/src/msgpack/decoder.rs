use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::Value;
use crate::msgpack::marker::*;

/// Nesting depth at which decoding gives up
const MAX_DEPTH: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input, needed {needed} more bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid marker 0x{marker:02X} at offset {offset}")]
    InvalidMarker { marker: u8, offset: usize },

    #[error("extension type 0x{marker:02X} at offset {offset} is not supported")]
    UnsupportedExtension { marker: u8, offset: usize },

    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("map key at offset {offset} is not a string")]
    NonStringKey { offset: usize },

    #[error("{remaining} trailing bytes after the value")]
    TrailingBytes { remaining: usize },

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Unpacks a buffer holding exactly one value.
///
/// # Errors
///
/// Fails if the buffer is malformed, truncated, or has bytes left over after
/// the value.
pub fn unpack(src: &[u8]) -> Result<Value, DecodeError> {
    let (value, consumed) = decode_one(src)?;
    if consumed != src.len() {
        return Err(DecodeError::TrailingBytes { remaining: src.len() - consumed });
    }
    Ok(value)
}

/// Decodes the first value in `src`, returning it with the number of bytes it
/// occupied.
///
/// # Errors
///
/// Fails on unknown or reserved markers, extension types, truncated input,
/// invalid UTF-8 in strings, and non-string map keys.
pub fn decode_one(src: &[u8]) -> Result<(Value, usize), DecodeError> {
    let mut decoder = Decoder { src, pos: 0 };
    let value = decoder.decode(0)?;
    Ok((value, decoder.pos))
}

struct Decoder<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn decode(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        let offset = self.pos;
        let marker = self.read_u8()?;
        let value = match marker {
            0x00..=0x7F => Value::Int(i64::from(marker)),
            0x80..=0x8F => self.decode_map(usize::from(marker & 0x0F), depth)?,
            0x90..=0x9F => self.decode_array(usize::from(marker & 0x0F), depth)?,
            0xA0..=0xBF => self.decode_str(usize::from(marker & 0x1F))?,
            NIL => Value::Null,
            FALSE => Value::Bool(false),
            TRUE => Value::Bool(true),
            BIN8 => {
                let len = self.read_len8()?;
                Value::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            BIN16 => {
                let len = self.read_len16()?;
                Value::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            BIN32 => {
                let len = self.read_len32()?;
                Value::Bytes(Bytes::copy_from_slice(self.take(len)?))
            }
            FLOAT32 => Value::Float(f64::from(f32::from_be_bytes(self.read_array()?))),
            FLOAT64 => Value::Float(f64::from_be_bytes(self.read_array()?)),
            UINT8 => Value::Int(i64::from(self.read_u8()?)),
            UINT16 => Value::Int(i64::from(u16::from_be_bytes(self.read_array()?))),
            UINT32 => Value::Int(i64::from(u32::from_be_bytes(self.read_array()?))),
            UINT64 => Value::from(u64::from_be_bytes(self.read_array()?)),
            INT8 => Value::Int(i64::from(i8::from_be_bytes(self.read_array()?))),
            INT16 => Value::Int(i64::from(i16::from_be_bytes(self.read_array()?))),
            INT32 => Value::Int(i64::from(i32::from_be_bytes(self.read_array()?))),
            INT64 => Value::Int(i64::from_be_bytes(self.read_array()?)),
            STR8 => {
                let len = self.read_len8()?;
                self.decode_str(len)?
            }
            STR16 => {
                let len = self.read_len16()?;
                self.decode_str(len)?
            }
            STR32 => {
                let len = self.read_len32()?;
                self.decode_str(len)?
            }
            ARRAY16 => {
                let len = self.read_len16()?;
                self.decode_array(len, depth)?
            }
            ARRAY32 => {
                let len = self.read_len32()?;
                self.decode_array(len, depth)?
            }
            MAP16 => {
                let len = self.read_len16()?;
                self.decode_map(len, depth)?
            }
            MAP32 => {
                let len = self.read_len32()?;
                self.decode_map(len, depth)?
            }
            EXT8 | EXT16 | EXT32 | FIXEXT1..=FIXEXT16 => {
                return Err(DecodeError::UnsupportedExtension { marker, offset });
            }
            NEVER_USED => return Err(DecodeError::InvalidMarker { marker, offset }),
            0xE0..=0xFF => Value::Int(i64::from(marker as i8)),
        };
        Ok(value)
    }

    fn decode_str(&mut self, len: usize) -> Result<Value, DecodeError> {
        let offset = self.pos;
        let raw = self.take(len)?;
        let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { offset })?;
        Ok(Value::Str(s.to_string()))
    }

    fn decode_array(&mut self, len: usize, depth: usize) -> Result<Value, DecodeError> {
        // every element takes at least one byte, don't trust the header beyond that
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.decode(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, len: usize, depth: usize) -> Result<Value, DecodeError> {
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let offset = self.pos;
            let Value::Str(key) = self.decode(depth + 1)? else {
                return Err(DecodeError::NonStringKey { offset });
            };
            let value = self.decode(depth + 1)?;
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof { offset: self.pos, needed: len - self.remaining() });
        }
        let slice = &self.src[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_len8(&mut self) -> Result<usize, DecodeError> {
        Ok(usize::from(self.read_u8()?))
    }

    fn read_len16(&mut self) -> Result<usize, DecodeError> {
        Ok(usize::from(u16::from_be_bytes(self.read_array()?)))
    }

    fn read_len32(&mut self) -> Result<usize, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?) as usize)
    }
}
