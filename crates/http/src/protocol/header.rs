//! Header field normalization.
//!
//! Field names are canonicalized by capitalizing every hyphen separated
//! segment (`content-type` becomes `Content-Type`), and field values are
//! rendered to their wire form:
//!
//! - text passes through
//! - raw bytes are decoded as Latin-1
//! - integers are stringified
//! - timestamps are rendered in RFC 2822 format
//!
//! Values carrying control characters (`0x00..=0x1F`) are rejected.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::protocol::HeaderError;

/// A header value before it is rendered for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Bytes(Bytes),
    Int(i64),
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// Returns the value if it is held as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value to its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::UnsafeValue`] if the rendered value contains a
    /// control character.
    pub fn normalize(&self) -> Result<Cow<'_, str>, HeaderError> {
        let value = match self {
            FieldValue::Str(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Bytes(b) => Cow::Owned(b.iter().map(|&byte| char::from(byte)).collect()),
            FieldValue::Int(i) => Cow::Owned(i.to_string()),
            FieldValue::Date(d) => Cow::Owned(d.to_rfc2822()),
        };
        if value.chars().any(|c| c < '\u{20}') {
            return Err(HeaderError::UnsafeValue { value: value.into_owned() });
        }
        Ok(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalize() {
            Ok(value) => f.write_str(&value),
            Err(_) => f.write_str("<unsafe>"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        FieldValue::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

/// Canonicalizes a header field name, `x-forwarded-for` becomes `X-Forwarded-For`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for (i, part) in name.split('-').enumerate() {
        if i > 0 {
            normalized.push('-');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            normalized.extend(first.to_uppercase());
            normalized.extend(chars.flat_map(char::to_lowercase));
        }
    }
    normalized
}

/// An ordered header mapping with canonicalized names.
///
/// Inserting a name that is already present replaces the value in place, so
/// the position of the first insertion is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, FieldValue)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        let name = normalize_name(name);
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let name = normalize_name(name);
        self.entries.iter().find(|(key, _)| *key == name).map(|(_, value)| value)
    }

    /// Returns the value of a text header.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let name = normalize_name(name);
        let position = self.entries.iter().position(|(key, _)| *key == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Keeps the headers for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FieldValue) -> bool) {
        self.entries.retain(|(name, value)| keep(name, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every header as `Name: value\r\n` into `dst`.
    ///
    /// Nothing is written if any header fails to normalize.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), HeaderError> {
        let mut rendered = Vec::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(HeaderError::InvalidName { name: name.clone() });
            }
            rendered.push((name, value.normalize()?));
        }

        for (name, value) in rendered {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Ok(())
    }
}
