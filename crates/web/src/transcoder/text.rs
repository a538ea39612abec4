use std::fmt;

use bytes::Bytes;

use crate::Value;
use crate::transcoder::{TranscodeError, Transcoder};

/// Character encodings the text family can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1
    Latin1,
}

impl Charset {
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Formats a MIME type with an explicit charset parameter.
    pub fn content_type(self, mime_type: &str) -> String {
        format!("{mime_type}; charset=\"{}\"", self.name())
    }

    pub fn encode(self, text: &str) -> Result<Bytes, TranscodeError> {
        match self {
            Charset::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| TranscodeError::Unrepresentable { charset: self }))
                .collect::<Result<Vec<u8>, _>>()
                .map(Bytes::from),
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<String, TranscodeError> {
        match self {
            Charset::Utf8 => String::from_utf8(data.to_vec())
                .map_err(|e| TranscodeError::Decode { transcoder: "text", reason: e.to_string() }),
            Charset::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Plain text in a fixed charset.
///
/// Encodes strings, raw bytes (passed through), and scalars in their display
/// form. Containers have no plain text representation.
#[derive(Debug, Clone)]
pub struct Text {
    mime_type: String,
    charset: Charset,
}

impl Default for Text {
    fn default() -> Self {
        Self::new(Text::MIME_TYPE, Charset::Utf8)
    }
}

impl Text {
    pub const MIME_TYPE: &'static str = "text/plain";

    pub fn new(mime_type: impl Into<String>, charset: Charset) -> Self {
        Self { mime_type: mime_type.into(), charset }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }
}

impl Transcoder for Text {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let body = match value {
            Value::Bytes(bytes) => bytes.clone(),
            Value::Array(_) | Value::Set(_) | Value::Map(_) => {
                return Err(TranscodeError::Unsupported { transcoder: "text", kind: value.kind() });
            }
            other => self.charset.encode(&other.to_string())?,
        };
        Ok((self.charset.content_type(&self.mime_type), body))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        self.charset.decode(data).map(Value::Str)
    }
}
