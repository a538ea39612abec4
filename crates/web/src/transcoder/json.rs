use bytes::Bytes;

use crate::Value;
use crate::transcoder::{Charset, TranscodeError, Transcoder};
use crate::value::Target;

/// Compact JSON, UTF-8 encoded. Byte strings are written as base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    pub const MIME_TYPE: &'static str = "application/json";
}

impl Transcoder for Json {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let body = serde_json::to_vec(&value.normalize(Target::Text))
            .map_err(|e| TranscodeError::Encode { transcoder: "json", reason: e.to_string() })?;
        Ok((Charset::Utf8.content_type(Self::MIME_TYPE), Bytes::from(body)))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        serde_json::from_slice::<serde_json::Value>(data)
            .map(Value::from)
            .map_err(|e| TranscodeError::Decode { transcoder: "json", reason: e.to_string() })
    }
}
