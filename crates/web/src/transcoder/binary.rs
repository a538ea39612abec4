use bytes::Bytes;

use crate::Value;
use crate::transcoder::{TranscodeError, Transcoder};

/// Passes raw bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary;

impl Binary {
    pub const MIME_TYPE: &'static str = "application/octet-stream";
}

impl Transcoder for Binary {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let body = match value {
            Value::Bytes(bytes) => bytes.clone(),
            Value::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            other => return Err(TranscodeError::Unsupported { transcoder: "binary", kind: other.kind() }),
        };
        Ok((Self::MIME_TYPE.to_string(), body))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        Ok(Value::Bytes(Bytes::copy_from_slice(data)))
    }
}
