use bytes::Bytes;

use crate::Value;
use crate::transcoder::{CAPABILITIES, TranscodeError, Transcoder};

/// YAML documents, UTF-8 encoded. Requires the `yaml` feature.
#[derive(Debug, Clone, Copy)]
pub struct Yaml {
    _private: (),
}

impl Yaml {
    pub const MIME_TYPE: &'static str = "text/x-yaml";

    /// # Errors
    ///
    /// Fails with [`TranscodeError::Unavailable`] when the `yaml` feature is
    /// disabled.
    pub fn new() -> Result<Self, TranscodeError> {
        if !CAPABILITIES.yaml {
            return Err(TranscodeError::Unavailable { codec: "yaml" });
        }
        Ok(Self { _private: () })
    }
}

#[cfg(feature = "yaml")]
impl Transcoder for Yaml {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let body = serde_yaml::to_string(&value.normalize(crate::value::Target::Text))
            .map_err(|e| TranscodeError::Encode { transcoder: "yaml", reason: e.to_string() })?;
        Ok((super::Charset::Utf8.content_type(Self::MIME_TYPE), Bytes::from(body)))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        serde_yaml::from_slice::<serde_json::Value>(data)
            .map(Value::from)
            .map_err(|e| TranscodeError::Decode { transcoder: "yaml", reason: e.to_string() })
    }
}

#[cfg(not(feature = "yaml"))]
impl Transcoder for Yaml {
    fn encode(&self, _value: &Value) -> Result<(String, Bytes), TranscodeError> {
        Err(TranscodeError::Unavailable { codec: "yaml" })
    }

    fn decode(&self, _data: &[u8]) -> Result<Value, TranscodeError> {
        Err(TranscodeError::Unavailable { codec: "yaml" })
    }
}

#[cfg(all(test, feature = "yaml"))]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode() {
        let transcoder = Yaml::new().unwrap();
        let value: Value = [("foo", Value::from("bar")), ("list", Value::array([1_i64, 2]))].into_iter().collect();

        let (content_type, body) = transcoder.encode(&value).unwrap();
        assert_eq!(content_type, "text/x-yaml; charset=\"UTF-8\"");
        assert_eq!(std::str::from_utf8(&body).unwrap(), "foo: bar\nlist:\n- 1\n- 2\n");
        assert_eq!(transcoder.decode(&body).unwrap(), value);
    }
}
