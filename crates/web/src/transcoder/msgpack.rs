use bytes::Bytes;

use crate::transcoder::{CAPABILITIES, TranscodeError, Transcoder};
use crate::value::Target;
use crate::{Value, msgpack};

/// MessagePack bodies via the crate's own [`msgpack`] codec.
#[derive(Debug, Clone, Copy)]
pub struct MessagePack {
    _private: (),
}

impl MessagePack {
    pub const MIME_TYPE: &'static str = "application/msgpack";

    /// # Errors
    ///
    /// Fails with [`TranscodeError::Unavailable`] when the `msgpack` feature
    /// is disabled.
    pub fn new() -> Result<Self, TranscodeError> {
        if !CAPABILITIES.msgpack {
            return Err(TranscodeError::Unavailable { codec: "msgpack" });
        }
        Ok(Self { _private: () })
    }
}

impl Transcoder for MessagePack {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let body = msgpack::pack(&value.normalize(Target::Binary))?;
        Ok((Self::MIME_TYPE.to_string(), body))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        Ok(msgpack::unpack(data)?)
    }
}

#[cfg(all(test, feature = "msgpack"))]
mod tests {
    use super::*;

    #[test]
    fn bytes_stay_binary() {
        let transcoder = MessagePack::new().unwrap();
        let value: Value = [("raw", Value::bytes(&b"\x01\x02"[..]))].into_iter().collect();

        let (content_type, body) = transcoder.encode(&value).unwrap();
        assert_eq!(content_type, "application/msgpack");
        assert_eq!(&body[..], b"\x81\xa3raw\xc4\x02\x01\x02");
        assert_eq!(transcoder.decode(&body).unwrap(), value);
    }

    #[test]
    fn decode_errors_surface() {
        let transcoder = MessagePack::new().unwrap();
        assert!(matches!(transcoder.decode(&[0xC1]), Err(TranscodeError::MsgpackDecode(_))));
    }
}
