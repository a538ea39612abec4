//! Codecs between request/response bytes and [`Value`]s, keyed by MIME type.
//!
//! Every transcoder is stateless and shared by all requests. The
//! [`Transcoders`] registry holds them in registration order, which is also
//! the tie-break order during content negotiation.
//!
//! | MIME type                           | Transcoder          |
//! |-------------------------------------|---------------------|
//! | `text/html`, `text/plain`           | [`Text`]            |
//! | `application/octet-stream`          | [`Binary`]          |
//! | `application/x-www-form-urlencoded` | [`FormUrlEncoded`]  |
//! | `application/json`                  | [`Json`]            |
//! | `application/msgpack`               | [`MessagePack`]     |
//! | `text/x-yaml`                       | [`Yaml`]            |
//!
//! MessagePack and YAML are only registered when their cargo features are
//! enabled; see [`CAPABILITIES`].

mod binary;
mod form;
mod json;
mod msgpack;
mod registry;
mod text;
mod yaml;

pub use binary::Binary;
pub use form::FormUrlEncoded;
pub use json::Json;
pub use msgpack::MessagePack;
pub use registry::Transcoders;
pub use text::{Charset, Text};
pub use yaml::Yaml;

use bytes::Bytes;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::Value;

/// Optional codecs available in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub msgpack: bool,
    pub yaml: bool,
}

/// Resolved once, on first use.
pub static CAPABILITIES: Lazy<Capabilities> =
    Lazy::new(|| Capabilities { msgpack: cfg!(feature = "msgpack"), yaml: cfg!(feature = "yaml") });

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("{kind} is not supported by the {transcoder} transcoder")]
    Unsupported { transcoder: &'static str, kind: &'static str },

    #[error("{codec} support is not available in this build")]
    Unavailable { codec: &'static str },

    #[error("can't represent the value in {charset}")]
    Unrepresentable { charset: Charset },

    #[error("failed to encode {transcoder}: {reason}")]
    Encode { transcoder: &'static str, reason: String },

    #[error("failed to decode {transcoder}: {reason}")]
    Decode { transcoder: &'static str, reason: String },

    #[error(transparent)]
    MsgpackEncode(#[from] crate::msgpack::EncodeError),

    #[error(transparent)]
    MsgpackDecode(#[from] crate::msgpack::DecodeError),
}

/// A codec bound to one MIME type.
#[cfg_attr(test, mockall::automock)]
pub trait Transcoder: Send + Sync {
    /// Encodes a value, returning the `Content-Type` to send with it.
    ///
    /// # Errors
    ///
    /// Fails if the value has no representation in this format.
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError>;

    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not valid for this format.
    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError>;
}
