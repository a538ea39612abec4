//! Core protocol types: the request/response pair of a single exchange, the
//! transport they write through, and the error types of the wire layer.
//!
//! - [`Request`]: built from tokenizer events, owns its [`Response`]
//! - [`Response`]: buffered status, headers and body
//! - [`Headers`] and [`FieldValue`]: header storage and value normalization
//! - [`Transport`]: the handle used to queue bytes on the connection
//!
//! A request is finished exactly once. Finishing it closes the transport,
//! after which the connection flushes whatever was queued and shuts down.

mod error;
pub use error::HeaderError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::StateError;

mod header;
pub use header::FieldValue;
pub use header::Headers;
pub use header::normalize_name;

mod request;
pub use request::Request;

mod response;
pub use response::Response;
pub use response::ResponseDefaults;

mod transport;
pub use transport::Outbound;
pub use transport::Transport;
pub use transport::TransportReceiver;
