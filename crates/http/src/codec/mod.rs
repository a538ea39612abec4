//! Request tokenizing.
//!
//! The tokenizer is event driven: a [`RequestParser`] is fed whatever bytes
//! the connection read and reports the pieces of the request it recognized to
//! a [`ParserCallbacks`] sink, usually a [`Request`](crate::protocol::Request).
//!
//! Events are always delivered in this order:
//!
//! 1. [`on_url`](ParserCallbacks::on_url)
//! 2. [`on_header`](ParserCallbacks::on_header), once per header field
//! 3. [`on_headers_complete`](ParserCallbacks::on_headers_complete)
//! 4. [`on_body`](ParserCallbacks::on_body), zero or more times
//! 5. [`on_message_complete`](ParserCallbacks::on_message_complete)
//!
//! Any callback may reject an event by returning a [`ParseError`], which
//! aborts parsing of the request.

mod request_parser;

pub use request_parser::RequestParser;

use http::Version;

use crate::protocol::ParseError;

/// Receiver of tokenizer events.
pub trait ParserCallbacks {
    /// The raw request target, e.g. `/items?id=1`.
    fn on_url(&mut self, url: &[u8]) -> Result<(), ParseError>;

    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError>;

    /// All headers were delivered; carries the request method and version.
    fn on_headers_complete(&mut self, method: &[u8], version: Version) -> Result<(), ParseError>;

    fn on_body(&mut self, chunk: &[u8]) -> Result<(), ParseError>;

    fn on_message_complete(&mut self) -> Result<(), ParseError>;
}
