//! Incremental HTTP/1.1 request tokenizer.
//!
//! [`RequestParser`] is fed raw bytes as they arrive and reports what it finds
//! through [`ParserCallbacks`], always in the order
//! url, header*, headers-complete, body*, message-complete.
//!
//! Header parsing is delegated to `httparse`; the request head is buffered
//! until it is complete, and the body is delimited by `Content-Length`.
//! Chunked transfer encoding is not supported.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use std::cmp;

use bytes::BytesMut;
use http::Version;
use httparse::{Error, Status};
use tracing::trace;

use crate::codec::ParserCallbacks;
use crate::ensure;
use crate::protocol::ParseError;

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Body { remaining: u64 },
    Complete,
}

#[derive(Debug)]
pub struct RequestParser {
    state: State,
    buffer: BytesMut,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self { state: State::Head, buffer: BytesMut::new() }
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `on_message_complete` was delivered.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// True if no byte of a request was seen yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::Head && self.buffer.is_empty()
    }

    /// Feeds the next bytes read from the connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the request is malformed, exceeds the
    /// header limits, or a callback rejects an event.
    pub fn feed<C>(&mut self, data: &[u8], callbacks: &mut C) -> Result<(), ParseError>
    where
        C: ParserCallbacks + ?Sized,
    {
        match self.state {
            State::Head => {
                self.buffer.extend_from_slice(data);
                let Some(body_offset) = self.parse_head(callbacks)? else {
                    return Ok(());
                };
                let rest = self.buffer.split_off(body_offset);
                self.buffer.clear();
                self.feed_body(&rest, callbacks)
            }
            State::Body { .. } => self.feed_body(data, callbacks),
            State::Complete => {
                if !data.is_empty() {
                    trace!(size = data.len(), "ignoring bytes received after the message completed");
                }
                Ok(())
            }
        }
    }

    /// Parses the buffered head, returning the body offset once it is complete.
    fn parse_head<C>(&mut self, callbacks: &mut C) -> Result<Option<usize>, ParseError>
    where
        C: ParserCallbacks + ?Sized,
    {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(&self.buffer).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(
                    self.buffer.len() <= MAX_HEADER_BYTES,
                    ParseError::too_large_header(self.buffer.len(), MAX_HEADER_BYTES)
                );
                return Ok(None);
            }
        };
        trace!(header_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            // Currently HTTP/2 and HTTP/3 not supported
            v => return Err(ParseError::InvalidVersion(v)),
        };
        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let path = req.path.ok_or_else(|| ParseError::invalid_uri("missing request target"))?;

        callbacks.on_url(path.as_bytes())?;

        let mut content_length = None;
        for header in req.headers.iter() {
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = Some(parse_content_length(header.value)?);
            } else if header.name.eq_ignore_ascii_case("transfer-encoding") {
                return Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(header.value)));
            }
            callbacks.on_header(header.name.as_bytes(), header.value)?;
        }

        callbacks.on_headers_complete(method.as_bytes(), version)?;

        self.state = State::Body { remaining: content_length.unwrap_or(0) };
        Ok(Some(body_offset))
    }

    fn feed_body<C>(&mut self, data: &[u8], callbacks: &mut C) -> Result<(), ParseError>
    where
        C: ParserCallbacks + ?Sized,
    {
        let State::Body { remaining } = self.state else {
            return Ok(());
        };

        // Read the minimum of remaining length and available bytes
        let len = usize::try_from(cmp::min(remaining, data.len() as u64)).unwrap_or(data.len());
        if len > 0 {
            callbacks.on_body(&data[..len])?;
        }
        if len < data.len() {
            trace!(size = data.len() - len, "ignoring bytes past content-length");
        }

        let remaining = remaining - len as u64;
        if remaining == 0 {
            self.state = State::Complete;
            callbacks.on_message_complete()?;
        } else {
            self.state = State::Body { remaining };
        }
        Ok(())
    }
}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let cl_str = std::str::from_utf8(value).map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
    cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ParserCallbacks for Recorder {
        fn on_url(&mut self, url: &[u8]) -> Result<(), ParseError> {
            self.events.push(format!("url {}", String::from_utf8_lossy(url)));
            Ok(())
        }

        fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError> {
            self.events.push(format!("header {}={}", String::from_utf8_lossy(name), String::from_utf8_lossy(value)));
            Ok(())
        }

        fn on_headers_complete(&mut self, method: &[u8], version: Version) -> Result<(), ParseError> {
            self.events.push(format!("headers-complete {} {:?}", String::from_utf8_lossy(method), version));
            Ok(())
        }

        fn on_body(&mut self, chunk: &[u8]) -> Result<(), ParseError> {
            self.events.push(format!("body {}", String::from_utf8_lossy(chunk)));
            Ok(())
        }

        fn on_message_complete(&mut self) -> Result<(), ParseError> {
            self.events.push("complete".to_string());
            Ok(())
        }
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut parser = RequestParser::new();
        let mut recorder = Recorder::default();
        parser.feed(str.as_bytes(), &mut recorder).unwrap();

        assert!(parser.is_complete());
        assert_eq!(
            recorder.events,
            [
                "url /index.html",
                "header Host=127.0.0.1:8080",
                "header User-Agent=curl/7.79.1",
                "header Accept=*/*",
                "headers-complete GET HTTP/1.1",
                "complete",
            ]
        );
    }

    #[test]
    fn body_split_across_reads() {
        let head = "POST /items HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello";

        let mut parser = RequestParser::new();
        let mut recorder = Recorder::default();
        parser.feed(head.as_bytes(), &mut recorder).unwrap();
        assert!(!parser.is_complete());

        parser.feed(b" world", &mut recorder).unwrap();
        assert!(parser.is_complete());
        assert_eq!(recorder.events[recorder.events.len() - 3..], ["body hello", "body  world", "complete"]);
    }

    #[test]
    fn head_split_across_reads() {
        let mut parser = RequestParser::new();
        let mut recorder = Recorder::default();
        assert!(parser.is_idle());

        parser.feed(b"GET /a HTTP/1.0\r\nHo", &mut recorder).unwrap();
        assert!(recorder.events.is_empty());
        assert!(!parser.is_idle());

        parser.feed(b"st: x\r\n\r\n", &mut recorder).unwrap();
        assert_eq!(recorder.events, ["url /a", "header Host=x", "headers-complete GET HTTP/1.0", "complete"]);
    }

    #[test]
    fn rejects_chunked() {
        let str = "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        let err = RequestParser::new().feed(str.as_bytes(), &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedTransferEncoding { .. }));
    }

    #[test]
    fn rejects_bad_content_length() {
        let str = "POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n";
        let err = RequestParser::new().feed(str.as_bytes(), &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength { .. }));
    }

    #[test]
    fn rejects_oversized_head() {
        let mut str = String::from("GET / HTTP/1.1\r\nX-Big: ");
        str.push_str(&"a".repeat(MAX_HEADER_BYTES));

        let err = RequestParser::new().feed(str.as_bytes(), &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ParseError::TooLargeHeader { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = RequestParser::new().feed(b"\x00\x01 nonsense\r\n\r\n", &mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader { .. }));
    }
}
