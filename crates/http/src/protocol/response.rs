//! The mutable output side of an exchange.
//!
//! A [`Response`] buffers the body in memory until it is either flushed
//! (streaming the status line and headers first) or sent in one go when the
//! request finishes. Once headers hit the wire the status and headers are
//! frozen; body chunks may still be appended and flushed.

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use http::{StatusCode, Version};
use tracing::trace;

use crate::protocol::header::{FieldValue, Headers};
use crate::protocol::{HeaderError, StateError, Transport};

/// Initial buffer size allocated for the status line and headers
const INIT_HEADER_SIZE: usize = 1024;

/// Values every fresh response is seeded with.
#[derive(Debug, Clone)]
pub struct ResponseDefaults {
    /// Value of the `Server` header.
    pub server_header: String,
    /// Value of the `Content-Type` header.
    pub default_content_type: String,
}

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    phrase: Option<String>,
    headers: Headers,
    body: BytesMut,
    headers_written: bool,
    version: Version,
    defaults: ResponseDefaults,
    transport: Transport,
}

impl Response {
    pub fn new(version: Version, transport: Transport, defaults: ResponseDefaults) -> Self {
        let headers = default_headers(&defaults);
        Self {
            status: StatusCode::OK,
            phrase: None,
            headers,
            body: BytesMut::new(),
            headers_written: false,
            version,
            defaults,
            transport,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the overridden phrase, falling back to the canonical reason.
    pub fn phrase(&self) -> &str {
        match &self.phrase {
            Some(phrase) => phrase,
            None => self.status.canonical_reason().unwrap_or("Unknown"),
        }
    }

    pub fn set_status(&mut self, status: StatusCode, phrase: Option<String>) -> Result<(), StateError> {
        self.ensure_headers_pending()?;
        self.status = status;
        self.phrase = phrase;
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Sets a header, validating that the name and value are safe to put on
    /// the wire.
    pub fn set_header(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), StateError> {
        self.ensure_headers_pending()?;
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(HeaderError::InvalidName { name: name.to_string() }.into());
        }
        let value = value.into();
        value.normalize()?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn clear_header(&mut self, name: &str) -> Result<Option<FieldValue>, StateError> {
        self.ensure_headers_pending()?;
        Ok(self.headers.remove(name))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Appends a chunk to the body buffer.
    pub fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn headers_written(&self) -> bool {
        self.headers_written
    }

    /// Restores the default status, headers and an empty body.
    pub fn clear(&mut self) -> Result<(), StateError> {
        self.ensure_headers_pending()?;
        self.headers = default_headers(&self.defaults);
        self.status = StatusCode::OK;
        self.phrase = None;
        self.body.clear();
        Ok(())
    }

    /// Drops every header that can not be rendered, returning their names.
    pub fn drop_invalid_headers(&mut self) -> Result<Vec<String>, StateError> {
        self.ensure_headers_pending()?;
        let mut dropped = Vec::new();
        self.headers.retain(|name, value| {
            let valid = http::HeaderName::from_bytes(name.as_bytes()).is_ok() && value.normalize().is_ok();
            if !valid {
                dropped.push(name.to_string());
            }
            valid
        });
        Ok(dropped)
    }

    /// Sends the headers if they were not sent yet, then whatever body is
    /// buffered, leaving the buffer empty.
    pub fn flush(&mut self) -> Result<(), StateError> {
        if !self.headers_written {
            self.write_headers()?;
        }
        self.write_body()
    }

    /// Writes the status line and headers to the transport.
    ///
    /// # Errors
    ///
    /// Fails with [`StateError::HeadersWritten`] on a second call, or if a
    /// header can not be rendered.
    pub fn write_headers(&mut self) -> Result<(), StateError> {
        self.ensure_headers_pending()?;

        let mut dst = BytesMut::with_capacity(INIT_HEADER_SIZE);
        dst.extend_from_slice(
            format!("HTTP/{} {} {}\r\n", version_str(self.version), self.status.as_u16(), self.phrase()).as_bytes(),
        );
        self.headers.encode(&mut dst)?;
        dst.extend_from_slice(b"\r\n");

        trace!(status = self.status.as_u16(), size = dst.len(), "writing response headers");
        self.transport.write(dst.freeze())?;
        self.headers_written = true;
        Ok(())
    }

    /// Writes the buffered body to the transport and empties the buffer.
    pub fn write_body(&mut self) -> Result<(), StateError> {
        let body: Bytes = self.body.split().freeze();
        self.transport.write(body)?;
        Ok(())
    }

    fn ensure_headers_pending(&self) -> Result<(), StateError> {
        if self.headers_written {
            return Err(StateError::HeadersWritten);
        }
        Ok(())
    }
}

fn default_headers(defaults: &ResponseDefaults) -> Headers {
    let mut headers = Headers::new();
    headers.insert("Server", defaults.server_header.as_str());
    headers.insert("Content-Type", defaults.default_content_type.as_str());
    headers.insert("Date", Utc::now());
    headers
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "1.0",
        Version::HTTP_09 => "0.9",
        _ => "1.1",
    }
}
