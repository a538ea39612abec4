//! Per-request state shared by a handler's lifecycle methods.
//!
//! [`RequestContext`] owns the [`Request`] for the duration of the
//! lifecycle and offers the response helpers handlers build on. Negotiated
//! values (response content type and transcoder, decoded body, language and
//! encoding) are computed on first access and cached for the rest of the
//! request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use once_cell::unsync::OnceCell;
use quill_http::protocol::{FieldValue, Request, Response, StateError};
use tracing::{debug, error, warn};

use crate::error::{HandlerError, HttpStatusError};
use crate::negotiation::{self, NegotiationError};
use crate::router::RouteMatch;
use crate::server::Application;
use crate::settings::Settings;
use crate::transcoder::{TranscodeError, Transcoder};
use crate::value::Value;

const HTML_ERROR_TEMPLATE: &str = "\
<html>
  <head><title>{status_code}: {phrase}</title></head>
  <body>
    <h1>{status_code}: {phrase}</h1>
    <p>{description}</p>
    <pre>{traceback}</pre>
  </body>
</html>
";

/// A piece of response body accepted by [`RequestContext::write`].
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// Written as is.
    Bytes(Bytes),
    /// Written UTF-8 encoded.
    Text(String),
    /// A mapping, encoded by the negotiated response transcoder.
    Object(Value),
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(bytes))
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string())
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<Value> for Chunk {
    fn from(value: Value) -> Self {
        Chunk::Object(value)
    }
}

impl From<BTreeMap<String, Value>> for Chunk {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Chunk::Object(Value::Map(map))
    }
}

pub struct RequestContext<'app> {
    application: &'app Application,
    request: Request,
    route: RouteMatch,
    finished: bool,
    response_content_type: OnceCell<String>,
    response_transcoder: OnceCell<Option<Arc<dyn Transcoder>>>,
    body_arguments: OnceCell<Option<Value>>,
    request_language: OnceCell<String>,
    request_encoding: OnceCell<String>,
}

impl<'app> RequestContext<'app> {
    pub(crate) fn new(application: &'app Application, request: Request, route: RouteMatch) -> Self {
        Self {
            application,
            request,
            route,
            finished: false,
            response_content_type: OnceCell::new(),
            response_transcoder: OnceCell::new(),
            body_arguments: OnceCell::new(),
            request_language: OnceCell::new(),
            request_encoding: OnceCell::new(),
        }
    }

    pub fn application(&self) -> &'app Application {
        self.application
    }

    pub fn settings(&self) -> &'app Settings {
        self.application.settings()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn route(&self) -> &RouteMatch {
        &self.route
    }

    /// Unnamed groups captured from the path.
    pub fn path_args(&self) -> &[String] {
        self.route.args()
    }

    /// Named groups captured from the path.
    pub fn path_kwargs(&self) -> &BTreeMap<String, String> {
        self.route.kwargs()
    }

    pub fn path_kwarg(&self, name: &str) -> Option<&str> {
        self.route.kwargs().get(name).map(String::as_str)
    }

    /// The route name, or the handler type name for unnamed routes.
    pub fn name(&self) -> &str {
        self.route.name().unwrap_or_else(|| self.route.handler().type_name())
    }

    /// True once `finish` was called or the response was sent.
    pub fn is_finished(&self) -> bool {
        self.finished || self.request.finished()
    }

    /// True once the connection gave up waiting for this request.
    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    fn response(&self) -> Result<&Response, StateError> {
        self.request.response().ok_or(StateError::NoResponse)
    }

    fn response_mut(&mut self) -> Result<&mut Response, StateError> {
        self.request.response_mut().ok_or(StateError::NoResponse)
    }

    /// Resets status, headers and body to their defaults.
    pub fn clear(&mut self) -> Result<(), HandlerError> {
        self.response_mut()?.clear()?;
        Ok(())
    }

    pub fn clear_header(&mut self, name: &str) -> Result<(), HandlerError> {
        self.response_mut()?.clear_header(name)?;
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), HandlerError> {
        self.response_mut()?.set_header(name, value)?;
        Ok(())
    }

    /// Sets the response status; without a phrase the standard one is used.
    pub fn set_status(&mut self, status: StatusCode, phrase: Option<&str>) -> Result<(), HandlerError> {
        self.response_mut()?.set_status(status, phrase.map(str::to_string))?;
        Ok(())
    }

    pub fn get_status(&self) -> StatusCode {
        self.request.response().map_or(StatusCode::OK, Response::status)
    }

    /// Appends to the response body.
    ///
    /// Objects must be mappings; they are encoded with the response
    /// transcoder, which also sets `Content-Type`.
    ///
    /// # Errors
    ///
    /// Fails once the request is finished, for non-mapping objects, and when
    /// no transcoder can encode the object.
    pub fn write(&mut self, chunk: impl Into<Chunk>) -> Result<(), HandlerError> {
        if self.is_finished() {
            return Err(StateError::AlreadyFinished.into());
        }
        let bytes = match chunk.into() {
            Chunk::Bytes(bytes) => bytes,
            Chunk::Text(text) => Bytes::from(text),
            Chunk::Object(value) => {
                if !matches!(value, Value::Map(_)) {
                    return Err(StateError::InvalidChunk { kind: value.kind() }.into());
                }
                let Some(transcoder) = self.response_transcoder().map(Arc::clone) else {
                    let content_type = self.response_content_type().to_string();
                    return Err(StateError::MissingTranscoder { content_type }.into());
                };
                let (content_type, bytes) = transcoder.encode(&value)?;
                self.set_header("Content-Type", content_type)?;
                bytes
            }
        };
        self.response_mut()?.write(&bytes);
        Ok(())
    }

    /// Marks the response complete; it is sent once the lifecycle ends.
    ///
    /// # Errors
    ///
    /// Fails with [`StateError::AlreadyFinished`] when called twice.
    pub fn finish(&mut self) -> Result<(), HandlerError> {
        if self.is_finished() {
            return Err(StateError::AlreadyFinished.into());
        }
        self.finished = true;
        Ok(())
    }

    /// Writes a last chunk, then finishes.
    pub fn finish_with(&mut self, chunk: impl Into<Chunk>) -> Result<(), HandlerError> {
        self.write(chunk)?;
        self.finish()
    }

    /// Sends the headers, if not sent yet, and the buffered body.
    pub fn flush(&mut self) -> Result<(), HandlerError> {
        self.response_mut()?.flush()?;
        Ok(())
    }

    /// Redirects to `url` and finishes. The status defaults to `301` for
    /// permanent redirects and `302` otherwise.
    pub fn redirect(&mut self, url: &str, permanent: bool, status: Option<StatusCode>) -> Result<(), HandlerError> {
        let status = status.unwrap_or(if permanent { StatusCode::MOVED_PERMANENTLY } else { StatusCode::FOUND });
        self.set_status(status, None)?;
        self.set_header("Location", url)?;
        self.finish()
    }

    pub fn send_error(
        &mut self,
        status: StatusCode,
        phrase: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), HandlerError> {
        let mut error = HttpStatusError::new(status);
        if let Some(phrase) = phrase {
            error = error.with_phrase(phrase);
        }
        if let Some(description) = description {
            error = error.with_description(description);
        }
        self.write_error(&error, None)
    }

    /// Replaces the response with an error page.
    ///
    /// Renders HTML when the negotiated content type is `text/html`, and a
    /// `{status_code, exception, phrase, description, traceback}` object
    /// otherwise. Content types whose transcoder can't encode objects get a
    /// plain text page instead. The traceback is only included when
    /// `serve_traceback` is enabled.
    pub fn write_error(&mut self, error: &HttpStatusError, traceback: Option<&str>) -> Result<(), HandlerError> {
        if self.response()?.headers_written() {
            warn!(status = error.status().as_u16(), "headers already sent, can't render error");
            self.finished = true;
            return Ok(());
        }
        self.clear()?;
        self.finished = false;
        self.set_status(error.status(), error.custom_phrase())?;

        let stack: Vec<&str> = match traceback {
            Some(traceback) if self.settings().serve_traceback => traceback.lines().collect(),
            _ => Vec::new(),
        };

        let content_type = self.response_content_type().to_string();
        debug!(content_type = %content_type, "rendering error");
        if content_type.starts_with("text/html") {
            self.set_header("Content-Type", content_type)?;
            let page = HTML_ERROR_TEMPLATE
                .replace("{status_code}", &error.status().as_u16().to_string())
                .replace("{phrase}", &escape_html(error.phrase()))
                .replace("{description}", &escape_html(error.description()))
                .replace("{traceback}", &escape_html(&stack.join("\n")));
            self.finish_with(page)
        } else {
            let payload: BTreeMap<String, Value> = [
                ("status_code", Value::Int(i64::from(error.status().as_u16()))),
                ("exception", Value::from("HttpError")),
                ("phrase", Value::from(error.phrase())),
                ("description", Value::from(error.description())),
                ("traceback", Value::array(stack.iter().copied())),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
            if let Err(e) = self.write(payload) {
                debug!(cause = %e, content_type = %content_type, "error payload not encodable, rendering text");
                self.set_header("Content-Type", "text/plain; charset=\"UTF-8\"")?;
                let mut text = format!("{} {}\n{}\n", error.status().as_u16(), error.phrase(), error.description());
                for line in &stack {
                    text.push_str(line);
                    text.push('\n');
                }
                self.write(text)?;
            }
            self.finish()
        }
    }

    /// Fails with `503 Service Unavailable` unless `name` is set in the
    /// application's extra settings.
    pub fn require_setting(&self, name: &str) -> Result<(), HandlerError> {
        if self.settings().get(name).is_none_or(serde_json::Value::is_null) {
            error!(setting = name, handler = self.name(), "missing required setting");
            return Err(HandlerError::status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }

    /// The request body decoded by the transcoder for its `Content-Type`.
    ///
    /// `None` without a body or a `Content-Type`.
    ///
    /// # Errors
    ///
    /// Fails with `415` for unparsable or unregistered content types and
    /// `400` when the body can't be decoded.
    pub fn body_arguments(&self) -> Result<Option<&Value>, HandlerError> {
        self.body_arguments.get_or_try_init(|| self.decode_body()).map(Option::as_ref)
    }

    fn decode_body(&self) -> Result<Option<Value>, HandlerError> {
        let Some(body) = self.request.body().filter(|body| !body.is_empty()) else {
            return Ok(None);
        };
        let Some(header) = self.request.headers().get_str("Content-Type") else {
            return Ok(None);
        };
        negotiation::parse_content_type(header)?;
        let transcoder = self
            .application
            .transcoders()
            .get(header)
            .ok_or_else(|| NegotiationError::UnsupportedContentType { content_type: header.to_string() })?;

        match transcoder.decode(body) {
            Ok(value) => Ok(Some(value)),
            Err(e @ (TranscodeError::Decode { .. } | TranscodeError::MsgpackDecode(_))) => {
                debug!(cause = %e, content_type = header, "undecodable request body");
                Err(HttpStatusError::new(StatusCode::BAD_REQUEST).with_description(e.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The preferred `Accept-Language`, or the configured default.
    pub fn request_language(&self) -> &str {
        self.request_language.get_or_init(|| {
            self.preferred("Accept-Language").unwrap_or_else(|| self.settings().default_language.clone())
        })
    }

    /// The preferred `Accept-Encoding`, or the configured default.
    pub fn request_encoding(&self) -> &str {
        self.request_encoding.get_or_init(|| {
            self.preferred("Accept-Encoding").unwrap_or_else(|| self.settings().default_encoding.clone())
        })
    }

    fn preferred(&self, header: &str) -> Option<String> {
        let value = self.request.headers().get_str(header)?;
        negotiation::parse_quality_list(value).into_iter().next()
    }

    /// The content type negotiated from the `Accept` header.
    pub fn response_content_type(&self) -> &str {
        self.response_content_type.get_or_init(|| {
            negotiation::negotiate(
                self.request.headers().get_str("Accept"),
                &self.settings().default_content_type,
                self.application.transcoders().negotiable(),
            )
        })
    }

    /// The transcoder for [`response_content_type`](Self::response_content_type).
    pub fn response_transcoder(&self) -> Option<&Arc<dyn Transcoder>> {
        self.response_transcoder
            .get_or_init(|| self.application.transcoders().get(self.response_content_type()).map(Arc::clone))
            .as_ref()
    }

    /// `METHOD URI (remote-ip)`, as used in the access log.
    pub fn request_summary(&self) -> String {
        format!("{} {} ({})", self.request.method(), self.request.uri(), self.request.remote_ip())
    }

    /// Sends the response and finishes the request.
    pub(crate) fn send_response(&mut self) -> Result<(), StateError> {
        self.finished = true;
        self.request.send_response()
    }

    /// Replaces a response that could not be sent with a bare `500`,
    /// dropping any header that can't be rendered.
    pub(crate) fn send_fallback_error(&mut self) -> Result<(), StateError> {
        let response = self.response_mut()?;
        response.clear()?;
        let dropped = response.drop_invalid_headers()?;
        if !dropped.is_empty() {
            warn!(headers = ?dropped, "dropped headers that can't be rendered");
        }
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        response.set_status(status, None)?;
        response.set_header("Content-Type", "text/plain; charset=\"UTF-8\"")?;
        let body = format!("{} {}\n", status.as_u16(), response.phrase());
        response.write(body.as_bytes());
        self.request.send_response()
    }
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("route", &self.route)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
