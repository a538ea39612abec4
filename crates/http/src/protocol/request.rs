//! The inbound side of an exchange.
//!
//! A [`Request`] is assembled from tokenizer events (see
//! [`ParserCallbacks`]) and owned by its connection until it is handed to the
//! dispatcher. Finishing a request closes the connection's transport.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::{Method, Uri, Version};
use percent_encoding::percent_decode_str;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::codec::ParserCallbacks;
use crate::protocol::header::{Headers, normalize_name};
use crate::protocol::{ParseError, Response, ResponseDefaults, StateError, Transport};

#[derive(Debug)]
pub struct Request {
    method: Method,
    version: Version,
    uri: String,
    path: String,
    query: String,
    query_arguments: BTreeMap<String, Vec<String>>,
    protocol: String,
    host: Option<String>,
    headers: Headers,
    cookies: BTreeMap<String, String>,
    body: Option<BytesMut>,
    remote_ip: IpAddr,
    start_time: Instant,
    finish_time: Option<Instant>,
    complete: bool,
    response: Option<Response>,
    transport: Transport,
    cancellation: CancellationToken,
}

impl Request {
    pub fn new(transport: Transport, remote_ip: IpAddr) -> Self {
        Self {
            method: Method::GET,
            version: Version::HTTP_11,
            uri: String::new(),
            path: String::new(),
            query: String::new(),
            query_arguments: BTreeMap::new(),
            protocol: "http".to_string(),
            host: None,
            headers: Headers::new(),
            cookies: BTreeMap::new(),
            body: None,
            remote_ip,
            start_time: Instant::now(),
            finish_time: None,
            complete: false,
            response: None,
            transport,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The raw request target, `/path?query`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The percent-decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn query_arguments(&self) -> &BTreeMap<String, Vec<String>> {
        &self.query_arguments
    }

    /// `http` unless overridden by `X-Scheme` or `X-Forwarded-Proto`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// The body bytes, `None` when no body was received.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Copies the body out as shared bytes.
    pub fn body_bytes(&self) -> Option<Bytes> {
        self.body.as_ref().map(|body| Bytes::copy_from_slice(body))
    }

    /// The peer address, or the last valid `X-Forwarded-For`/`X-Real-Ip` entry.
    pub fn remote_ip(&self) -> IpAddr {
        self.remote_ip
    }

    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host.as_deref().unwrap_or_default(), self.uri)
    }

    /// Time since the request started, frozen once it is finished.
    pub fn request_time(&self) -> Duration {
        self.finish_time.unwrap_or_else(Instant::now) - self.start_time
    }

    /// True once the tokenizer reported the end of the message.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn finished(&self) -> bool {
        self.finish_time.is_some()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Creates the response for this request, replacing any previous one.
    pub fn attach_response(&mut self, defaults: ResponseDefaults) {
        self.response = Some(Response::new(self.version, self.transport.clone(), defaults));
    }

    /// Signals cancelled once the connection gave up on this request.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Marks the request finished and closes the transport.
    ///
    /// # Errors
    ///
    /// Fails with [`StateError::AlreadyFinished`] when called twice.
    pub fn finish(&mut self) -> Result<(), StateError> {
        if self.finished() {
            return Err(StateError::AlreadyFinished);
        }
        self.finish_time = Some(Instant::now());
        self.transport.close();
        Ok(())
    }

    /// Writes out the response, injecting `Content-Length` when absent, and
    /// finishes the request.
    pub fn send_response(&mut self) -> Result<(), StateError> {
        if self.finished() {
            return Err(StateError::AlreadyFinished);
        }
        let response = self.response.as_mut().ok_or(StateError::NoResponse)?;
        if !response.headers_written() {
            if !response.headers().contains("Content-Length") {
                let length = response.body().len();
                response.set_header("Content-Length", length)?;
            }
            response.write_headers()?;
        }
        response.write_body()?;
        self.finish()
    }
}

impl ParserCallbacks for Request {
    fn on_url(&mut self, url: &[u8]) -> Result<(), ParseError> {
        let uri = std::str::from_utf8(url).map_err(ParseError::invalid_uri)?;
        let parsed = Uri::try_from(uri).map_err(ParseError::invalid_uri)?;

        self.path = percent_decode_str(parsed.path()).decode_utf8_lossy().into_owned();
        self.query = parsed.query().unwrap_or_default().to_string();
        self.query_arguments = parse_query(&self.query)?;
        self.uri = uri.to_string();
        Ok(())
    }

    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError> {
        let key = normalize_name(&String::from_utf8_lossy(name));
        let value = String::from_utf8_lossy(value).into_owned();

        match key.as_str() {
            "Cookie" => self.cookies.extend(parse_cookies(&value)),
            "X-Forwarded-For" | "X-Real-Ip" => {
                let candidate = value.rsplit(',').next().unwrap_or_default().trim();
                match candidate.parse::<IpAddr>() {
                    Ok(ip) => self.remote_ip = ip,
                    Err(_) => trace!(header = %key, value = %value, "ignoring invalid forwarded address"),
                }
            }
            "X-Scheme" | "X-Forwarded-Proto" => self.protocol = value.clone(),
            "Host" => self.host = Some(value.clone()),
            _ => {}
        }

        self.headers.insert(&key, value);
        Ok(())
    }

    fn on_headers_complete(&mut self, method: &[u8], version: Version) -> Result<(), ParseError> {
        self.method = Method::from_bytes(method).map_err(|_| ParseError::InvalidMethod)?;
        self.version = version;
        Ok(())
    }

    fn on_body(&mut self, chunk: &[u8]) -> Result<(), ParseError> {
        self.body.get_or_insert_with(BytesMut::new).extend_from_slice(chunk);
        Ok(())
    }

    fn on_message_complete(&mut self) -> Result<(), ParseError> {
        self.complete = true;
        Ok(())
    }
}

/// Parses a query string into a multimap, dropping blank values.
fn parse_query(query: &str) -> Result<BTreeMap<String, Vec<String>>, ParseError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).map_err(ParseError::invalid_uri)?;
    let mut arguments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs.into_iter().filter(|(_, value)| !value.is_empty()) {
        arguments.entry(key).or_default().push(value);
    }
    Ok(arguments)
}

fn parse_cookies(value: &str) -> impl Iterator<Item = (String, String)> + '_ {
    value.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
        Some((name.to_string(), value.to_string()))
    })
}
