//! The wire protocol and connection core of the quill HTTP server.
//!
//! This crate reads HTTP/1.x requests off an async stream, hands them to a
//! [`handler::Dispatcher`], and writes the dispatcher's output back to the
//! peer. It knows nothing about routing or content negotiation; those live in
//! `quill-web`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use quill_http::connection::HttpConnection;
//! use quill_http::handler::Dispatcher;
//! use quill_http::protocol::{Request, ResponseDefaults};
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! struct HelloWorld;
//!
//! #[async_trait]
//! impl Dispatcher for HelloWorld {
//!     fn response_defaults(&self) -> ResponseDefaults {
//!         ResponseDefaults { server_header: "hello/1.0".into(), default_content_type: "text/plain".into() }
//!     }
//!
//!     async fn dispatch(&self, mut request: Request) {
//!         if let Some(response) = request.response_mut() {
//!             response.write(b"Hello World!\r\n");
//!         }
//!         if let Err(e) = request.send_response() {
//!             error!(cause = %e, "failed to send response");
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let dispatcher = Arc::new(HelloWorld);
//!
//!     loop {
//!         let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let dispatcher = dispatcher.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer, remote_addr.ip());
//!             match connection.process(dispatcher).await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the incremental request tokenizer and its callback trait
//! - [`protocol`]: request, response, headers, transport and error types
//! - [`connection`]: drives one exchange over a reader/writer pair
//! - [`handler`]: the [`Dispatcher`](handler::Dispatcher) trait applications implement
//!
//! # Limitations
//!
//! - One request per connection, no keep-alive
//! - HTTP/1.x only (currently HTTP/2 or HTTP/3 is not supported)
//! - No chunked request bodies; bodies must carry `Content-Length`
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
