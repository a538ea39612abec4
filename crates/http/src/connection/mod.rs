//! Connection handling.
//!
//! [`HttpConnection`] reads one request from a stream, dispatches it, and
//! writes whatever the dispatcher queued on the request's transport back to
//! the peer. The connection is shut down once the request is finished.

mod http_connection;

pub use http_connection::HttpConnection;
