//! The seam between the connection core and an application.
//!
//! A connection builds a [`Request`] from the wire and hands it to a
//! [`Dispatcher`], which is expected to eventually finish it. Everything the
//! dispatcher writes goes through the request's transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::{Request, ResponseDefaults};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Values a fresh response is seeded with.
    fn response_defaults(&self) -> ResponseDefaults;

    /// Processes a fully received request.
    async fn dispatch(&self, request: Request);

    /// Called when the peer went away before a request was complete.
    fn on_connection_closed(&self) {}

    /// How long a request may run before it is cancelled.
    fn request_timeout(&self) -> Option<Duration> {
        None
    }
}
