//! Request handlers.
//!
//! A fresh handler is created for every request by the [`HandlerFactory`] of
//! the matched route, then driven through `initialize`, `prepare` and the
//! verb method matching the request method. Verb methods default to
//! `405 Method Not Allowed`.
//!
//! ```
//! use async_trait::async_trait;
//! use quill_web::handler::RequestHandler;
//! use quill_web::{HandlerError, RequestContext};
//!
//! #[derive(Default)]
//! struct Hello;
//!
//! #[async_trait]
//! impl RequestHandler for Hello {
//!     async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
//!         ctx.write("hello")
//!     }
//! }
//! ```

use std::any;
use std::collections::BTreeMap;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use crate::error::HandlerError;
use crate::request::RequestContext;
use crate::value::Value;

fn method_not_allowed() -> Result<(), HandlerError> {
    Err(HandlerError::status(StatusCode::METHOD_NOT_ALLOWED))
}

#[async_trait]
pub trait RequestHandler: Send {
    /// Receives the keyword arguments the route was registered with.
    async fn initialize(
        &mut self,
        ctx: &mut RequestContext<'_>,
        _kwargs: &BTreeMap<String, Value>,
    ) -> Result<(), HandlerError> {
        debug!(handler = ctx.name(), "initializing");
        Ok(())
    }

    /// Runs before the verb method, which is skipped if this finishes the
    /// request.
    async fn prepare(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        debug!(handler = ctx.name(), summary = %ctx.request_summary(), "preparing");
        Ok(())
    }

    async fn get(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn head(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn post(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn put(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn patch(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn delete(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    async fn options(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        method_not_allowed()
    }

    /// Invoked when the peer went away before the response could be sent.
    fn on_connection_closed(&mut self) {}

    /// Invoked after the response was sent and logged.
    async fn on_finished(&mut self, _ctx: &mut RequestContext<'_>) {}
}

/// Creates one handler per request.
///
/// Implemented for every `Fn() -> H`, so `Hello::default` or a closure can be
/// registered directly.
pub trait HandlerFactory: Send + Sync {
    fn create(&self) -> Box<dyn RequestHandler>;

    /// The handler's type name, without its module path.
    fn type_name(&self) -> &'static str;
}

impl<F, H> HandlerFactory for F
where
    F: Fn() -> H + Send + Sync,
    H: RequestHandler + 'static,
{
    fn create(&self) -> Box<dyn RequestHandler> {
        Box::new(self())
    }

    fn type_name(&self) -> &'static str {
        short_type_name(any::type_name::<H>())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Answers every request with `404 Not Found`. Serves the catch-all route.
#[derive(Debug, Default)]
pub struct DefaultHandler;

#[async_trait]
impl RequestHandler for DefaultHandler {
    async fn prepare(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::status(StatusCode::NOT_FOUND))
    }
}

/// Redirects `GET` requests to the `url` keyword argument, with a `301`
/// when `permanent` is true and a `302` otherwise.
#[derive(Debug, Default)]
pub struct RedirectHandler {
    url: String,
    permanent: bool,
}

#[async_trait]
impl RequestHandler for RedirectHandler {
    async fn initialize(
        &mut self,
        _ctx: &mut RequestContext<'_>,
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<(), HandlerError> {
        let Some(url) = kwargs.get("url").and_then(Value::as_str) else {
            return Err(HandlerError::unexpected("RedirectHandler requires a `url` keyword argument"));
        };
        self.url = url.to_string();
        self.permanent = kwargs.get("permanent").and_then(Value::as_bool).unwrap_or(false);
        Ok(())
    }

    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.redirect(&self.url, self.permanent, None)
    }
}
