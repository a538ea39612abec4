//! Drives one handler through a request.
//!
//! `initialize`, `prepare` and the verb method run in order; the first error
//! stops the sequence and is turned into a response. Whatever happened, the
//! response is then sent, the request logged and `on_finished` invoked.

use std::sync::Arc;

use http::{Method, StatusCode};
use quill_http::protocol::{SendError, StateError};
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, HttpStatusError};
use crate::handler::RequestHandler;
use crate::request::RequestContext;

/// Target of the per-request access log records.
pub const ACCESS_LOG_TARGET: &str = "quill::access";

pub(crate) async fn execute(ctx: &mut RequestContext<'_>) {
    let mut handler = ctx.route().handler().create();
    debug!(handler = ctx.name(), summary = %ctx.request_summary(), "executing");

    if let Err(error) = run(handler.as_mut(), ctx).await {
        handle_error(ctx, error);
    }

    match ctx.send_response() {
        Ok(()) => {}
        Err(StateError::Send(SendError::TransportClosed)) => {
            debug!(handler = ctx.name(), "connection closed before the response was sent");
            handler.on_connection_closed();
        }
        Err(e) => {
            error!(cause = %e, handler = ctx.name(), "failed to send response");
            if let Err(e) = ctx.send_fallback_error() {
                error!(cause = %e, handler = ctx.name(), "failed to send fallback response");
            }
        }
    }

    if !ctx.route().suppress_logging() {
        log_request(ctx);
    }

    handler.on_finished(ctx).await;
}

async fn run(handler: &mut dyn RequestHandler, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
    ensure_not_cancelled(ctx)?;
    let kwargs = Arc::clone(ctx.route().init_kwargs());
    handler.initialize(ctx, &kwargs).await?;

    ensure_not_cancelled(ctx)?;
    handler.prepare(ctx).await?;
    if ctx.is_finished() {
        return Ok(());
    }

    ensure_not_cancelled(ctx)?;
    let method = ctx.request().method().clone();
    match method {
        Method::GET => handler.get(ctx).await,
        Method::HEAD => handler.head(ctx).await,
        Method::POST => handler.post(ctx).await,
        Method::PUT => handler.put(ctx).await,
        Method::PATCH => handler.patch(ctx).await,
        Method::DELETE => handler.delete(ctx).await,
        Method::OPTIONS => handler.options(ctx).await,
        _ => Err(HandlerError::status(StatusCode::METHOD_NOT_ALLOWED)),
    }
}

fn ensure_not_cancelled(ctx: &RequestContext<'_>) -> Result<(), HandlerError> {
    if ctx.is_cancelled() {
        warn!(summary = %ctx.request_summary(), "request timed out");
        return Err(HttpStatusError::new(StatusCode::SERVICE_UNAVAILABLE)
            .with_description("The request took too long to process")
            .into());
    }
    Ok(())
}

fn handle_error(ctx: &mut RequestContext<'_>, error: HandlerError) {
    let result = match error {
        HandlerError::Finish(chunk) => {
            if ctx.is_finished() {
                Ok(())
            } else {
                match chunk {
                    Some(chunk) => ctx.finish_with(chunk),
                    None => ctx.finish(),
                }
            }
        }
        HandlerError::Http(error) => {
            debug!(status = error.status().as_u16(), "handler returned an http error");
            ctx.write_error(&error, None)
        }
        HandlerError::Unexpected { source, traceback } => {
            error!(cause = %source, handler = ctx.name(), "uncaught error");
            ctx.write_error(&HttpStatusError::new(StatusCode::INTERNAL_SERVER_ERROR), Some(&traceback))
        }
    };

    if let Err(e) = result {
        error!(cause = %e, handler = ctx.name(), "failed to write the error response");
    }
}

/// Writes the access log record, with the severity picked by status class.
fn log_request(ctx: &RequestContext<'_>) {
    let status = ctx.get_status().as_u16();
    let summary = ctx.request_summary();
    let elapsed = ctx.request().request_time().as_secs_f64() * 1000.0;

    match status {
        0..400 => info!(target: ACCESS_LOG_TARGET, "{status} {summary} {elapsed:.2}ms"),
        400..500 => warn!(target: ACCESS_LOG_TARGET, "{status} {summary} {elapsed:.2}ms"),
        _ => error!(target: ACCESS_LOG_TARGET, "{status} {summary} {elapsed:.2}ms"),
    }
}
