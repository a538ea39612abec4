//! Request handling on top of `quill-http`.
//!
//! An [`Application`] routes every request to a [`RequestHandler`] created
//! for that request alone. Handlers read the request and write the response
//! through a [`RequestContext`], which negotiates the response content type
//! from the `Accept` header and encodes structured [`Value`]s with the
//! matching [`Transcoder`](transcoder::Transcoder): JSON, form data, text,
//! MessagePack, YAML or raw bytes.
//!
//! ```no_run
//! use async_trait::async_trait;
//! use quill_web::{Application, HandlerError, RequestContext, RequestHandler, Value};
//!
//! #[derive(Default)]
//! struct Hello;
//!
//! #[async_trait]
//! impl RequestHandler for Hello {
//!     async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
//!         let body: Value = [("hello", "world")].into_iter().collect();
//!         ctx.finish_with(body)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Application::builder().route("/", Hello::default).build()?.serve().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod lifecycle;
mod request;
mod server;
mod settings;

pub mod handler;
pub mod msgpack;
pub mod negotiation;
pub mod router;
pub mod status;
pub mod transcoder;
pub mod value;

pub use error::{HandlerError, HttpStatusError};
pub use handler::{DefaultHandler, HandlerFactory, RedirectHandler, RequestHandler};
pub use lifecycle::ACCESS_LOG_TARGET;
pub use request::{Chunk, RequestContext};
pub use router::{Route, RouteMatch, Router};
pub use server::{Application, ApplicationBuildError, ApplicationBuilder};
pub use settings::Settings;
pub use value::Value;
