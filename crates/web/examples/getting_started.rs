//! A JSON first application with a redirect.
//!
//! ```sh
//! curl -v http://127.0.0.1:8000/
//! curl -v -H 'Accept: application/msgpack' http://127.0.0.1:8000/ | xxd
//! curl -v -H 'Content-Type: application/json' -d '{"name":"quill"}' http://127.0.0.1:8000/
//! curl -v http://127.0.0.1:8000/google
//! ```

use async_trait::async_trait;
use http::StatusCode;
use quill_web::{Application, HandlerError, RedirectHandler, RequestContext, RequestHandler, Route, Settings, Value};
use serde_json::json;
use tracing::info;

#[derive(Default)]
struct Greeting;

#[async_trait]
impl RequestHandler for Greeting {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let body = Value::from(json!({
            "hello": {
                "world": {
                    "foo": "bar",
                    "baz": "qux",
                    "corgie": ["one", "two", "three"]
                }
            }
        }));
        ctx.finish_with(body)
    }

    async fn post(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        info!(body = ?ctx.body_arguments()?, "request body");
        ctx.set_status(StatusCode::NO_CONTENT, None)?;
        ctx.finish()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings { serve_traceback: true, default_content_type: "application/json".to_string(), ..Settings::default() };

    Application::builder()
        .route("/", Greeting::default)
        .add(Route::new("/google", RedirectHandler::default)?.with_kwarg("url", "https://www.google.com"))
        .settings(settings)
        .build()?
        .serve()
        .await?;
    Ok(())
}
