use std::fmt::{self, Write as _};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use indoc::indoc;
use quill_http::connection::HttpConnection;
use quill_web::{
    ACCESS_LOG_TARGET, Application, HandlerError, RedirectHandler, RequestContext, RequestHandler, Route, Settings,
    Value,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

struct Reply {
    status_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }
}

async fn exchange(application: Application, raw: &str) -> Reply {
    let (client, server) = duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    let connection = HttpConnection::new(reader, writer, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 7)));

    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    client_writer.write_all(raw.replace('\n', "\r\n").as_bytes()).await.unwrap();

    connection.process(Arc::new(application)).await.unwrap();
    let mut output = Vec::new();
    client_reader.read_to_end(&mut output).await.unwrap();

    let split = output.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = std::str::from_utf8(&output[..split]).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap().to_string();
    let headers = lines
        .map(|line| {
            let (name, value) = line.split_once(": ").unwrap();
            (name.to_string(), value.to_string())
        })
        .collect();
    Reply { status_line, headers, body: output[split + 4..].to_vec() }
}

#[derive(Default)]
struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let body: Value = [("foo", "bar")].into_iter().collect();
        ctx.finish_with(body)
    }

    async fn post(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let first = ctx.response_content_type();
        let second = ctx.response_content_type();
        assert!(std::ptr::eq(first, second));
        assert!(Arc::ptr_eq(ctx.response_transcoder().unwrap(), ctx.response_transcoder().unwrap()));

        let expected: Value = [("foo", "bar")].into_iter().collect();
        assert_eq!(ctx.body_arguments()?, Some(&expected));

        let body: Value = [("a", 1)].into_iter().collect();
        ctx.write(body)
    }
}

#[tokio::test]
async fn json_round_trip() {
    let application = Application::builder().route("/", Echo::default).build().unwrap();
    let reply = exchange(
        application,
        indoc! {r#"
            POST / HTTP/1.1
            Host: localhost
            Accept: application/json
            Content-Type: application/json
            Content-Length: 13

            {"foo":"bar"}"#},
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.header("Content-Type"), Some("application/json; charset=\"UTF-8\""));
    assert_eq!(reply.header("Content-Length"), Some("7"));
    assert!(reply.header("Server").unwrap().starts_with("quill-http/"));
    assert_eq!(reply.body, br#"{"a":1}"#);
}

#[cfg(feature = "msgpack")]
#[tokio::test]
async fn msgpack_response() {
    let application = Application::builder().route("/", Echo::default).build().unwrap();
    let reply = exchange(
        application,
        indoc! {"
            GET / HTTP/1.1
            Accept: application/msgpack

        "},
    )
    .await;

    assert_eq!(reply.header("Content-Type"), Some("application/msgpack"));
    assert_eq!(reply.body, b"\x81\xa3foo\xa3bar");
}

#[tokio::test]
async fn unknown_path_is_a_negotiated_404() {
    let application = Application::builder().route("/", Echo::default).build().unwrap();
    let reply = exchange(
        application,
        indoc! {"
            GET /missing HTTP/1.1
            Accept: application/json

        "},
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 404 Not Found");
    assert_eq!(
        reply.json(),
        json!({
            "status_code": 404,
            "exception": "HttpError",
            "phrase": "Not Found",
            "description": "Nothing matches the given URI",
            "traceback": []
        })
    );
}

#[tokio::test]
async fn unknown_path_renders_html_by_default() {
    let application = Application::builder().build().unwrap();
    let reply = exchange(
        application,
        indoc! {"
            GET /missing HTTP/1.1

        "},
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 404 Not Found");
    assert_eq!(reply.header("Content-Type"), Some("text/html"));
    assert!(reply.text().contains("<h1>404: Not Found</h1>"));
    assert!(reply.text().contains("<p>Nothing matches the given URI</p>"));
}

#[derive(Default)]
struct DoubleFinish;

#[async_trait]
impl RequestHandler for DoubleFinish {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.finish_with("done")?;
        let outcome = match ctx.finish() {
            Err(HandlerError::Unexpected { source, .. }) => source.to_string(),
            other => format!("{other:?}"),
        };
        ctx.set_header("X-Second-Finish", outcome)
    }
}

#[tokio::test]
async fn finishing_twice_is_rejected() {
    let application = Application::builder().route("/", DoubleFinish::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.header("X-Second-Finish"), Some("request is already finished"));
    assert_eq!(reply.text(), "done");
}

#[derive(Default)]
struct Named(&'static str);

#[async_trait]
impl RequestHandler for Named {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let args = ctx.path_args().join(",");
        let id = ctx.path_kwarg("id").unwrap_or("-").to_string();
        ctx.write(format!("{} args={args} id={id}", self.0))
    }
}

#[tokio::test]
async fn earliest_route_wins() {
    let application = Application::builder()
        .route("/items/.*", || Named("wildcard"))
        .route(r"/items/(?P<id>\d+)", || Named("numeric"))
        .build()
        .unwrap();
    let reply = exchange(application, "GET /items/42 HTTP/1.1\n\n").await;
    assert_eq!(reply.text(), "wildcard args= id=-");
}

#[tokio::test]
async fn captures_reach_the_handler() {
    let application = Application::builder().route(r"/items/(\w+)/(?P<id>\d+)", || Named("numeric")).build().unwrap();
    let reply = exchange(application, "GET /items/books/42 HTTP/1.1\n\n").await;
    assert_eq!(reply.text(), "numeric args=books id=42");
}

#[tokio::test]
async fn redirect() {
    let application = Application::builder()
        .add(
            quill_web::Route::new("/google", quill_web::RedirectHandler::default)
                .unwrap()
                .with_kwarg("url", "https://www.google.com"),
        )
        .build()
        .unwrap();
    let reply = exchange(application, "GET /google HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 302 Found");
    assert_eq!(reply.header("Location"), Some("https://www.google.com"));
    assert_eq!(reply.header("Content-Length"), Some("0"));
}

#[tokio::test]
async fn missing_verb_is_405() {
    let application = Application::builder().route("/", || Named("x")).build().unwrap();
    let reply = exchange(application, "DELETE / HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 405 Method Not Allowed");
    assert_eq!(reply.json()["description"], "Specified method is invalid for this resource");
}

#[derive(Default)]
struct NeedsDatabase;

#[async_trait]
impl RequestHandler for NeedsDatabase {
    async fn prepare(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.require_setting("database_url")
    }

    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let url = ctx.settings().get("database_url").and_then(serde_json::Value::as_str).unwrap_or_default();
        ctx.write(url.to_string())
    }
}

#[tokio::test]
async fn required_settings() {
    let application = Application::builder().route("/", NeedsDatabase::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;
    assert_eq!(reply.status_line, "HTTP/1.1 503 Service Unavailable");

    let settings = Settings::default().with_extra("database_url", "postgres://db");
    let application = Application::builder().route("/", NeedsDatabase::default).settings(settings).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.text(), "postgres://db");
}

#[derive(Default)]
struct Broken;

#[async_trait]
impl RequestHandler for Broken {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.write("partial output")?;
        Err(HandlerError::unexpected("database on fire"))
    }
}

#[tokio::test]
async fn unexpected_errors_are_500() {
    let application = Application::builder().route("/", Broken::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");
    let body = reply.json();
    assert_eq!(body["description"], "Server got itself in trouble");
    assert_eq!(body["traceback"], json!([]));
}

#[tokio::test]
async fn tracebacks_are_opt_in() {
    let settings = Settings { serve_traceback: true, ..Settings::default() };
    let application = Application::builder().route("/", Broken::default).settings(settings).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");
    assert!(reply.json()["traceback"].is_array());
}

#[derive(Default)]
struct Slow;

#[async_trait]
impl RequestHandler for Slow {
    async fn prepare(&mut self, _ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.write("too late")
    }
}

#[tokio::test]
async fn slow_requests_are_cancelled() {
    let settings = Settings { request_timeout_ms: Some(20), ..Settings::default() };
    let application = Application::builder().route("/", Slow::default).settings(settings).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 503 Service Unavailable");
}

#[derive(Default)]
struct Body;

#[async_trait]
impl RequestHandler for Body {
    async fn post(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        let rendered = match ctx.body_arguments()? {
            Some(value) => serde_json::to_string(value).map_err(HandlerError::unexpected)?,
            None => "none".to_string(),
        };
        ctx.set_status(StatusCode::ACCEPTED, None)?;
        ctx.write(rendered)
    }
}

#[tokio::test]
async fn form_bodies_are_decoded() {
    let application = Application::builder().route("/", Body::default).build().unwrap();
    let reply = exchange(
        application,
        "POST / HTTP/1.1\nContent-Type: application/x-www-form-urlencoded\nContent-Length: 22\n\nname=quill&tag=a&tag=b",
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 202 Accepted");
    assert_eq!(reply.text(), r#"{"name":"quill","tag":["a","b"]}"#);
}

#[tokio::test]
async fn missing_body_is_none() {
    let application = Application::builder().route("/", Body::default).build().unwrap();
    let reply = exchange(application, "POST / HTTP/1.1\nContent-Type: application/json\n\n").await;
    assert_eq!(reply.text(), "none");
}

#[tokio::test]
async fn unsupported_body_is_415() {
    let application = Application::builder().route("/", Body::default).build().unwrap();
    let reply = exchange(
        application,
        "POST / HTTP/1.1\nAccept: application/json\nContent-Type: image/png\nContent-Length: 3\n\nPNG",
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 415 Unsupported Media Type");
    assert!(reply.json()["description"].as_str().unwrap().contains("image/png"));
}

#[tokio::test]
async fn malformed_body_is_400() {
    let application = Application::builder().route("/", Body::default).build().unwrap();
    let reply = exchange(
        application,
        "POST / HTTP/1.1\nAccept: application/json\nContent-Type: application/json\nContent-Length: 5\n\n{nope",
    )
    .await;

    assert_eq!(reply.status_line, "HTTP/1.1 400 Bad Request");
}

#[tokio::test]
async fn plain_text_errors_for_object_less_types() {
    for accept in ["text/plain", "application/octet-stream"] {
        let application = Application::builder().route("/", Echo::default).build().unwrap();
        let reply = exchange(application, &format!("GET /missing HTTP/1.1\nAccept: {accept}\n\n")).await;

        assert_eq!(reply.status_line, "HTTP/1.1 404 Not Found");
        assert_eq!(reply.header("Content-Type"), Some("text/plain; charset=\"UTF-8\""));
        assert_eq!(reply.text(), "404 Not Found\nNothing matches the given URI\n");
    }
}

#[derive(Default)]
struct BadHeader;

#[async_trait]
impl RequestHandler for BadHeader {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.set_header("X Bad Name", "v")?;
        ctx.write("hello")
    }
}

#[tokio::test]
async fn invalid_header_names_are_rejected_when_set() {
    let application = Application::builder().route("/", BadHeader::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");
    assert_eq!(reply.json()["status_code"], 500);
}

#[tokio::test]
async fn unsendable_responses_fall_back_to_500() {
    let settings = Settings { server_name: "quill\r\nX-Injected: 1".into(), ..Settings::default() };
    let application = Application::builder().route("/", || Named("ok")).settings(settings).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");
    assert_eq!(reply.header("Server"), None);
    assert_eq!(reply.header("X-Injected"), None);
    assert_eq!(reply.header("Content-Length"), Some("26"));
    assert_eq!(reply.text(), "500 Internal Server Error\n");
}

#[derive(Default)]
struct Gate;

#[async_trait]
impl RequestHandler for Gate {
    async fn prepare(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.finish_with("from prepare")
    }

    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.write("from get")
    }
}

#[tokio::test]
async fn finishing_in_prepare_skips_the_verb() {
    let application = Application::builder().route("/", Gate::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.text(), "from prepare");
}

#[derive(Default)]
struct EarlyExit;

#[async_trait]
impl RequestHandler for EarlyExit {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.set_status(StatusCode::ACCEPTED, None)?;
        Err(HandlerError::finish_with("queued"))
    }
}

#[tokio::test]
async fn finish_errors_write_their_chunk() {
    let application = Application::builder().route("/", EarlyExit::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 202 Accepted");
    assert_eq!(reply.text(), "queued");
}

#[tokio::test]
async fn initialize_failures_are_500() {
    let application =
        Application::builder().add(Route::new("/go", RedirectHandler::default).unwrap()).build().unwrap();
    let reply = exchange(application, "GET /go HTTP/1.1\nAccept: application/json\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");
    assert_eq!(reply.header("Location"), None);
    assert_eq!(reply.json()["description"], "Server got itself in trouble");
}

#[derive(Default)]
struct Streaming;

#[async_trait]
impl RequestHandler for Streaming {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.set_header("Content-Type", "text/plain")?;
        ctx.write("hello ")?;
        ctx.flush()?;
        assert!(ctx.set_status(StatusCode::ACCEPTED, None).is_err());
        ctx.write("world")
    }
}

#[tokio::test]
async fn flushed_responses_keep_streaming() {
    let application = Application::builder().route("/", Streaming::default).build().unwrap();
    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;

    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.header("Content-Type"), Some("text/plain"));
    assert_eq!(reply.header("Content-Length"), None);
    assert_eq!(reply.text(), "hello world");
}

struct Tracked(Arc<Mutex<Vec<u16>>>);

#[async_trait]
impl RequestHandler for Tracked {
    async fn get(&mut self, ctx: &mut RequestContext<'_>) -> Result<(), HandlerError> {
        ctx.write("tracked")
    }

    async fn on_finished(&mut self, ctx: &mut RequestContext<'_>) {
        assert!(ctx.is_finished());
        self.0.lock().unwrap().push(ctx.get_status().as_u16());
    }
}

#[tokio::test]
async fn on_finished_runs_after_the_response() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let tracked = Arc::clone(&seen);
    let application = Application::builder().route("/", move || Tracked(Arc::clone(&tracked))).build().unwrap();

    let reply = exchange(application, "GET / HTTP/1.1\n\n").await;
    assert_eq!(reply.text(), "tracked");
    assert_eq!(*seen.lock().unwrap(), [200]);

    let application = Application::builder().route("/", {
        let tracked = Arc::clone(&seen);
        move || Tracked(Arc::clone(&tracked))
    });
    let reply = exchange(application.build().unwrap(), "DELETE / HTTP/1.1\n\n").await;
    assert_eq!(reply.status_line, "HTTP/1.1 405 Method Not Allowed");
    assert_eq!(*seen.lock().unwrap(), [200, 405]);
}

/// Collects `(level, target, message)` for every event.
#[derive(Clone, Default)]
struct Records(Arc<Mutex<Vec<(Level, String, String)>>>);

impl Records {
    fn access_log(&self) -> Vec<(Level, String)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, target, _)| target == ACCESS_LOG_TARGET)
            .map(|(level, _, message)| (*level, message.clone()))
            .collect()
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            write!(self.0, "{value:?}").unwrap();
        }
    }
}

impl<S: Subscriber> Layer<S> for Records {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        let metadata = event.metadata();
        self.0.lock().unwrap().push((*metadata.level(), metadata.target().to_string(), message));
    }
}

#[tokio::test]
async fn access_log_level_follows_status() {
    let records = Records::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(records.clone()));

    let build = || Application::builder().route("/", Echo::default).route("/broken", Broken::default).build().unwrap();
    exchange(build(), "GET / HTTP/1.1\n\n").await;
    exchange(build(), "GET /missing HTTP/1.1\n\n").await;
    exchange(build(), "GET /broken HTTP/1.1\n\n").await;

    let log = records.access_log();
    let levels: Vec<_> = log.iter().map(|(level, _)| *level).collect();
    assert_eq!(levels, [Level::INFO, Level::WARN, Level::ERROR]);
    assert!(log[0].1.starts_with("200 GET / (192.168.0.7) "));
    assert!(log[1].1.starts_with("404 GET /missing (192.168.0.7) "));
    assert!(log[2].1.starts_with("500 GET /broken (192.168.0.7) "));
    assert!(log[0].1.ends_with("ms"));
}

#[tokio::test]
async fn suppressed_routes_skip_the_access_log() {
    let records = Records::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(records.clone()));

    let application = Application::builder()
        .add(Route::new("/health", Echo::default).unwrap().suppress_logging(true))
        .default_handler_suppress_logging(true)
        .build()
        .unwrap();
    let reply = exchange(application, "GET /health HTTP/1.1\n\n").await;
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");

    let application = Application::builder().default_handler_suppress_logging(true).build().unwrap();
    let reply = exchange(application, "GET /missing HTTP/1.1\n\n").await;
    assert_eq!(reply.status_line, "HTTP/1.1 404 Not Found");

    assert!(records.access_log().is_empty());
}
