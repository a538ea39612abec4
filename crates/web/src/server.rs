//! The application: routes, settings and transcoders, plus the accept loop
//! serving them.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_http::connection::HttpConnection;
use quill_http::handler::Dispatcher;
use quill_http::protocol::{Request, ResponseDefaults};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::handler::HandlerFactory;
use crate::lifecycle;
use crate::negotiation::NegotiationError;
use crate::request::RequestContext;
use crate::router::{Route, RouteError, Router, RouterBuilder};
use crate::settings::Settings;
use crate::transcoder::{Transcoder, Transcoders};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("can't register transcoder: {0}")]
    Transcoder(#[from] NegotiationError),
}

#[derive(Debug)]
pub struct ApplicationBuilder {
    router: RouterBuilder,
    settings: Settings,
    transcoders: Transcoders,
    transcoder_error: Option<NegotiationError>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            router: Router::builder(),
            settings: Settings::default(),
            transcoders: Transcoders::with_defaults(),
            transcoder_error: None,
        }
    }

    pub fn route(mut self, pattern: &str, handler: impl HandlerFactory + 'static) -> Self {
        self.router = self.router.route(pattern, handler);
        self
    }

    pub fn add(mut self, route: Route) -> Self {
        self.router = self.router.add(route);
        self
    }

    pub fn default_handler(mut self, handler: impl HandlerFactory + 'static) -> Self {
        self.router = self.router.default_handler(handler);
        self
    }

    pub fn default_handler_kwargs<K, V>(mut self, kwargs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.router = self.router.default_handler_kwargs(kwargs);
        self
    }

    pub fn default_handler_name(mut self, name: impl Into<String>) -> Self {
        self.router = self.router.default_handler_name(name);
        self
    }

    pub fn default_handler_suppress_logging(mut self, suppress: bool) -> Self {
        self.router = self.router.default_handler_suppress_logging(suppress);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers a transcoder next to the defaults, replacing any previous one
    /// for the same `type/subtype`.
    pub fn transcoder(mut self, mime_type: &str, transcoder: impl Transcoder + 'static) -> Self {
        if let Err(e) = self.transcoders.register(mime_type, transcoder) {
            self.transcoder_error.get_or_insert(e);
        }
        self
    }

    /// # Errors
    ///
    /// Fails on the first invalid route pattern or transcoder media type.
    pub fn build(self) -> Result<Application, ApplicationBuildError> {
        if let Some(e) = self.transcoder_error {
            return Err(e.into());
        }
        let router = self.router.build()?;
        let response_defaults = ResponseDefaults {
            server_header: self.settings.server_header(),
            default_content_type: self.settings.default_content_type.clone(),
        };
        debug!(routes = router.routes().len(), transcoders = ?self.transcoders, "application built");
        Ok(Application { router, settings: self.settings, transcoders: self.transcoders, response_defaults })
    }
}

/// A routed application, shared read-only by every connection.
#[derive(Debug)]
pub struct Application {
    router: Router,
    settings: Settings,
    transcoders: Transcoders,
    response_defaults: ResponseDefaults,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transcoders(&self) -> &Transcoders {
        &self.transcoders
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Listens on `listen_host:listen_port` and serves connections until the
    /// listener fails.
    ///
    /// Installs a `tracing` subscriber unless one is already set.
    ///
    /// # Errors
    ///
    /// Returns the error if the address can't be bound.
    pub async fn serve(self) -> io::Result<()> {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("tracing subscriber already installed");
        }

        let address = (self.settings.listen_host.as_str(), self.settings.listen_port);
        let listener = TcpListener::bind(address).await.inspect_err(|e| error!(cause = %e, "bind server error"))?;
        info!(
            address = %listener.local_addr().map_or_else(|_| "unknown".to_string(), |addr: SocketAddr| addr.to_string()),
            version = %self.settings.server_version,
            "start listening"
        );
        self.serve_listener(listener).await
    }

    /// Serves connections accepted from `listener`.
    pub async fn serve_listener(self, listener: TcpListener) -> io::Result<()> {
        let application = Arc::new(self);
        loop {
            let (tcp_stream, remote_addr) = match listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let application = Arc::clone(&application);
            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer, remote_addr.ip());
                match connection.process(application).await {
                    Ok(()) => debug!(remote = %remote_addr, "finished process, connection shutdown"),
                    Err(e) => warn!(remote = %remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

#[async_trait]
impl Dispatcher for Application {
    fn response_defaults(&self) -> ResponseDefaults {
        self.response_defaults.clone()
    }

    async fn dispatch(&self, request: Request) {
        let route = self.router.at(request.path());
        let mut ctx = RequestContext::new(self, request, route);
        lifecycle::execute(&mut ctx).await;
    }

    fn on_connection_closed(&self) {
        debug!("connection closed before a complete request arrived");
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.settings.request_timeout_ms.map(Duration::from_millis)
    }
}
