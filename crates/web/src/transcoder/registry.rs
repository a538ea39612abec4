use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mime::Mime;
use tracing::debug;

use crate::negotiation::{NegotiationError, parse_content_type};
use crate::transcoder::{Binary, CAPABILITIES, Charset, FormUrlEncoded, Json, MessagePack, Text, Transcoder, Yaml};

/// The application's transcoders.
///
/// Holds the registered MIME types in registration order for negotiation,
/// and a `type/subtype` index for direct lookup. Built before the server
/// starts and read-only afterwards.
#[derive(Clone, Default)]
pub struct Transcoders {
    negotiable: Vec<Mime>,
    by_type: HashMap<String, Arc<dyn Transcoder>>,
}

impl Transcoders {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock registry: HTML and plain text, octet streams, form data,
    /// JSON, then MessagePack and YAML when this build supports them.
    pub fn with_defaults() -> Self {
        let mut transcoders = Self::new();
        transcoders.insert(mime::TEXT_HTML, Arc::new(Text::new(mime::TEXT_HTML.essence_str(), Charset::Utf8)));
        transcoders.insert(mime::TEXT_PLAIN, Arc::new(Text::default()));
        transcoders.insert(mime::APPLICATION_OCTET_STREAM, Arc::new(Binary));
        transcoders.insert(mime::APPLICATION_WWW_FORM_URLENCODED, Arc::new(FormUrlEncoded));
        transcoders.insert(mime::APPLICATION_JSON, Arc::new(Json));

        if CAPABILITIES.msgpack
            && let Ok(transcoder) = MessagePack::new()
            && let Ok(mime) = MessagePack::MIME_TYPE.parse()
        {
            transcoders.insert(mime, Arc::new(transcoder));
        }
        if CAPABILITIES.yaml
            && let Ok(transcoder) = Yaml::new()
            && let Ok(mime) = Yaml::MIME_TYPE.parse()
        {
            transcoders.insert(mime, Arc::new(transcoder));
        }
        debug!(registered = ?transcoders, "built default transcoders");
        transcoders
    }

    /// Registers a transcoder, replacing any previous one for the same
    /// `type/subtype` while keeping its negotiation position.
    ///
    /// # Errors
    ///
    /// Fails if `mime_type` is not a valid media type.
    pub fn register(&mut self, mime_type: &str, transcoder: impl Transcoder + 'static) -> Result<(), NegotiationError> {
        let mime = parse_content_type(mime_type)?;
        self.insert(mime, Arc::new(transcoder));
        Ok(())
    }

    fn insert(&mut self, mime: Mime, transcoder: Arc<dyn Transcoder>) {
        let essence = key(&mime);
        if self.by_type.insert(essence.clone(), transcoder).is_none() {
            self.negotiable.push(mime);
        } else if let Some(slot) = self.negotiable.iter_mut().find(|registered| key(registered) == essence) {
            *slot = mime;
        }
    }

    /// Looks up the transcoder for a content type; parameters are ignored.
    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn Transcoder>> {
        let mime = parse_content_type(content_type).ok()?;
        self.by_type.get(&key(&mime))
    }

    /// Registered MIME types, in negotiation order.
    pub fn negotiable(&self) -> &[Mime] {
        &self.negotiable
    }

    pub fn len(&self) -> usize {
        self.negotiable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.negotiable.is_empty()
    }
}

impl fmt::Debug for Transcoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.negotiable.iter().map(Mime::essence_str)).finish()
    }
}

fn key(mime: &Mime) -> String {
    mime.essence_str().to_ascii_lowercase()
}
