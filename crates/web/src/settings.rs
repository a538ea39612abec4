use std::collections::BTreeMap;

use serde::Deserialize;

/// Application configuration.
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes. Keys not listed here are collected into `extra`, which is what
/// [`RequestContext::require_setting`](crate::RequestContext::require_setting)
/// looks at.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Used when the request has no usable `Accept` header.
    pub default_content_type: String,
    pub default_language: String,
    pub default_encoding: String,
    /// Include stack traces in error responses.
    pub serve_traceback: bool,
    pub server_name: String,
    pub server_version: String,
    pub listen_host: String,
    pub listen_port: u16,
    /// Cancel requests that take longer than this.
    pub request_timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_content_type: "text/html; charset=UTF-8".to_string(),
            default_language: "en".to_string(),
            default_encoding: "identity".to_string(),
            serve_traceback: false,
            server_name: "quill-http".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8000,
            request_timeout_ms: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON object.
    ///
    /// # Errors
    ///
    /// Fails if the document is not an object or a known key has the wrong
    /// type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// An application specific setting.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// The `Server` response header.
    pub fn server_header(&self) -> String {
        format!("{}/{}", self.server_name, self.server_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_content_type, "text/html; charset=UTF-8");
        assert!(!settings.serve_traceback);
        assert_eq!(settings.listen_port, 8000);
        assert_eq!(settings.server_header(), format!("quill-http/{}", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn from_json_keeps_unknown_keys() {
        let settings = Settings::from_json(indoc! {r#"
            {
                "serve_traceback": true,
                "listen_port": 9000,
                "request_timeout_ms": 250,
                "database_url": "postgres://localhost/app"
            }
        "#})
        .unwrap();

        assert!(settings.serve_traceback);
        assert_eq!(settings.listen_port, 9000);
        assert_eq!(settings.request_timeout_ms, Some(250));
        assert_eq!(settings.default_language, "en");
        assert_eq!(settings.get("database_url").and_then(serde_json::Value::as_str), Some("postgres://localhost/app"));
    }

    #[test]
    fn from_json_rejects_wrong_types() {
        assert!(Settings::from_json(r#"{"listen_port": "eighty"}"#).is_err());
        assert!(Settings::from_json("[]").is_err());
    }
}
