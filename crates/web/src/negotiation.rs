//! Content negotiation.
//!
//! [`select_content_type`] picks the registered type that best satisfies a
//! list of media ranges from an `Accept` header:
//!
//! 1. ranges are tried in descending quality, candidates in registration order
//! 2. a candidate equal to a range, parameters included, wins immediately
//! 3. otherwise the best partial match wins: higher quality first, then
//!    `type/subtype` over `type/*` over `*/*`, then the candidate whose
//!    parameters differ least from the range
//!
//! A range with `q=0` marks everything it matches as unacceptable.

use std::cmp::Ordering;
use std::str::FromStr;

use mime::Mime;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("invalid media type {value:?}")]
    InvalidMediaType { value: String },

    #[error("none of the registered content types is acceptable")]
    NoMatch,

    #[error("can't transcode a Content-Type of {content_type}")]
    UnsupportedContentType { content_type: String },
}

/// One element of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    mime: Mime,
    quality: f32,
}

impl MediaRange {
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn is_type_wildcard(&self) -> bool {
        self.mime.type_() == mime::STAR
    }

    fn is_subtype_wildcard(&self) -> bool {
        self.mime.subtype() == mime::STAR
    }

    fn matches(&self, candidate: &Mime) -> bool {
        (self.is_type_wildcard() || self.mime.type_() == candidate.type_())
            && (self.is_subtype_wildcard() || self.mime.subtype() == candidate.subtype())
    }

    fn match_type(&self) -> MatchType {
        if self.is_type_wildcard() && self.is_subtype_wildcard() {
            MatchType::Wildcard
        } else if self.is_subtype_wildcard() {
            MatchType::Partial
        } else {
            MatchType::FullType
        }
    }
}

impl FromStr for MediaRange {
    type Err = NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NegotiationError::InvalidMediaType { value: s.to_string() };
        let mime = parse_content_type(s)?;
        let quality = match mime.get_param("q") {
            Some(q) => q.as_str().parse::<f32>().map_err(|_| invalid())?,
            None => 1.0,
        };
        if !(0.0..=1.0).contains(&quality) {
            return Err(invalid());
        }
        Ok(MediaRange { mime, quality })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchType {
    FullType,
    Partial,
    Wildcard,
}

/// Parses a `Content-Type` style value.
pub fn parse_content_type(value: &str) -> Result<Mime, NegotiationError> {
    value.trim().parse::<Mime>().map_err(|_| NegotiationError::InvalidMediaType { value: value.to_string() })
}

/// Parses an `Accept` header, skipping malformed elements.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .map(str::trim)
        .filter(|element| !element.is_empty())
        .filter_map(|element| match element.parse::<MediaRange>() {
            Ok(range) => Some(range),
            Err(e) => {
                debug!(cause = %e, "skipping media range");
                None
            }
        })
        .collect()
}

/// Parses a quality list such as `Accept-Language` or `Accept-Encoding`,
/// returning the values by descending quality. Values with `q=0` are left
/// out.
pub fn parse_quality_list(header: &str) -> Vec<String> {
    let mut values: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|element| {
            let mut parts = element.split(';').map(str::trim);
            let value = parts.next().filter(|value| !value.is_empty())?;
            let mut quality = 1.0_f32;
            for param in parts {
                if let Some((name, q)) = param.split_once('=')
                    && name.trim().eq_ignore_ascii_case("q")
                {
                    quality = q.trim().parse().ok()?;
                }
            }
            (quality > 0.0).then(|| (value.to_string(), quality))
        })
        .collect();
    values.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    values.into_iter().map(|(value, _)| value).collect()
}

/// Selects the best of `available` for the `requested` ranges.
///
/// # Errors
///
/// Returns [`NegotiationError::NoMatch`] if nothing acceptable is available.
pub fn select_content_type<'a>(requested: &[MediaRange], available: &'a [Mime]) -> Result<&'a Mime, NegotiationError> {
    let mut ranges: Vec<&MediaRange> = requested.iter().collect();
    ranges.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));

    let rejected = |candidate: &Mime| ranges.iter().any(|range| range.quality <= 0.0 && range.matches(candidate));

    let mut matches = Vec::new();
    for range in ranges.iter().filter(|range| range.quality > 0.0) {
        for candidate in available.iter().filter(|candidate| range.matches(candidate)) {
            if rejected(candidate) {
                continue;
            }
            if range.match_type() == MatchType::FullType && params(candidate) == params(&range.mime) {
                return Ok(candidate);
            }
            matches.push((range, candidate, range.match_type(), parameter_distance(candidate, &range.mime)));
        }
    }

    matches.sort_by(|a, b| {
        b.0.quality.partial_cmp(&a.0.quality).unwrap_or(Ordering::Equal).then(a.2.cmp(&b.2)).then(a.3.cmp(&b.3))
    });
    matches.first().map(|(_, candidate, _, _)| *candidate).ok_or(NegotiationError::NoMatch)
}

/// Resolves the response content type for an `Accept` header.
///
/// An absent, blank or `*/*` header means `default_content_type`, which is
/// also returned when nothing acceptable is available.
pub fn negotiate(accept: Option<&str>, default_content_type: &str, available: &[Mime]) -> String {
    let accept = match accept.map(str::trim) {
        None | Some("" | "*/*") => default_content_type,
        Some(accept) => accept,
    };
    match select_content_type(&parse_accept(accept), available) {
        Ok(selected) => selected.essence_str().to_string(),
        Err(e) => {
            debug!(cause = %e, accept, "falling back to the default content type");
            default_content_type.to_string()
        }
    }
}

fn params(mime: &Mime) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = mime
        .params()
        .filter(|(name, _)| *name != "q")
        .map(|(name, value)| (name.as_str().to_ascii_lowercase(), value.as_str().to_string()))
        .collect();
    params.sort();
    params
}

/// How many candidate parameters the range does not agree with.
fn parameter_distance(candidate: &Mime, range: &Mime) -> i32 {
    let wanted = params(range);
    let mut distance = 0;
    for (name, value) in params(candidate) {
        match wanted.iter().find(|(wanted_name, _)| *wanted_name == name) {
            Some((_, wanted_value)) if *wanted_value == value => {}
            Some(_) => distance += 2,
            None => distance += 1,
        }
    }
    distance
}
