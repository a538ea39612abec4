use std::collections::BTreeMap;

use bytes::Bytes;

use crate::Value;
use crate::transcoder::{Charset, TranscodeError, Transcoder};
use crate::value::Target;

/// `application/x-www-form-urlencoded` bodies.
///
/// Encoding takes a map, writes keys in sorted order and repeats the key for
/// every element of an array value. Decoding yields a map whose values are a
/// string, or an array of strings when a key occurs more than once; pairs
/// with blank values are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormUrlEncoded;

impl FormUrlEncoded {
    pub const MIME_TYPE: &'static str = "application/x-www-form-urlencoded";
}

impl Transcoder for FormUrlEncoded {
    fn encode(&self, value: &Value) -> Result<(String, Bytes), TranscodeError> {
        let Value::Map(map) = value.normalize(Target::Text) else {
            return Err(TranscodeError::Unsupported { transcoder: "form", kind: value.kind() });
        };

        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in &map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.push((key.as_str(), scalar(item)?));
                    }
                }
                other => pairs.push((key.as_str(), scalar(other)?)),
            }
        }

        let encoded = serde_urlencoded::to_string(&pairs)
            .map_err(|e| TranscodeError::Encode { transcoder: "form", reason: e.to_string() })?;
        Ok((Charset::Utf8.content_type(Self::MIME_TYPE), Bytes::from(encoded)))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, TranscodeError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(data)
            .map_err(|e| TranscodeError::Decode { transcoder: "form", reason: e.to_string() })?;

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs.into_iter().filter(|(_, value)| !value.is_empty()) {
            grouped.entry(key).or_default().push(value);
        }

        Ok(grouped
            .into_iter()
            .map(|(key, mut values)| {
                let value = if values.len() == 1 { Value::from(values.remove(0)) } else { Value::array(values) };
                (key, value)
            })
            .collect())
    }
}

fn scalar(value: &Value) -> Result<String, TranscodeError> {
    match value {
        Value::Array(_) | Value::Set(_) | Value::Map(_) => {
            Err(TranscodeError::Unsupported { transcoder: "form", kind: value.kind() })
        }
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_with_repeated_keys() {
        let value: Value = [
            ("hello", Value::from("world")),
            ("foo", Value::from("bar")),
            ("corgie", Value::array(["one", "two", "three"])),
            ("baz", Value::from("qux")),
        ]
        .into_iter()
        .collect();

        let (content_type, body) = FormUrlEncoded.encode(&value).unwrap();
        assert_eq!(content_type, "application/x-www-form-urlencoded; charset=\"UTF-8\"");
        assert_eq!(&body[..], b"baz=qux&corgie=one&corgie=two&corgie=three&foo=bar&hello=world");
    }

    #[test]
    fn escapes_reserved_characters() {
        let value: Value = [("q", "a b&c=d"), ("path", "/x")].into_iter().collect();
        let (_, body) = FormUrlEncoded.encode(&value).unwrap();
        assert_eq!(&body[..], b"path=%2Fx&q=a+b%26c%3Dd");
    }

    #[test]
    fn decodes_single_and_repeated_values() {
        let decoded = FormUrlEncoded.decode(b"foo=bar&corgie=one&corgie=two&empty=&sp=a+b").unwrap();

        assert_eq!(decoded.get("foo"), Some(&Value::from("bar")));
        assert_eq!(decoded.get("corgie"), Some(&Value::array(["one", "two"])));
        assert_eq!(decoded.get("sp"), Some(&Value::from("a b")));
        assert_eq!(decoded.get("empty"), None);
    }

    #[test]
    fn only_maps_encode() {
        assert!(matches!(FormUrlEncoded.encode(&Value::from("x")), Err(TranscodeError::Unsupported { kind: "str", .. })));

        let nested: Value = [("a", Value::from_iter([("b", 1_i64)]))].into_iter().collect();
        assert!(matches!(FormUrlEncoded.encode(&nested), Err(TranscodeError::Unsupported { kind: "map", .. })));
    }
}
