//! Named record codecs.
//!
//! Records travel as newline-framed text. A [`Parser`] decodes one frame into
//! a record and a [`Formatter`] encodes one record into a frame. Codecs are
//! looked up by name in a [`CodecRegistry`]; `$default` and `ndjson` are the
//! built-in newline-delimited JSON pair.

use crate::flow::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the codec used when none is requested.
pub const DEFAULT_CODEC: &str = "$default";
/// Name of the newline-delimited JSON codec.
pub const NDJSON_CODEC: &str = "ndjson";

/// Errors that can occur while encoding or decoding records.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A frame could not be decoded into a record.
    #[error("Failed to decode record: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
    /// A record could not be encoded.
    #[error("Failed to encode record: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    /// No parser is registered under the name.
    #[error("Unknown parser: {}", _0)]
    UnknownParser(String),
    /// No formatter is registered under the name.
    #[error("Unknown formatter: {}", _0)]
    UnknownFormatter(String),
}

/// How undecodable input frames are treated.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Drop the frame and continue.
    #[default]
    Lenient,
    /// Stop the channel with an error.
    Strict,
}

/// Decodes a single frame into a record.
pub trait Parser: Send + Sync {
    /// Decodes one frame. The frame excludes its trailing newline.
    fn parse(&self, frame: &[u8]) -> Result<Record, Error>;
}

/// Encodes a single record into a frame.
pub trait Formatter: Send + Sync {
    /// Appends the encoded record, including its trailing newline, to `buf`.
    fn format(&self, record: &Record, buf: &mut Vec<u8>) -> Result<(), Error>;
}

/// Newline-delimited JSON codec: one JSON value per line.
#[derive(Debug, Clone, Default)]
pub struct NdJson {
    /// Text written before every encoded record.
    pub line_prefix: String,
}

impl Parser for NdJson {
    fn parse(&self, frame: &[u8]) -> Result<Record, Error> {
        serde_json::from_slice(frame).map_err(|e| Error::Decode { source: e })
    }
}

impl Formatter for NdJson {
    fn format(&self, record: &Record, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.extend_from_slice(self.line_prefix.as_bytes());
        serde_json::to_writer(&mut *buf, record).map_err(|e| Error::Encode { source: e })?;
        buf.push(b'\n');
        Ok(())
    }
}

/// Parsers and formatters by name.
#[derive(Clone)]
pub struct CodecRegistry {
    parsers: BTreeMap<String, Arc<dyn Parser>>,
    formatters: BTreeMap<String, Arc<dyn Formatter>>,
}

impl Default for CodecRegistry {
    /// Registry holding the built-in NDJSON codec under `$default` and `ndjson`.
    fn default() -> Self {
        let ndjson = Arc::new(NdJson::default());
        let mut registry = Self::empty();
        for name in [DEFAULT_CODEC, NDJSON_CODEC] {
            registry.register_parser(name, ndjson.clone());
            registry.register_formatter(name, ndjson.clone());
        }
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .field("formatters", &self.formatters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CodecRegistry {
    /// Registry without any codecs.
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
            formatters: BTreeMap::new(),
        }
    }

    /// Registers a parser, replacing any parser with the same name.
    pub fn register_parser(&mut self, name: &str, parser: Arc<dyn Parser>) {
        self.parsers.insert(name.to_string(), parser);
    }

    /// Registers a formatter, replacing any formatter with the same name.
    pub fn register_formatter(&mut self, name: &str, formatter: Arc<dyn Formatter>) {
        self.formatters.insert(name.to_string(), formatter);
    }

    /// Looks up a parser by name.
    pub fn parser(&self, name: &str) -> Result<Arc<dyn Parser>, Error> {
        self.parsers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownParser(name.to_string()))
    }

    /// Looks up a formatter by name.
    pub fn formatter(&self, name: &str) -> Result<Arc<dyn Formatter>, Error> {
        self.formatters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownFormatter(name.to_string()))
    }

    /// The parser/formatter pair used for logger and metrics sinks.
    pub fn default_pair(&self) -> Result<(Arc<dyn Parser>, Arc<dyn Formatter>), Error> {
        Ok((self.parser(DEFAULT_CODEC)?, self.formatter(DEFAULT_CODEC)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ndjson_roundtrip_values() {
        let codec = NdJson::default();
        let samples = [
            json!({"a": 1, "b": [true, null, "x"], "c": {"d": 1.5}}),
            json!([1, 2, 3]),
            json!("line\nbreak"),
            json!(null),
            json!(-42),
        ];
        for record in samples {
            let mut buf = Vec::new();
            codec.format(&record, &mut buf).unwrap();
            assert_eq!(buf.last(), Some(&b'\n'));
            assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
            let decoded = codec.parse(&buf[..buf.len() - 1]).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_ndjson_parse_invalid() {
        let codec = NdJson::default();
        let result = codec.parse(b"not valid json");
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_ndjson_line_prefix() {
        let codec = NdJson {
            line_prefix: "data: ".to_string(),
        };
        let mut buf = Vec::new();
        codec.format(&json!({"a": 1}), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "data: {\"a\":1}\n");
    }

    #[test]
    fn test_default_registry_lookup() {
        let registry = CodecRegistry::default();
        assert!(registry.parser("$default").is_ok());
        assert!(registry.formatter("ndjson").is_ok());
        assert!(registry.default_pair().is_ok());
        assert!(matches!(
            registry.parser("csv"),
            Err(Error::UnknownParser(name)) if name == "csv"
        ));
        assert!(matches!(
            registry.formatter("csv"),
            Err(Error::UnknownFormatter(name)) if name == "csv"
        ));
    }

    #[test]
    fn test_register_custom_formatter() {
        let mut registry = CodecRegistry::empty();
        registry.register_formatter(
            "sse",
            Arc::new(NdJson {
                line_prefix: "data: ".to_string(),
            }),
        );
        assert!(registry.formatter("sse").is_ok());
        assert!(registry.formatter(DEFAULT_CODEC).is_err());
    }

    #[test]
    fn test_decode_policy_deserialize() {
        let policy: DecodePolicy = serde_json::from_value(json!("strict")).unwrap();
        assert_eq!(policy, DecodePolicy::Strict);
        assert_eq!(DecodePolicy::default(), DecodePolicy::Lenient);
    }
}
