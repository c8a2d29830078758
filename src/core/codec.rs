//! core::codec
//!
//! Encoding of metadata trees to and from their persisted text form.
//!
//! # Format
//!
//! Trees are persisted as a self-describing JSON envelope:
//!
//! ```json
//! {"kind":"metalchemy.metadata","schema_version":1,"tree":{"attr":"hello"}}
//! ```
//!
//! - `kind` identifies the payload and is checked before anything else
//! - `schema_version` is dispatched on before the tree is parsed
//! - Unknown envelope fields are rejected
//!
//! Mapping keys are emitted in sorted order, so the compact form is
//! canonical and suitable for fingerprinting.
//!
//! # Legacy Columns
//!
//! Columns written before the envelope existed hold a bare JSON object.
//! A codec built with `accept_legacy` decodes those as the tree itself.
//!
//! # Example
//!
//! ```
//! use metalchemy::core::codec::{Codec, JsonCodec};
//! use metalchemy::core::tree::RawTree;
//! use metalchemy::core::types::FieldPath;
//! use serde_json::json;
//!
//! let codec = JsonCodec::default();
//! let mut tree = RawTree::new();
//! tree.set(&FieldPath::parse("attr").unwrap(), json!("hello")).unwrap();
//!
//! let text = codec.encode(&tree).unwrap();
//! assert_eq!(codec.decode(&text).unwrap(), tree);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::tree::{NodeKind, RawTree};

/// The kind identifier for persisted metadata.
pub const METADATA_KIND: &str = "metalchemy.metadata";

/// Current envelope schema version.
pub const SCHEMA_VERSION: u64 = 1;

/// Errors from encoding or decoding a persisted tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed metadata text: {0}")]
    Malformed(String),

    #[error("invalid kind '{found}', expected '{}'", METADATA_KIND)]
    InvalidKind { found: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u64),

    #[error("incompatible metadata: {0}")]
    Incompatible(String),

    #[error("failed to serialize metadata: {0}")]
    Serialize(String),
}

/// Encode/decode pair for persisted trees.
pub trait Codec {
    /// Encode a tree to its persisted text.
    fn encode(&self, tree: &RawTree) -> Result<String, CodecError>;

    /// Decode persisted text into a tree.
    ///
    /// Never substitutes an empty tree for unreadable input.
    fn decode(&self, text: &str) -> Result<RawTree, CodecError>;
}

/// Layout of encoded text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Single line, canonical.
    #[default]
    Compact,
    /// Indented, for columns humans read.
    Pretty,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    kind: &'a str,
    schema_version: u64,
    tree: &'a Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvelopeV1 {
    #[allow(dead_code)]
    kind: String,
    #[allow(dead_code)]
    schema_version: u64,
    tree: Value,
}

/// JSON envelope codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec {
    format: OutputFormat,
    accept_legacy: bool,
}

impl JsonCodec {
    pub fn new(format: OutputFormat, accept_legacy: bool) -> Self {
        Self {
            format,
            accept_legacy,
        }
    }

    /// A compact codec that also reads bare legacy objects.
    pub fn legacy() -> Self {
        Self::new(OutputFormat::Compact, true)
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn accepts_legacy(&self) -> bool {
        self.accept_legacy
    }

    fn decode_legacy(&self, value: Value) -> Result<RawTree, CodecError> {
        tracing::debug!("decoding metadata column without envelope");
        RawTree::from_value(value).map_err(|e| CodecError::Incompatible(e.to_string()))
    }
}

/// True if `value` has the shape of an envelope: `kind`, `schema_version`
/// and `tree`, and nothing else.
fn is_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.len() == 3
            && map.get("kind").is_some_and(Value::is_string)
            && map.get("schema_version").is_some_and(Value::is_u64)
            && map.contains_key("tree")
    })
}

impl Codec for JsonCodec {
    fn encode(&self, tree: &RawTree) -> Result<String, CodecError> {
        let envelope = EnvelopeRef {
            kind: METADATA_KIND,
            schema_version: SCHEMA_VERSION,
            tree: tree.as_value(),
        };
        let encoded = match self.format {
            OutputFormat::Compact => serde_json::to_string(&envelope),
            OutputFormat::Pretty => serde_json::to_string_pretty(&envelope),
        };
        encoded.map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<RawTree, CodecError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;

        if self.accept_legacy && value.is_object() && !is_envelope(&value) {
            return self.decode_legacy(value);
        }

        // Validate kind
        let kind = value.get("kind").and_then(Value::as_str);
        if kind != Some(METADATA_KIND) {
            return Err(match kind {
                Some(found) => CodecError::InvalidKind {
                    found: found.to_string(),
                },
                None => CodecError::Incompatible(format!(
                    "expected a '{}' envelope, found a bare {}",
                    METADATA_KIND,
                    NodeKind::of(&value)
                )),
            });
        }

        // Dispatch based on version
        let version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| CodecError::Incompatible("missing schema_version".into()))?;

        match version {
            1 => {
                let envelope: EnvelopeV1 = serde_json::from_value(value)
                    .map_err(|e| CodecError::Incompatible(e.to_string()))?;
                RawTree::from_value(envelope.tree)
                    .map_err(|e| CodecError::Incompatible(e.to_string()))
            }
            v => Err(CodecError::UnsupportedVersion(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldPath;
    use serde_json::json;

    fn tree(value: Value) -> RawTree {
        RawTree::from_value(value).unwrap()
    }

    mod encode {
        use super::*;

        #[test]
        fn compact_is_canonical() {
            let codec = JsonCodec::default();
            let t = tree(json!({"b": [true, null], "a": 1}));
            assert_eq!(
                codec.encode(&t).unwrap(),
                r#"{"kind":"metalchemy.metadata","schema_version":1,"tree":{"a":1,"b":[true,null]}}"#
            );
        }

        #[test]
        fn compact_is_deterministic() {
            let codec = JsonCodec::default();
            let t = tree(json!({"z": {"y": 1, "x": 2}, "a": "s"}));
            assert_eq!(codec.encode(&t).unwrap(), codec.encode(&t.clone()).unwrap());
        }

        #[test]
        fn pretty_decodes_to_same_tree() {
            let codec = JsonCodec::new(OutputFormat::Pretty, false);
            let t = tree(json!({"a": {"b": [1, 2.5, "x"]}}));
            let text = codec.encode(&t).unwrap();
            assert!(text.contains('\n'));
            assert_eq!(codec.decode(&text).unwrap(), t);
        }
    }

    mod decode {
        use super::*;

        #[test]
        fn roundtrip_preserves_scalar_types() {
            let codec = JsonCodec::default();
            let t = tree(json!({
                "int": 10,
                "neg": -3,
                "float": 0.1,
                "bool": false,
                "null": null,
                "empty_str": "",
                "seq": [1, "1", [1], {"1": 1}],
            }));
            let decoded = codec.decode(&codec.encode(&t).unwrap()).unwrap();
            assert_eq!(decoded, t);
            assert!(decoded.get(&FieldPath::parse("int").unwrap()).unwrap().is_i64());
            assert!(decoded.get(&FieldPath::parse("float").unwrap()).unwrap().is_f64());
        }

        #[test]
        fn malformed_text() {
            let codec = JsonCodec::default();
            assert!(matches!(
                codec.decode("{not json"),
                Err(CodecError::Malformed(_))
            ));
            assert!(matches!(codec.decode(""), Err(CodecError::Malformed(_))));
        }

        #[test]
        fn invalid_kind() {
            let codec = JsonCodec::default();
            let err = codec
                .decode(r#"{"kind":"other","schema_version":1,"tree":{}}"#)
                .unwrap_err();
            assert_eq!(
                err,
                CodecError::InvalidKind {
                    found: "other".into()
                }
            );
        }

        #[test]
        fn unsupported_version() {
            let codec = JsonCodec::default();
            let err = codec
                .decode(r#"{"kind":"metalchemy.metadata","schema_version":2,"tree":{}}"#)
                .unwrap_err();
            assert_eq!(err, CodecError::UnsupportedVersion(2));
        }

        #[test]
        fn missing_version() {
            let codec = JsonCodec::default();
            assert!(matches!(
                codec.decode(r#"{"kind":"metalchemy.metadata","tree":{}}"#),
                Err(CodecError::Incompatible(_))
            ));
        }

        #[test]
        fn unknown_envelope_fields_rejected() {
            let codec = JsonCodec::default();
            let text = r#"{"kind":"metalchemy.metadata","schema_version":1,"tree":{},"extra":1}"#;
            assert!(matches!(
                codec.decode(text),
                Err(CodecError::Incompatible(_))
            ));
        }

        #[test]
        fn non_mapping_tree_rejected() {
            let codec = JsonCodec::default();
            let text = r#"{"kind":"metalchemy.metadata","schema_version":1,"tree":[1]}"#;
            assert!(matches!(
                codec.decode(text),
                Err(CodecError::Incompatible(_))
            ));
        }

        #[test]
        fn bare_object_rejected_without_legacy() {
            let codec = JsonCodec::default();
            assert!(matches!(
                codec.decode(r#"{"attr":"hello"}"#),
                Err(CodecError::Incompatible(_))
            ));
        }

        #[test]
        fn bare_object_accepted_with_legacy() {
            let codec = JsonCodec::legacy();
            let t = codec.decode(r#"{"attr":"hello"}"#).unwrap();
            assert_eq!(t.as_value(), &json!({"attr": "hello"}));
        }

        #[test]
        fn legacy_still_rejects_non_objects() {
            let codec = JsonCodec::legacy();
            assert!(codec.decode("[1,2]").is_err());
            assert!(codec.decode("null").is_err());
        }

        #[test]
        fn legacy_object_with_kind_key() {
            let codec = JsonCodec::legacy();
            let t = codec
                .decode(r#"{"kind":"metalchemy.metadata","colour":"red"}"#)
                .unwrap();
            assert_eq!(
                t.as_value(),
                &json!({"kind": "metalchemy.metadata", "colour": "red"})
            );
        }

        #[test]
        fn legacy_still_checks_envelope_kind() {
            let codec = JsonCodec::legacy();
            assert!(matches!(
                codec.decode(r#"{"kind":"other","schema_version":1,"tree":{}}"#),
                Err(CodecError::InvalidKind { .. })
            ));
        }

        #[test]
        fn legacy_still_reads_envelope() {
            let codec = JsonCodec::legacy();
            let t = codec
                .decode(r#"{"kind":"metalchemy.metadata","schema_version":1,"tree":{"a":1}}"#)
                .unwrap();
            assert_eq!(t.as_value(), &json!({"a": 1}));
        }
    }

    #[test]
    fn error_display() {
        let err = CodecError::InvalidKind {
            found: "nope".into(),
        };
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains(METADATA_KIND));

        let err = CodecError::UnsupportedVersion(9);
        assert!(err.to_string().contains('9'));
    }
}
