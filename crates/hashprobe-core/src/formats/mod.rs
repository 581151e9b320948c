//! Structural content parsers
//!
//! The discovery engine only needs a handful of facts from each format: unit attributes from
//! SII/SUI, texture sources from materials, texture paths from TOBJ descriptors and per-look
//! material lists from models. [`ContentParsers`] is the seam; [`BuiltinParsers`] is the
//! implementation shipped with the crate.

use std::collections::HashMap;

use encoding_rs::UTF_8;
use thiserror::Error;

pub mod lexer;
pub mod mat;
pub mod sii;
pub mod tobj;

/// Errors raised by content parsers
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error near `{0}`")]
    Syntax(String),

    #[error("unsupported format: {0}")]
    Unsupported(&'static str),

    #[error("bad magic {found:#010x}, expected {expected:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("data truncated")]
    Truncated(#[from] std::io::Error),
}

/// One attribute value of a SII unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiiValue {
    /// Quoted string
    Str(String),
    /// Numbers, tokens, tuples, unit pointers
    Other(String),
    /// Array attribute (`key[]`)
    List(Vec<SiiValue>),
}

impl SiiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SiiValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A `class : name { ... }` block. Attribute order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiiUnit {
    pub class: String,
    pub name: String,
    pub attributes: Vec<(String, SiiValue)>,
}

impl SiiUnit {
    pub fn new(class: &str, name: &str) -> Self {
        Self {
            class: class.to_string(),
            name: name.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SiiValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Parsed SII/SUI file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiiDocument {
    pub units: Vec<SiiUnit>,
    /// `@include` targets as written
    pub includes: Vec<String>,
}

/// A texture binding declared by a material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSlot {
    /// Slot name (`texture_base`, ...); absent for legacy single-line bindings
    pub name: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl TextureSlot {
    pub fn source(&self) -> Option<&str> {
        self.attributes.get("source").map(String::as_str)
    }
}

/// Structural parsers consumed by reference extraction
pub trait ContentParsers: Send + Sync {
    fn parse_sii(&self, data: &[u8]) -> Result<SiiDocument, ParseError>;

    /// Texture paths referenced by a TOBJ descriptor
    fn parse_tobj(&self, data: &[u8]) -> Result<Vec<String>, ParseError>;

    /// Material paths for each look of a model
    fn parse_model(&self, data: &[u8]) -> Result<Vec<Vec<String>>, ParseError>;

    fn parse_material(&self, data: &[u8]) -> Result<Vec<TextureSlot>, ParseError>;
}

/// Parsers shipped with the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinParsers;

impl ContentParsers for BuiltinParsers {
    fn parse_sii(&self, data: &[u8]) -> Result<SiiDocument, ParseError> {
        if let Some(kind) = sii::binary_kind(data) {
            return Err(ParseError::Unsupported(kind));
        }
        sii::parse_document(&decode_text(data))
    }

    fn parse_tobj(&self, data: &[u8]) -> Result<Vec<String>, ParseError> {
        tobj::texture_paths(data)
    }

    fn parse_model(&self, _data: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
        Err(ParseError::Unsupported("pmd geometry"))
    }

    fn parse_material(&self, data: &[u8]) -> Result<Vec<TextureSlot>, ParseError> {
        mat::texture_slots(&decode_text(data))
    }
}

/// Decode text content as UTF-8, dropping a BOM and replacing invalid sequences
pub fn decode_text(data: &[u8]) -> String {
    let (text, _, had_errors) = UTF_8.decode(data);
    if had_errors {
        tracing::trace!("Lossy UTF-8 decode of {} bytes", data.len());
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_strips_bom() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFSiiNunit"), "SiiNunit");
        assert_eq!(decode_text(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_binary_sii_is_unsupported() {
        let parsers = BuiltinParsers;
        assert!(matches!(
            parsers.parse_sii(b"ScsC\x01\x02\x03"),
            Err(ParseError::Unsupported(_))
        ));
        assert!(matches!(
            parsers.parse_model(&[4, 0, 0, 0]),
            Err(ParseError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unit_lookup() {
        let mut unit = SiiUnit::new("accessory_data", ".x");
        unit.attributes
            .push(("icon".into(), SiiValue::Str("engine".into())));
        assert_eq!(unit.get("icon").and_then(SiiValue::as_str), Some("engine"));
        assert!(unit.get("price").is_none());
    }
}
