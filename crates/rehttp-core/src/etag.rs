//! Entity tags as identity proof across attempts.
//!
//! Only strong tags prove byte-for-byte identity. Weak tags (`W/"..."`) are
//! treated as absent.

use crate::headers::HeaderMap;

/// A parsed `ETag` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag {
    pub weak: bool,
    /// Opaque tag including its surrounding quotes, as sent on the wire.
    pub tag: String,
}

impl EntityTag {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.strip_prefix("W/") {
            Some(rest) => Some(Self {
                weak: true,
                tag: rest.to_string(),
            }),
            None => Some(Self {
                weak: false,
                tag: value.to_string(),
            }),
        }
    }

    pub fn is_strong(&self) -> bool {
        !self.weak
    }
}

/// Strong validator carried by a response, if any.
pub fn strong_validator(headers: &HeaderMap) -> Option<String> {
    headers
        .get("etag")
        .and_then(EntityTag::parse)
        .filter(EntityTag::is_strong)
        .map(|t| t.tag)
}
