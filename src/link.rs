//! Parsing of waylink declarations.
//!
//! A declaration has the form `[<base>]#<identifier>`. The base is empty (the target lives in
//! the declaring document), a root-relative path starting with a single `/`, or a full
//! scheme-qualified URI. A base ending in `/` names a directory and gets the default document
//! filename appended.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::WayConfig,
    error::WaylinkError,
    location::{defragment, Location},
};

static FULL_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]*$").expect("static regex"));

/// Parsed form of one link declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttribute {
    pub raw: String,
    /// Empty when the target is in the same document.
    pub target_location: String,
    /// Never empty.
    pub target_id: String,
}

impl LinkAttribute {
    pub fn parse(raw: &str, config: &WayConfig) -> Result<LinkAttribute, WaylinkError> {
        let base = defragment(raw);
        if base.len() == raw.len() {
            return Err(WaylinkError::malformed(raw, "missing '#' delimiter"));
        }
        let target_id = &raw[base.len() + 1..];
        if target_id.is_empty() {
            return Err(WaylinkError::malformed(raw, "empty target identifier"));
        }

        let mut target_location = String::new();
        if !base.is_empty() {
            if base.starts_with('/') && !base.starts_with("//") {
                target_location.push_str(config.root_path.trim_end_matches('/'));
                target_location.push_str(base);
            } else if FULL_URI.is_match(base) {
                target_location.push_str(base);
            } else {
                return Err(WaylinkError::InvalidLinkBase {
                    raw: raw.to_string(),
                    base: base.to_string(),
                });
            }
            if target_location.ends_with('/') {
                target_location.push_str(&config.default_filename);
            }
        }

        Ok(LinkAttribute {
            raw: raw.to_string(),
            target_location,
            target_id: target_id.to_string(),
        })
    }

    pub fn is_same_document(&self) -> bool {
        self.target_location.is_empty()
    }

    /// Href-like destination reference: `<location>#<identifier>`.
    pub fn href(&self) -> String {
        format!("{}#{}", self.target_location, self.target_id)
    }

    /// Normalized location of the target document, `current` being the declaring document.
    pub fn resolve_location(&self, current: &Location) -> Result<Location, WaylinkError> {
        if self.is_same_document() {
            Ok(current.clone())
        } else {
            Location::normalize(&self.target_location, current)
        }
    }
}
