use std::{fmt, io};

use http::status::StatusCode;
use quick_xml::events::attributes::AttrError;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum WaylinkError {
    #[error("Duplicate standing subscriber: a standing subscriber is already registered")]
    DuplicateSubscriber,
    #[error("Fetch of {location} failed: {reason}")]
    FetchFailure { location: String, reason: String },
    #[error("Invalid link base '{base}' in link declaration '{raw}'")]
    InvalidLinkBase { raw: String, base: String },
    #[error("Invalid document location: {0}")]
    InvalidLocation(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Malformed link declaration '{raw}': {reason}")]
    MalformedLink { raw: String, reason: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Document parse error: {0}")]
    Parse(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Broker state error: {0}")]
    State(String),
}

impl WaylinkError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WaylinkError::DuplicateSubscriber => StatusCode::CONFLICT,
            WaylinkError::FetchFailure { .. } => StatusCode::BAD_GATEWAY,
            WaylinkError::InvalidLinkBase { .. } => StatusCode::BAD_REQUEST,
            WaylinkError::InvalidLocation(_) => StatusCode::BAD_REQUEST,
            WaylinkError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WaylinkError::MalformedLink { .. } => StatusCode::BAD_REQUEST,
            WaylinkError::NotFound(_) => StatusCode::NOT_FOUND,
            WaylinkError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WaylinkError::PermissionDenied => StatusCode::FORBIDDEN,
            WaylinkError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WaylinkError::State(_) => StatusCode::CONFLICT,
        }
    }

    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> WaylinkError {
        WaylinkError::MalformedLink {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch_failure(location: impl fmt::Display, reason: impl fmt::Display) -> Self {
        WaylinkError::FetchFailure {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for WaylinkError {
    fn from(src: toml::de::Error) -> WaylinkError {
        WaylinkError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for WaylinkError {
    fn from(src: toml::ser::Error) -> WaylinkError {
        WaylinkError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for WaylinkError {
    fn from(src: JsonError) -> WaylinkError {
        WaylinkError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for WaylinkError {
    fn from(src: UrlParseError) -> WaylinkError {
        WaylinkError::InvalidLocation(format!("Invalid URL: {src}"))
    }
}

impl From<io::Error> for WaylinkError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => WaylinkError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => WaylinkError::PermissionDenied,
            _ => WaylinkError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<RegexError> for WaylinkError {
    fn from(x: RegexError) -> Self {
        WaylinkError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<quick_xml::Error> for WaylinkError {
    fn from(x: quick_xml::Error) -> Self {
        WaylinkError::Parse(format!("{x}"))
    }
}

impl From<AttrError> for WaylinkError {
    fn from(x: AttrError) -> Self {
        WaylinkError::Parse(format!("Malformed attribute: {x}"))
    }
}

impl From<reqwest::Error> for WaylinkError {
    fn from(x: reqwest::Error) -> Self {
        let location = x
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let reason = if x.is_timeout() {
            "request timed out".to_string()
        } else {
            format!("{x}")
        };
        WaylinkError::FetchFailure { location, reason }
    }
}
