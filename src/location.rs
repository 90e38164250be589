use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::WaylinkError;

/// Strip everything from the last `#` onward.
pub fn defragment(uri: &str) -> &str {
    match uri.rfind('#') {
        Some(idx) => &uri[..idx],
        None => uri,
    }
}

/// A normalized, absolute, fragment-free document reference.
///
/// Two locations are equal iff their normalized string forms are equal. Normalization is
/// idempotent: re-normalizing a `Location` yields the same string. Use this type (never a raw
/// string) wherever a document reference is compared or used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    /// Normalize an absolute reference.
    pub fn parse(reference: &str) -> Result<Location, WaylinkError> {
        let url = Url::parse(reference)?;
        Ok(Location::from_url(url))
    }

    /// Resolve a possibly-relative reference against `base` (usually the hosting document's own
    /// location) and normalize the result.
    pub fn normalize(reference: &str, base: &Location) -> Result<Location, WaylinkError> {
        let url = base.to_url()?.join(reference)?;
        Ok(Location::from_url(url))
    }

    pub fn from_url(mut url: Url) -> Location {
        url.set_fragment(None);
        Location(url.into())
    }

    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Location, WaylinkError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Url::from_file_path(&absolute)
            .map(Location::from_url)
            .map_err(|_| WaylinkError::InvalidLocation(format!("{absolute:?}")))
    }

    pub fn to_url(&self) -> Result<Url, WaylinkError> {
        Ok(Url::parse(&self.0)?)
    }

    pub fn to_file_path(&self) -> Result<PathBuf, WaylinkError> {
        self.to_url()?
            .to_file_path()
            .map_err(|_| WaylinkError::InvalidLocation(format!("{self} is not a file location")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Whether the location lives on the local filesystem (`file:` scheme).
    pub fn is_local(&self) -> bool {
        self.scheme() == "file"
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Location {
    type Error = WaylinkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Location::parse(&value)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> String {
        location.0
    }
}
