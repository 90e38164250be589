//! Diagnostic types for content-level waylink problems.
//!
//! Malformed declarations, broken waylinks, failed fetches and duplicate identifiers never abort
//! the work around them. They degrade the one element concerned, get logged, and are collected
//! here so that authoring tools can surface them prominently.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, sync::Arc};

use crate::{error::WaylinkError, location::Location};

/// Non-fatal problem found while resolving or tracing waylinks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WayDiagnostic {
    /// A link declaration could not be parsed (no `#`, or an empty identifier).
    MalformedLink { document: Location, raw: String },

    /// A link base that is neither root-relative nor scheme-qualified.
    InvalidLinkBase { document: Location, raw: String },

    /// A well-formed waylink whose target identifier is absent from the target document.
    BrokenWaylink {
        /// Where the waylink was declared
        document: Location,
        /// Location of the document that lacks the identifier
        target: Location,
        identifier: String,
    },

    /// The target document never arrived (abort, error or timeout).
    FetchFailure { location: Location, reason: String },

    /// More than one element of a document claims the same identifier.
    DuplicateIdentifier {
        document: Location,
        identifier: String,
    },
}

impl WayDiagnostic {
    /// Build the diagnostic matching a link-parse failure, if the error is one.
    pub fn from_link_error(document: &Location, err: &WaylinkError) -> Option<WayDiagnostic> {
        match err {
            WaylinkError::MalformedLink { raw, .. } => Some(WayDiagnostic::MalformedLink {
                document: document.clone(),
                raw: raw.clone(),
            }),
            WaylinkError::InvalidLinkBase { raw, .. } => Some(WayDiagnostic::InvalidLinkBase {
                document: document.clone(),
                raw: raw.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_broken_waylink(&self) -> bool {
        matches!(self, WayDiagnostic::BrokenWaylink { .. })
    }
}

impl fmt::Display for WayDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WayDiagnostic::MalformedLink { document, raw } => {
                write!(f, "malformed link declaration '{raw}' in {document}")
            }
            WayDiagnostic::InvalidLinkBase { document, raw } => {
                write!(f, "invalid link base in declaration '{raw}' in {document}")
            }
            WayDiagnostic::BrokenWaylink {
                document,
                target,
                identifier,
            } => write!(
                f,
                "broken waylink in {document}: no element '{identifier}' in {target}"
            ),
            WayDiagnostic::FetchFailure { location, reason } => {
                write!(f, "unable to fetch {location}: {reason}")
            }
            WayDiagnostic::DuplicateIdentifier {
                document,
                identifier,
            } => write!(f, "identifier '{identifier}' is not unique in {document}"),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    seen: HashSet<WayDiagnostic>,
    ordered: Vec<WayDiagnostic>,
}

/// Shared, append-only diagnostic sink. Keeps first-report order.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics(Arc<Mutex<Recorded>>);

impl Diagnostics {
    /// Log and record `diagnostic`. A diagnostic identical to one already recorded is dropped.
    pub fn report(&self, diagnostic: WayDiagnostic) {
        let mut recorded = self.0.lock();
        if !recorded.seen.insert(diagnostic.clone()) {
            return;
        }
        tracing::warn!("{}", diagnostic);
        recorded.ordered.push(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<WayDiagnostic> {
        self.0.lock().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().ordered.is_empty()
    }

    pub(crate) fn clear(&self) {
        let mut recorded = self.0.lock();
        recorded.seen.clear();
        recorded.ordered.clear();
    }
}
