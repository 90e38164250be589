use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
};

use crate::location::Location;

/// One unit of traversal work: fully explore the branch rooted at `identifier` within the
/// document at `location`. Displays as `<location>#<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId {
    pub location: Location,
    pub identifier: String,
}

impl LegId {
    pub fn new(location: &Location, identifier: &str) -> LegId {
        LegId {
            location: location.clone(),
            identifier: identifier.to_string(),
        }
    }
}

impl Display for LegId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.location, self.identifier)
    }
}

/// The open (in progress) and shut (complete) leg sets.
///
/// A leg is in at most one set, is opened at most once, and once shut is never reopened.
#[derive(Debug, Default, Clone)]
pub struct LegSets {
    open: HashSet<LegId>,
    shut: HashSet<LegId>,
}

impl LegSets {
    /// Open `leg`. Returns false (and changes nothing) if it was ever opened before.
    pub fn open(&mut self, leg: &LegId) -> bool {
        if self.is_known(leg) {
            return false;
        }
        self.open.insert(leg.clone())
    }

    /// Move `leg` from open to shut. Returns false if it was already shut.
    pub fn shut(&mut self, leg: &LegId) -> bool {
        if self.shut.contains(leg) {
            return false;
        }
        if !self.open.remove(leg) {
            tracing::warn!("Shutting leg {} that was never opened", leg);
        }
        self.shut.insert(leg.clone())
    }

    pub fn is_open(&self, leg: &LegId) -> bool {
        self.open.contains(leg)
    }

    pub fn is_shut(&self, leg: &LegId) -> bool {
        self.shut.contains(leg)
    }

    pub fn is_known(&self, leg: &LegId) -> bool {
        self.is_open(leg) || self.is_shut(leg)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn shut_count(&self) -> usize {
        self.shut.len()
    }

    /// The incidental completion condition: nothing left in progress.
    pub fn is_done(&self) -> bool {
        self.open.is_empty()
    }
}
