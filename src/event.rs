use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::trace::LegId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    /// A leg was discovered for the first time. `origin` is `None` for the root leg.
    Opened { leg: LegId, origin: Option<LegId> },
    /// Resolution of a leg against its fetched target document began.
    Resolved { leg: LegId, origin: Option<LegId> },
    /// The leg's target sits inside a branch that was already traced; no re-trace.
    Covered { leg: LegId },
    /// The leg's target identifier is missing, or its document never arrived.
    Broken { leg: LegId },
    Shut { leg: LegId },
}

impl TraceEventKind {
    pub fn leg(&self) -> &LegId {
        match self {
            TraceEventKind::Opened { leg, .. } => leg,
            TraceEventKind::Resolved { leg, .. } => leg,
            TraceEventKind::Covered { leg } => leg,
            TraceEventKind::Broken { leg } => leg,
            TraceEventKind::Shut { leg } => leg,
        }
    }
}

/// One entry of the trace log. `seq` is strictly increasing in log order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub seq: usize,
    pub kind: TraceEventKind,
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.kind {
            TraceEventKind::Opened { leg, .. } => write!(f, "[{}] Opened {leg}", self.seq),
            TraceEventKind::Resolved { leg, .. } => write!(f, "[{}] Resolved {leg}", self.seq),
            TraceEventKind::Covered { leg } => write!(f, "[{}] Covered {leg}", self.seq),
            TraceEventKind::Broken { leg } => write!(f, "[{}] Broken {leg}", self.seq),
            TraceEventKind::Shut { leg } => write!(f, "[{}] Shut {leg}", self.seq),
        }
    }
}
