//! Graph tracing across document boundaries.
//!
//! Starting from one root leg, the [`Tracer`] visits every leg reachable through waylink
//! declarations exactly once, fetching documents through the shared [`DocumentBroker`]. Nothing
//! ever blocks on a pending fetch: each discovered leg subscribes to its target document and the
//! trace continues when that document is delivered.
//!
//! ## Ordering invariant
//!
//! A leg is never resolved against its target document before the leg that discovered it has
//! shut. A target delivered early (typically a same-document target, delivered inline while the
//! discovering branch is still being walked) is parked against its originating leg. When that leg
//! shuts, its parked resolutions move, in arrival order, onto a FIFO queue drained by a single
//! worker task. This gives every enclosing branch the chance to finish and shut before a narrower
//! branch inside it is considered, so that the narrower one is recognized as covered instead of
//! being traced twice.
//!
//! ## Completion
//!
//! The trace is done once the open set is empty. [`Tracer::settled`] waits for that; nothing in
//! the trace itself depends on it.

use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Weak},
};
use tokio::sync::{mpsc, watch};

use crate::{
    broker::{DocumentBroker, DocumentSubscriber, Registration},
    diagnostic::WayDiagnostic,
    document::{Document, ElementId},
    error::WaylinkError,
    event::{TraceEvent, TraceEventKind},
    link::LinkAttribute,
    location::Location,
};

pub mod leg;

pub use leg::{LegId, LegSets};

/// Snapshot of a trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub root: Option<LegId>,
    /// Edges run from the originating leg to the leg it discovered.
    pub legs: DiGraph<LegId, ()>,
    pub events: Vec<TraceEvent>,
    /// Host-document branch roots on the traced way.
    pub on_way: Vec<ElementId>,
    pub broken: Vec<LegId>,
    pub open: usize,
}

impl TraceReport {
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.open == 0
    }

    /// Sequence number of the first event matching `predicate`.
    pub fn seq_of(&self, predicate: impl Fn(&TraceEventKind) -> bool) -> Option<usize> {
        self.events
            .iter()
            .find(|event| predicate(&event.kind))
            .map(|event| event.seq)
    }

    pub fn count(&self, predicate: impl Fn(&TraceEventKind) -> bool) -> usize {
        self.events
            .iter()
            .filter(|event| predicate(&event.kind))
            .count()
    }

    /// Legs that have been shut, in shut order.
    pub fn shut_legs(&self) -> Vec<&LegId> {
        self.events
            .iter()
            .filter_map(|event| match &event.kind {
                TraceEventKind::Shut { leg } => Some(leg),
                _ => None,
            })
            .collect()
    }

    /// Whether every resolution began strictly after its originating leg shut.
    pub fn respects_ordering(&self) -> bool {
        self.events.iter().all(|event| match &event.kind {
            TraceEventKind::Resolved {
                origin: Some(origin),
                ..
            } => self
                .seq_of(|kind| matches!(kind, TraceEventKind::Shut { leg } if leg == origin))
                .is_some_and(|shut| shut < event.seq),
            _ => true,
        })
    }
}

struct Resolution {
    leg: LegId,
    origin: Option<LegId>,
    target_id: String,
    document: Arc<Document>,
}

#[derive(Default)]
struct TraceState {
    root: Option<LegId>,
    legs: LegSets,
    /// Resolutions waiting for their originating leg to shut
    parked: HashMap<LegId, Vec<Resolution>>,
    on_way: BTreeSet<ElementId>,
    broken: Vec<LegId>,
    events: Vec<TraceEvent>,
    graph: DiGraph<LegId, ()>,
    nodes: HashMap<LegId, NodeIndex>,
}

impl TraceState {
    fn record(&mut self, kind: TraceEventKind) {
        tracing::trace!("{:?}", kind);
        let seq = self.events.len();
        self.events.push(TraceEvent { seq, kind });
    }

    fn node(&mut self, leg: &LegId) -> NodeIndex {
        if let Some(idx) = self.nodes.get(leg) {
            return *idx;
        }
        let idx = self.graph.add_node(leg.clone());
        self.nodes.insert(leg.clone(), idx);
        idx
    }

    fn open(&mut self, leg: &LegId, origin: Option<&LegId>) -> bool {
        if !self.legs.open(leg) {
            return false;
        }
        let sink = self.node(leg);
        if let Some(origin) = origin {
            let source = self.node(origin);
            self.graph.add_edge(source, sink, ());
        }
        self.record(TraceEventKind::Opened {
            leg: leg.clone(),
            origin: origin.cloned(),
        });
        true
    }
}

struct TraceInner {
    broker: Arc<DocumentBroker>,
    state: Mutex<TraceState>,
    queue: mpsc::UnboundedSender<Resolution>,
    open_count: watch::Sender<usize>,
}

/// Walks the waylink graph from one root leg. Cheap to clone; clones share the trace.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TraceInner>,
}

impl Tracer {
    /// Create a tracer and its resolution worker. Must be called from within a tokio runtime.
    pub fn new(broker: Arc<DocumentBroker>) -> Tracer {
        let (queue, mut rx) = mpsc::unbounded_channel::<Resolution>();
        let (open_count, _) = watch::channel(0usize);
        let inner = Arc::new(TraceInner {
            broker,
            state: Mutex::new(TraceState::default()),
            queue,
            open_count,
        });

        let worker: Weak<TraceInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(resolution) = rx.recv().await {
                let Some(inner) = worker.upgrade() else {
                    break;
                };
                inner.resolve(resolution);
            }
            tracing::debug!("Trace resolution worker finished");
        });

        Tracer { inner }
    }

    /// Start tracing from the element `root_id` of the document at `root_location`. Returns the
    /// root leg. A tracer traces a single root.
    #[tracing::instrument(skip(self), fields(root = %root_location))]
    pub fn trace(&self, root_location: &Location, root_id: &str) -> Result<LegId, WaylinkError> {
        let leg = LegId::new(root_location, root_id);
        {
            let mut state = self.inner.state.lock();
            if let Some(root) = &state.root {
                return Err(WaylinkError::State(format!(
                    "tracer already traced from {root}"
                )));
            }
            state.root = Some(leg.clone());
            state.open(&leg, None);
            self.inner.open_count.send_replace(state.legs.open_count());
        }
        tracing::info!("Tracing from {}", leg);
        self.inner.broker.fetch_or_subscribe(
            root_location,
            Arc::new(LegSubscriber {
                tracer: self.inner.clone(),
                leg: leg.clone(),
                origin: None,
                target_id: root_id.to_string(),
            }),
        );
        Ok(leg)
    }

    /// Wait until no leg is open.
    pub async fn settled(&self) {
        let mut rx = self.inner.open_count.subscribe();
        if rx.wait_for(|open| *open == 0).await.is_err() {
            tracing::warn!("Trace progress channel closed before the trace settled");
        }
    }

    pub fn is_shut(&self, leg: &LegId) -> bool {
        self.inner.state.lock().legs.is_shut(leg)
    }

    pub fn report(&self) -> TraceReport {
        let state = self.inner.state.lock();
        TraceReport {
            root: state.root.clone(),
            legs: state.graph.clone(),
            events: state.events.clone(),
            on_way: state.on_way.iter().copied().collect(),
            broken: state.broken.clone(),
            open: state.legs.open_count(),
        }
    }
}

impl TraceInner {
    /// Resolve now if the originating leg is shut, otherwise park until it is.
    fn receive(self: &Arc<Self>, resolution: Resolution) {
        if let Some(origin) = resolution.origin.clone() {
            let mut state = self.state.lock();
            if !state.legs.is_shut(&origin) {
                tracing::debug!("Deferring {} until {} shuts", resolution.leg, origin);
                state.parked.entry(origin).or_default().push(resolution);
                return;
            }
        }
        self.resolve(resolution);
    }

    fn resolve(self: &Arc<Self>, resolution: Resolution) {
        let Resolution {
            leg,
            origin,
            target_id,
            document,
        } = resolution;
        let location = document.location();
        let covered = {
            let mut state = self.state.lock();
            state.record(TraceEventKind::Resolved {
                leg: leg.clone(),
                origin: origin.clone(),
            });
            match document.element_by_identifier(&target_id) {
                None => None,
                Some(target) => Some((
                    target,
                    document
                        .ancestors(target)
                        .filter_map(|ancestor| document.identifier(ancestor))
                        .any(|id| state.legs.is_shut(&LegId::new(location, id))),
                )),
            }
        };

        match covered {
            None => {
                let declared_in = origin
                    .as_ref()
                    .map(|origin| origin.location.clone())
                    .unwrap_or_else(|| location.clone());
                self.broker
                    .diagnostics()
                    .report(WayDiagnostic::BrokenWaylink {
                        document: declared_in,
                        target: location.clone(),
                        identifier: target_id,
                    });
                self.mark_broken(&leg);
            }
            Some((_, true)) => {
                tracing::debug!("{} lies within an already traced branch", leg);
                self.state
                    .lock()
                    .record(TraceEventKind::Covered { leg: leg.clone() });
            }
            Some((target, false)) => self.trace_leg(&leg, target, &document),
        }
        self.shut(&leg);
    }

    /// Walk the branch rooted at `branch`, opening every leg it declares.
    fn trace_leg(self: &Arc<Self>, leg: &LegId, branch: ElementId, document: &Arc<Document>) {
        let location = document.location();
        if location == self.broker.host_location() {
            self.state.lock().on_way.insert(branch);
        }

        let end = document.subtree_end(branch);
        let mut cursor = branch.0;
        while cursor < end {
            let element = ElementId(cursor);
            if element != branch {
                if let Some(id) = document.identifier(element) {
                    if self.state.lock().legs.is_shut(&LegId::new(location, id)) {
                        cursor = document.subtree_end(element);
                        continue;
                    }
                }
            }
            if let Some(raw) = document.link_declaration(element) {
                self.follow(leg, raw, location);
            }
            cursor += 1;
        }
    }

    fn follow(self: &Arc<Self>, origin: &LegId, raw: &str, declared_in: &Location) {
        let link = match LinkAttribute::parse(raw, self.broker.config()) {
            Ok(link) => link,
            Err(err) => {
                if let Some(diagnostic) = WayDiagnostic::from_link_error(declared_in, &err) {
                    self.broker.diagnostics().report(diagnostic);
                }
                return;
            }
        };
        let target = match link.resolve_location(declared_in) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!("Skipping waylink '{}' in {}: {}", raw, declared_in, err);
                return;
            }
        };

        let leg = LegId::new(&target, &link.target_id);
        {
            let mut state = self.state.lock();
            if !state.open(&leg, Some(origin)) {
                return;
            }
            self.open_count.send_replace(state.legs.open_count());
        }
        self.broker.fetch_or_subscribe(
            &target,
            Arc::new(LegSubscriber {
                tracer: self.clone(),
                leg,
                origin: Some(origin.clone()),
                target_id: link.target_id,
            }),
        );
    }

    fn mark_broken(&self, leg: &LegId) {
        let mut state = self.state.lock();
        state.broken.push(leg.clone());
        state.record(TraceEventKind::Broken { leg: leg.clone() });
    }

    /// Shut `leg` and release the resolutions parked against it onto the worker queue.
    fn shut(&self, leg: &LegId) {
        let parked = {
            let mut state = self.state.lock();
            if !state.legs.shut(leg) {
                return;
            }
            state.record(TraceEventKind::Shut { leg: leg.clone() });
            let parked = state.parked.remove(leg).unwrap_or_default();
            self.open_count.send_replace(state.legs.open_count());
            parked
        };
        for resolution in parked {
            if self.queue.send(resolution).is_err() {
                tracing::error!("Trace resolution worker is gone; {} left unresolved", leg);
            }
        }
    }
}

struct LegSubscriber {
    tracer: Arc<TraceInner>,
    leg: LegId,
    origin: Option<LegId>,
    target_id: String,
}

impl DocumentSubscriber for LegSubscriber {
    fn on_document(&self, _registration: &Registration, document: &Arc<Document>) {
        self.tracer.receive(Resolution {
            leg: self.leg.clone(),
            origin: self.origin.clone(),
            target_id: self.target_id.clone(),
            document: document.clone(),
        });
    }

    fn on_close(&self, registration: &Registration) {
        if registration.document.is_none() {
            tracing::warn!(
                "Leg {} is unresolvable: {} never arrived",
                self.leg,
                registration.location
            );
            self.tracer.mark_broken(&self.leg);
            self.tracer.shut(&self.leg);
        }
    }
}
