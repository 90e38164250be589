//! Inter-document link rendering.
//!
//! The [`LinkRenderer`] works out the state of every waylink declared in the host document.
//! Same-document targets resolve on the spot. Targets in other documents wait, grouped per target
//! location, until the broker delivers that document; then each waiting source is matched against
//! the identifiers found there and re-rendered, and whatever is left unmatched is retired as
//! broken. A target document that never arrives leaves its sources in the `Unknown` state.
//!
//! The resulting [`LinkState`]s are everything the visual layer needs: it never re-derives
//! resolution itself.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

use crate::{
    broker::{DocumentBroker, DocumentSubscriber, Registration},
    diagnostic::WayDiagnostic,
    document::{Document, ElementId},
    error::WaylinkError,
    link::LinkAttribute,
    location::{defragment, Location},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    /// Waiting on the target document
    Pending,
    Resolved,
    /// Malformed declaration, or target identifier absent from the target document
    Broken,
    /// The target document never arrived
    Unknown,
}

impl LinkStatus {
    /// Placeholder glyph shown in place of a preview.
    pub fn glyph(&self) -> Option<char> {
        match self {
            LinkStatus::Pending => Some('…'),
            LinkStatus::Resolved => None,
            LinkStatus::Broken => Some('✗'),
            LinkStatus::Unknown => Some('?'),
        }
    }
}

/// Where a same-document target sits relative to its source, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkState {
    pub href: String,
    pub status: LinkStatus,
    pub direction: Option<Direction>,
    pub preview: Option<String>,
}

impl LinkState {
    fn new(href: String, status: LinkStatus) -> LinkState {
        LinkState {
            href,
            status,
            direction: None,
            preview: None,
        }
    }

    /// Text to render for the link: the preview when resolved, the placeholder glyph otherwise.
    pub fn display_text(&self) -> String {
        match (&self.preview, self.status.glyph()) {
            (Some(preview), None) => preview.clone(),
            (_, Some(glyph)) => glyph.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn is_broken(&self) -> bool {
        self.status == LinkStatus::Broken
    }
}

/// Whitespace-collapsed text of `element`, cut to `limit` characters.
pub fn preview_text(document: &Document, element: ElementId, limit: usize) -> String {
    let text = document
        .text_content(element)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.chars().count() <= limit {
        return text;
    }
    let mut cut = text.chars().take(limit).collect::<String>();
    cut.push('…');
    cut
}

#[derive(Debug, Clone)]
struct SourceRef {
    element: ElementId,
    /// Fragment of the source's declaration
    target_id: String,
}

#[derive(Default)]
struct RenderState {
    waiting: BTreeMap<Location, Vec<SourceRef>>,
    links: BTreeMap<ElementId, LinkState>,
    started: bool,
}

struct RenderInner {
    broker: Arc<DocumentBroker>,
    state: Mutex<RenderState>,
    outstanding: watch::Sender<usize>,
}

#[derive(Clone)]
pub struct LinkRenderer {
    inner: Arc<RenderInner>,
}

impl LinkRenderer {
    pub fn new(broker: Arc<DocumentBroker>) -> LinkRenderer {
        let (outstanding, _) = watch::channel(0usize);
        LinkRenderer {
            inner: Arc::new(RenderInner {
                broker,
                state: Mutex::new(RenderState::default()),
                outstanding,
            }),
        }
    }

    /// Enumerate the host's waylink declarations: same-document targets resolve immediately,
    /// other-document targets are registered to wait for their document.
    #[tracing::instrument(skip(self))]
    pub fn scan_host(&self) -> Result<(), WaylinkError> {
        let broker = &self.inner.broker;
        let host = broker.host().clone();
        for element in host.elements() {
            let Some(raw) = host.link_declaration(element) else {
                continue;
            };
            let link = match LinkAttribute::parse(raw, broker.config()) {
                Ok(link) => link,
                Err(err) => {
                    if let Some(diagnostic) = WayDiagnostic::from_link_error(host.location(), &err)
                    {
                        broker.diagnostics().report(diagnostic);
                    }
                    self.set(element, LinkState::new(raw.to_string(), LinkStatus::Broken));
                    continue;
                }
            };
            let target = match link.resolve_location(host.location()) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!("Unresolvable link base in '{}': {}", raw, err);
                    self.set(element, LinkState::new(link.href(), LinkStatus::Broken));
                    continue;
                }
            };
            if &target == host.location() {
                self.resolve_local(element, &link);
            } else {
                self.register_link(element, target)?;
            }
        }
        Ok(())
    }

    fn resolve_local(&self, source: ElementId, link: &LinkAttribute) {
        let broker = &self.inner.broker;
        let host = broker.host();
        let mut state = LinkState::new(link.href(), LinkStatus::Broken);
        match host.element_by_identifier(&link.target_id) {
            Some(target) => {
                state.status = LinkStatus::Resolved;
                state.direction = Some(if target < source {
                    Direction::Up
                } else {
                    Direction::Down
                });
                state.preview = Some(preview_text(
                    host,
                    target,
                    broker.config().preview_length,
                ));
            }
            None => broker
                .diagnostics()
                .report(WayDiagnostic::BrokenWaylink {
                    document: host.location().clone(),
                    target: host.location().clone(),
                    identifier: link.target_id.clone(),
                }),
        }
        self.set(source, state);
    }

    /// Record that the host element `source` awaits resolution against `target`.
    pub fn register_link(&self, source: ElementId, target: Location) -> Result<(), WaylinkError> {
        let host = self.inner.broker.host();
        if host.get(source).is_none() {
            return Err(WaylinkError::NotFound(format!(
                "element {source:?} is not in {}",
                host.location()
            )));
        }
        let raw = host.link_declaration(source).ok_or_else(|| {
            WaylinkError::NotFound(format!("element {source:?} declares no waylink"))
        })?;
        let base = defragment(raw);
        if base.len() == raw.len() {
            return Err(WaylinkError::malformed(raw, "missing '#' delimiter"));
        }
        let target_id = raw[base.len() + 1..].to_string();
        let href = format!("{target}#{target_id}");

        let mut state = self.inner.state.lock();
        if state.started {
            return Err(WaylinkError::State(
                "links must be registered before the renderer starts".to_string(),
            ));
        }
        let waiting = state.waiting.entry(target).or_default();
        if waiting.is_empty() {
            self.inner.outstanding.send_modify(|outstanding| *outstanding += 1);
        }
        waiting.push(SourceRef { element: source, target_id });
        state
            .links
            .insert(source, LinkState::new(href, LinkStatus::Pending));
        Ok(())
    }

    /// Subscribe to every recorded target location.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) {
        let locations = {
            let mut state = self.inner.state.lock();
            if state.started {
                tracing::warn!("Renderer already started");
                return;
            }
            state.started = true;
            state.waiting.keys().cloned().collect::<Vec<_>>()
        };
        tracing::info!("Waiting on {} target document(s)", locations.len());
        for location in locations {
            self.inner.broker.fetch_or_subscribe(
                &location,
                Arc::new(WaitingList {
                    renderer: self.inner.clone(),
                    location: location.clone(),
                }),
            );
        }
    }

    /// Wait until every waiting list has been retired. Registered links keep this pending until
    /// [`LinkRenderer::start`] has run and their documents have arrived or failed.
    pub async fn settled(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        if rx.wait_for(|outstanding| *outstanding == 0).await.is_err() {
            tracing::warn!("Renderer progress channel closed before settling");
        }
    }

    pub fn link(&self, source: ElementId) -> Option<LinkState> {
        self.inner.state.lock().links.get(&source).cloned()
    }

    pub fn links(&self) -> BTreeMap<ElementId, LinkState> {
        self.inner.state.lock().links.clone()
    }

    fn set(&self, source: ElementId, link: LinkState) {
        self.inner.state.lock().links.insert(source, link);
    }
}

impl RenderInner {
    fn take_waiting(&self, location: &Location) -> Option<Vec<SourceRef>> {
        self.state.lock().waiting.remove(location)
    }

    /// Apply the final states of one waiting list and count the list as retired.
    fn retire(&self, updates: Vec<(ElementId, LinkState)>) {
        let mut state = self.state.lock();
        for (source, link) in updates {
            state.links.insert(source, link);
        }
        self.outstanding.send_modify(|outstanding| {
            *outstanding = outstanding.saturating_sub(1);
        });
    }

    fn href_of(&self, source: ElementId) -> String {
        self.state
            .lock()
            .links
            .get(&source)
            .map(|link| link.href.clone())
            .unwrap_or_default()
    }
}

/// Broker subscriber for one target location's waiting list.
struct WaitingList {
    renderer: Arc<RenderInner>,
    location: Location,
}

impl DocumentSubscriber for WaitingList {
    fn on_document(&self, _registration: &Registration, document: &Arc<Document>) {
        let Some(mut waiting) = self.renderer.take_waiting(&self.location) else {
            return;
        };
        let broker = &self.renderer.broker;
        let limit = broker.config().preview_length;
        let mut updates = Vec::new();

        for element in document.elements() {
            if waiting.is_empty() {
                break;
            }
            let Some(id) = document.identifier(element) else {
                continue;
            };
            if !broker.test_identifier_form(document, element, id) {
                continue;
            }
            let mut idx = waiting.len();
            while idx > 0 {
                idx -= 1;
                if waiting[idx].target_id == id {
                    let source = waiting.remove(idx);
                    let mut link =
                        LinkState::new(self.renderer.href_of(source.element), LinkStatus::Resolved);
                    link.preview = Some(preview_text(document, element, limit));
                    updates.push((source.element, link));
                }
            }
        }

        for source in waiting {
            broker
                .diagnostics()
                .report(WayDiagnostic::BrokenWaylink {
                    document: broker.host_location().clone(),
                    target: self.location.clone(),
                    identifier: source.target_id.clone(),
                });
            updates.push((
                source.element,
                LinkState::new(self.renderer.href_of(source.element), LinkStatus::Broken),
            ));
        }
        tracing::debug!("Rendered {} link(s) against {}", updates.len(), self.location);
        self.renderer.retire(updates);
    }

    fn on_close(&self, registration: &Registration) {
        if registration.document.is_some() {
            return;
        }
        let Some(waiting) = self.renderer.take_waiting(&self.location) else {
            return;
        };
        let updates = waiting
            .into_iter()
            .map(|source| {
                (
                    source.element,
                    LinkState::new(self.renderer.href_of(source.element), LinkStatus::Unknown),
                )
            })
            .collect();
        self.renderer.retire(updates);
    }
}
