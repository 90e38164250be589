//! The document broker: the single point of network access and deduplication.
//!
//! Every location moves through `UNSEEN → PENDING → TERMINAL` exactly once. The first request
//! for a location starts a fetch; requests arriving while it is in flight queue behind it;
//! requests arriving afterwards are served the stored result. A failed or timed-out fetch is
//! terminal too, and is never retried.
//!
//! Delivery to a [`DocumentSubscriber`] is a two-step protocol: `on_document` only when a
//! document arrived, then `on_close` unconditionally. Subscribers can therefore tell "never
//! arrived" apart from "arrived but nothing to do".
//!
//! ## Ordering
//!
//! - Subscribers queued behind one fetch are notified in the order they subscribed.
//! - The standing subscriber (if any) hears about a terminal result only after every subscriber
//!   queued for that location.
//! - No broker lock is held while a subscriber runs, so subscribers may call back into the broker.

use futures::FutureExt;
use parking_lot::Mutex;
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use crate::{
    config::WayConfig,
    diagnostic::{Diagnostics, WayDiagnostic},
    document::{Document, ElementId},
    error::WaylinkError,
    location::Location,
};

pub mod fetch;

pub use fetch::{DocumentFetcher, ResourceFetcher};

/// One fetch outcome. Immutable once terminal.
#[derive(Debug, Clone)]
pub struct Registration {
    pub location: Location,
    /// `None` when the fetch failed, was aborted or timed out.
    pub document: Option<Arc<Document>>,
}

/// Capability interface implemented by every consumer of broker results.
pub trait DocumentSubscriber: Send + Sync {
    /// Called only when the document arrived, always before `on_close`.
    fn on_document(&self, registration: &Registration, document: &Arc<Document>);

    /// Called exactly once per subscription.
    fn on_close(&self, registration: &Registration);
}

enum Entry {
    Pending(Vec<Arc<dyn DocumentSubscriber>>),
    Terminal(Arc<Registration>),
}

#[derive(Default)]
struct BrokerState {
    entries: HashMap<Location, Entry>,
    /// Terminal registrations in completion order, replayed to a late standing subscriber
    completed: Vec<Arc<Registration>>,
    standing: Option<Arc<dyn DocumentSubscriber>>,
    fetches: usize,
}

enum Action {
    Deliver(Arc<Registration>, Arc<dyn DocumentSubscriber>),
    Fetch,
    Wait,
}

pub struct DocumentBroker {
    config: Arc<WayConfig>,
    host: Arc<Registration>,
    host_document: Arc<Document>,
    fetcher: Arc<dyn DocumentFetcher>,
    state: Mutex<BrokerState>,
    diagnostics: Diagnostics,
}

impl DocumentBroker {
    /// Create a broker for the host document (the document being rendered), served from memory.
    pub fn new(
        config: Arc<WayConfig>,
        host: Document,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Arc<DocumentBroker> {
        let host_document = Arc::new(host);
        let host = Arc::new(Registration {
            location: host_document.location().clone(),
            document: Some(host_document.clone()),
        });
        Arc::new(DocumentBroker {
            config,
            host,
            host_document,
            fetcher,
            state: Mutex::new(BrokerState::default()),
            diagnostics: Diagnostics::default(),
        })
    }

    /// Create a broker backed by the default [`ResourceFetcher`].
    pub fn with_resource_fetcher(config: Arc<WayConfig>, host: Document) -> Arc<DocumentBroker> {
        let fetcher = Arc::new(ResourceFetcher::new(config.clone()));
        DocumentBroker::new(config, host, fetcher)
    }

    pub fn config(&self) -> &WayConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<Document> {
        &self.host_document
    }

    pub fn host_location(&self) -> &Location {
        &self.host.location
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Number of fetches actually issued.
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    pub fn is_pending(&self, location: &Location) -> bool {
        matches!(self.state.lock().entries.get(location), Some(Entry::Pending(_)))
    }

    /// Terminal registration for `location`, if its fetch has completed.
    pub fn registration(&self, location: &Location) -> Option<Arc<Registration>> {
        if location == &self.host.location {
            return Some(self.host.clone());
        }
        match self.state.lock().entries.get(location) {
            Some(Entry::Terminal(registration)) => Some(registration.clone()),
            _ => None,
        }
    }

    /// Deliver the document at `location` to `subscriber`, fetching it first if nobody has asked
    /// for it before. Must be called from within a tokio runtime.
    #[tracing::instrument(skip(self, subscriber), fields(location = %location))]
    pub fn fetch_or_subscribe(
        self: &Arc<Self>,
        location: &Location,
        subscriber: Arc<dyn DocumentSubscriber>,
    ) {
        if location == &self.host.location {
            deliver(&self.host, subscriber.as_ref());
            return;
        }

        let action = {
            let mut state = self.state.lock();
            match state.entries.get_mut(location) {
                Some(Entry::Terminal(registration)) => {
                    Action::Deliver(registration.clone(), subscriber)
                }
                Some(Entry::Pending(waiting)) => {
                    waiting.push(subscriber);
                    Action::Wait
                }
                None => {
                    state
                        .entries
                        .insert(location.clone(), Entry::Pending(vec![subscriber]));
                    state.fetches += 1;
                    Action::Fetch
                }
            }
        };

        match action {
            Action::Deliver(registration, subscriber) => {
                deliver(&registration, subscriber.as_ref())
            }
            Action::Fetch => self.spawn_fetch(location.clone()),
            Action::Wait => tracing::debug!("Queued behind pending fetch"),
        }
    }

    fn spawn_fetch(self: &Arc<Self>, location: Location) {
        let broker = self.clone();
        let budget = self.config.fetch_timeout(&location);
        let fetcher = self.fetcher.clone();
        tracing::debug!("Fetching {} (budget {:?})", location, budget);
        tokio::spawn(async move {
            // A panicking fetcher still has to leave the location terminal
            let fetch = AssertUnwindSafe(async { fetcher.fetch(&location).await }).catch_unwind();
            let outcome = match tokio::time::timeout(budget, fetch).await {
                Ok(Ok(Ok(document))) => Ok(Arc::new(document)),
                Ok(Ok(Err(err))) => Err(err.to_string()),
                Ok(Err(_)) => {
                    tracing::error!("Fetch of {} panicked", location);
                    Err("fetch panicked".to_string())
                }
                Err(_) => Err(format!("timed out after {budget:?}")),
            };
            broker.complete(location, outcome);
        });
    }

    fn complete(&self, location: Location, outcome: Result<Arc<Document>, String>) {
        let document = match outcome {
            Ok(document) => Some(document),
            Err(reason) => {
                self.diagnostics.report(WayDiagnostic::FetchFailure {
                    location: location.clone(),
                    reason,
                });
                None
            }
        };
        let registration = Arc::new(Registration {
            location: location.clone(),
            document,
        });

        let (waiting, standing) = {
            let mut state = self.state.lock();
            let previous = state
                .entries
                .insert(location, Entry::Terminal(registration.clone()));
            state.completed.push(registration.clone());
            let waiting = match previous {
                Some(Entry::Pending(waiting)) => waiting,
                _ => {
                    tracing::error!(
                        "Completed a fetch of {} that was not pending",
                        registration.location
                    );
                    Vec::new()
                }
            };
            (waiting, state.standing.clone())
        };

        tracing::debug!(
            "Delivering {} to {} subscriber(s)",
            registration.location,
            waiting.len()
        );
        for subscriber in waiting {
            deliver(&registration, subscriber.as_ref());
        }
        if let Some(standing) = standing {
            deliver(&registration, standing.as_ref());
        }
    }

    /// Register the one subscriber that receives every terminal result, past and future.
    pub fn register_standing_subscriber(
        &self,
        subscriber: Arc<dyn DocumentSubscriber>,
    ) -> Result<(), WaylinkError> {
        let replay = {
            let mut state = self.state.lock();
            if state.standing.is_some() {
                return Err(WaylinkError::DuplicateSubscriber);
            }
            state.standing = Some(subscriber.clone());
            state.completed.clone()
        };
        for registration in replay {
            deliver(&registration, subscriber.as_ref());
        }
        Ok(())
    }

    /// Check that no element of `document` other than `element` claims `candidate`. A collision
    /// is reported but never fails: remote content must not abort local work.
    pub fn test_identifier_form(
        &self,
        document: &Document,
        element: ElementId,
        candidate: &str,
    ) -> bool {
        test_identifier_form(document, element, candidate, &self.diagnostics)
    }

    /// Forget every registration, the standing subscriber and all diagnostics.
    pub fn reset(&self) -> Result<(), WaylinkError> {
        let mut state = self.state.lock();
        if let Some(location) = state.entries.iter().find_map(|(location, entry)| {
            matches!(entry, Entry::Pending(_)).then_some(location)
        }) {
            return Err(WaylinkError::State(format!(
                "cannot reset while the fetch of {location} is pending"
            )));
        }
        *state = BrokerState::default();
        self.diagnostics.clear();
        Ok(())
    }
}

/// Identifier-uniqueness test against an explicit diagnostic sink.
pub fn test_identifier_form(
    document: &Document,
    element: ElementId,
    candidate: &str,
    diagnostics: &Diagnostics,
) -> bool {
    let unique = document
        .element_by_identifier(candidate)
        .is_none_or(|claimant| claimant == element);
    if !unique {
        diagnostics.report(WayDiagnostic::DuplicateIdentifier {
            document: document.location().clone(),
            identifier: candidate.to_string(),
        });
    }
    unique
}

fn deliver(registration: &Registration, subscriber: &dyn DocumentSubscriber) {
    if let Some(document) = &registration.document {
        subscriber.on_document(registration, document);
    }
    subscriber.on_close(registration);
}
