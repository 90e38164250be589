//! Shared test utilities for broker, trace and render testing

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;

use crate::{
    broker::{DocumentBroker, DocumentFetcher, DocumentSubscriber, Registration},
    config::WayConfig,
    document::Document,
    error::WaylinkError,
    location::Location,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub const ROOT_PATH: &str = "http://way.test/net";

pub fn test_config() -> Arc<WayConfig> {
    Arc::new(WayConfig::default().with_root_path(ROOT_PATH))
}

/// `http://way.test/net/<path>`
pub fn loc(path: &str) -> Location {
    Location::parse(&format!("{ROOT_PATH}/{path}")).unwrap()
}

pub fn parse_doc(location: &Location, source: &str) -> Document {
    Document::parse(location.clone(), source, &test_config()).unwrap()
}

/// In-memory fetcher serving XHTML sources by location.
///
/// Locations marked hanging never complete. While a gate is closed every fetch waits for it to
/// open, which lets tests pile subscribers up behind a pending fetch.
#[derive(Default)]
pub struct ScriptedFetcher {
    sources: HashMap<Location, String>,
    hanging: HashSet<Location>,
    gate: Option<watch::Receiver<bool>>,
    calls: Arc<Mutex<Vec<Location>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        ScriptedFetcher::default()
    }

    pub fn serve(mut self, location: &Location, source: &str) -> Self {
        self.sources.insert(location.clone(), source.to_string());
        self
    }

    pub fn hang(mut self, location: &Location) -> Self {
        self.hanging.insert(location.clone());
        self
    }

    /// Hold every fetch until the returned sender publishes `true`.
    pub fn gated(mut self) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        (self, tx)
    }

    /// Handle on the log of fetched locations, usable after the fetcher moves into a broker.
    pub fn calls(&self) -> Arc<Mutex<Vec<Location>>> {
        self.calls.clone()
    }
}

impl DocumentFetcher for ScriptedFetcher {
    fn fetch(&self, location: &Location) -> BoxFuture<'static, Result<Document, WaylinkError>> {
        self.calls.lock().push(location.clone());
        let location = location.clone();
        let source = self.sources.get(&location).cloned();
        let hanging = self.hanging.contains(&location);
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(mut gate) = gate {
                gate.wait_for(|open| *open)
                    .await
                    .map_err(|_| WaylinkError::fetch_failure(&location, "gate dropped"))?;
            }
            if hanging {
                std::future::pending::<()>().await;
            }
            match source {
                Some(source) => Document::parse(location, &source, &WayConfig::default()),
                None => Err(WaylinkError::NotFound(location.to_string())),
            }
        })
    }
}

/// Fetcher whose every fetch panics once polled.
pub struct PanickingFetcher;

impl DocumentFetcher for PanickingFetcher {
    fn fetch(&self, location: &Location) -> BoxFuture<'static, Result<Document, WaylinkError>> {
        let location = location.clone();
        Box::pin(async move { panic!("fetcher blew up on {location}") })
    }
}

/// Subscriber that logs `read:<name>` and `close:<name>` into a shared journal.
pub struct RecordingSubscriber {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RecordingSubscriber {
    pub fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(RecordingSubscriber {
            name: name.to_string(),
            journal: journal.clone(),
        })
    }
}

impl DocumentSubscriber for RecordingSubscriber {
    fn on_document(&self, _registration: &Registration, _document: &Arc<Document>) {
        self.journal.lock().push(format!("read:{}", self.name));
    }

    fn on_close(&self, registration: &Registration) {
        let suffix = if registration.document.is_some() {
            ""
        } else {
            "(null)"
        };
        self.journal
            .lock()
            .push(format!("close:{}{}", self.name, suffix));
    }
}

pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

/// Broker over `fetcher` whose host document is `host.xht` with the given source.
pub fn broker_with(host: &str, fetcher: impl DocumentFetcher + 'static) -> Arc<DocumentBroker> {
    init_logging();
    let config = test_config();
    let host = Document::parse(loc("host.xht"), host, &config).unwrap();
    DocumentBroker::new(config, host, Arc::new(fetcher))
}

pub const PLAIN_HOST: &str = r#"<html><body id="top"><p>host</p></body></html>"#;
