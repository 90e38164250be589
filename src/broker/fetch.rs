//! The fetch boundary: turning a [`Location`] into a parsed [`Document`].

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::{config::WayConfig, document::Document, error::WaylinkError, location::Location};

/// Retrieves and parses one document.
///
/// Implementations report every kind of failure (abort, I/O error, bad status, unparseable
/// content) as `Err`; the broker folds them into a terminal null result. Timeouts are applied by
/// the broker, not the fetcher.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, location: &Location) -> BoxFuture<'static, Result<Document, WaylinkError>>;
}

/// Default fetcher: `file:` locations are read from disk, `http`/`https` locations requested over
/// the network.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    config: Arc<WayConfig>,
}

impl ResourceFetcher {
    pub fn new(config: Arc<WayConfig>) -> Self {
        ResourceFetcher {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl DocumentFetcher for ResourceFetcher {
    fn fetch(&self, location: &Location) -> BoxFuture<'static, Result<Document, WaylinkError>> {
        let location = location.clone();
        let client = self.client.clone();
        let config = self.config.clone();
        Box::pin(async move {
            let source = match location.scheme() {
                "file" => {
                    let path = location.to_file_path()?;
                    tracing::debug!("Reading {:?}", path);
                    tokio::fs::read_to_string(&path).await?
                }
                "http" | "https" => {
                    tracing::debug!("Requesting {}", location);
                    let response = client.get(location.as_str()).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(WaylinkError::fetch_failure(&location, status));
                    }
                    response.text().await?
                }
                scheme => {
                    return Err(WaylinkError::fetch_failure(
                        &location,
                        format!("unsupported scheme '{scheme}'"),
                    ))
                }
            };
            Document::parse(location, &source, &config)
        })
    }
}
