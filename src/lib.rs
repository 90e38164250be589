//! # waylink-core
//!
//! Cross-document waylink resolution and graph tracing for networks of way documents.
//!
//! ## Overview
//!
//! Way documents are XHTML documents whose elements may declare *waylinks*: typed hyperlinks that
//! target an element, by identifier, either in the same document or in another document that has
//! to be fetched first. The documents form a potentially cyclic graph that is only discovered as
//! it is fetched.
//!
//! waylink-core resolves that graph for three kinds of consumer at once, all sharing one cache:
//!
//! - a **renderer** ([`render::LinkRenderer`]) that fixes up the host document's links whose
//!   targets live in other documents, marking each resolved, broken or unknown;
//! - a **tracer** ([`trace::Tracer`]) that walks every waylink reachable from a root, across
//!   document boundaries, without duplicating work on branches already covered;
//! - **passive scanners** ([`scanner::IdentifierScanner`]) that want every document ever fetched.
//!
//! ## Architecture
//!
//! - **[`location`]**: URI normalization; [`Location`] is the only form in which document
//!   references are compared or stored
//! - **[`link`]**: parsing of `[<base>]#<identifier>` declarations
//! - **[`document`]**: the in-memory element tree of a way document
//! - **[`broker`]**: [`DocumentBroker`], the fetch-at-most-once document cache
//! - **[`trace`]**: the graph tracer and its leg bookkeeping
//! - **[`render`]**: inter-document link rendering state
//! - **[`diagnostic`]**: non-fatal content problems, collected for authors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waylink_core::{
//!     broker::DocumentBroker, config::WayConfig, document::Document, location::Location,
//!     render::LinkRenderer, trace::Tracer,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(WayConfig::default().with_root_path("file:///srv/way"));
//!     let location = Location::from_file_path("/srv/way/way.xht")?;
//!     let source = std::fs::read_to_string("/srv/way/way.xht")?;
//!     let host = Document::parse(location.clone(), &source, &config)?;
//!     let broker = DocumentBroker::with_resource_fetcher(config, host);
//!
//!     // Fix up the host document's links
//!     let renderer = LinkRenderer::new(broker.clone());
//!     renderer.scan_host()?;
//!     renderer.start();
//!
//!     // Independently, trace everything reachable from the element `top`
//!     let tracer = Tracer::new(broker.clone());
//!     tracer.trace(&location, "top")?;
//!
//!     renderer.settled().await;
//!     tracer.settled().await;
//!     for (element, link) in renderer.links() {
//!         println!("{element:?}: {} {}", link.href, link.display_text());
//!     }
//!     println!("{} legs traced", tracer.report().legs.node_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! All work runs as non-blocking tasks on a tokio runtime. The broker issues at most one fetch per
//! location and notifies subscribers outside of its lock, in subscription order. The tracer never
//! resolves a leg before the leg that discovered it has shut; see the [`trace`] module docs.
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `waytrace` command-line tool

pub mod broker;
pub mod config;
pub mod diagnostic;
pub mod document;
pub mod error;
pub mod event;
pub mod link;
pub mod location;
pub mod render;
pub mod scanner;
#[cfg(test)]
mod tests;
pub mod trace;

pub use broker::DocumentBroker;
pub use error::*;
pub use location::Location;
