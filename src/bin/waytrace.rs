//! waytrace CLI tool
//!
//! Command-line interface for tracing and rendering waylinks with waylink-core.
//!
//! ## Commands
//!
//! - `trace <path> --id <root>`: Trace every leg reachable from one element
//! - `links <path>`: Render the state of every waylink declared in a document

use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use waylink_core::{
    broker::DocumentBroker,
    config::{TomlConfigProvider, WayConfig},
    document::Document,
    location::Location,
    render::LinkRenderer,
    scanner::IdentifierScanner,
    trace::Tracer,
};

#[derive(Parser)]
#[command(name = "waytrace")]
#[command(author, version, about = "A tool for tracing waylinks across way documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace the waylink graph from one element and report every leg
    Trace {
        /// Path to the document holding the root element
        path: PathBuf,

        /// Identifier of the root element
        #[arg(short, long)]
        id: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit the trace report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve every waylink declared in a document and show its state
    Links {
        /// Path to the document
        path: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<WayConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(TomlConfigProvider::new(path).load()?),
        None => Ok(WayConfig::default()),
    }
}

fn open_host(
    path: &Path,
    config: WayConfig,
) -> Result<Arc<DocumentBroker>, Box<dyn std::error::Error>> {
    let location = Location::from_file_path(path)?;
    let source = std::fs::read_to_string(path)?;
    let config = Arc::new(config);
    let host = Document::parse(location, &source, &config)?;
    Ok(DocumentBroker::with_resource_fetcher(config, host))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Trace {
            path,
            id,
            config,
            json,
        } => runtime.block_on(async {
            let broker = open_host(&path, load_config(config)?)?;
            let scanner = IdentifierScanner::attach(&broker)?;
            let tracer = Tracer::new(broker.clone());
            let root = tracer.trace(broker.host_location(), &id)?;
            tracer.settled().await;

            let report = tracer.report();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Trace from {}", root);
                for event in &report.events {
                    println!("  {}", event);
                }
                println!(
                    "\n{} leg(s), {} broken, {} document(s) fetched",
                    report.legs.node_count(),
                    report.broken.len(),
                    scanner.scanned().len()
                );
            }

            let diagnostics = broker.diagnostics().snapshot();
            if !diagnostics.is_empty() {
                eprintln!("\nDiagnostics:");
                for diagnostic in diagnostics {
                    eprintln!("  {}", diagnostic);
                }
            }
            Ok::<(), Box<dyn std::error::Error>>(())
        })?,

        Commands::Links { path, config } => runtime.block_on(async {
            let broker = open_host(&path, load_config(config)?)?;
            let renderer = LinkRenderer::new(broker.clone());
            renderer.scan_host()?;
            renderer.start();
            renderer.settled().await;

            for (element, link) in renderer.links() {
                println!(
                    "{:>5}  {:<9} {}  {}",
                    element.0,
                    format!("{:?}", link.status),
                    link.href,
                    link.display_text()
                );
            }

            let diagnostics = broker.diagnostics().snapshot();
            if !diagnostics.is_empty() {
                eprintln!("\nDiagnostics:");
                for diagnostic in diagnostics {
                    eprintln!("  {}", diagnostic);
                }
            }
            Ok::<(), Box<dyn std::error::Error>>(())
        })?,
    }

    Ok(())
}
