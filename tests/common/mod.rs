//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a small way network on disk and return its root directory.
///
/// ```text
/// <root>/way.xht          #top links to guide/#start and /notes.xht#n1
/// <root>/guide/way.xht    #start links back to /way.xht#top and to /notes.xht#gone
/// <root>/notes.xht        #n1, and a duplicated #twice
/// ```
#[allow(dead_code)]
pub fn create_way_network(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("way_network");
    std::fs::create_dir_all(root.join("guide")).unwrap();

    std::fs::write(
        root.join("way.xht"),
        r##"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
  <body>
    <section id="top">
      <h1>Start here</h1>
      <a data-waylink="/guide/#start">the guide</a>
      <a data-waylink="/notes.xht#n1">a note</a>
    </section>
    <footer><a data-waylink="/nowhere.xht#x">dead end</a></footer>
  </body>
</html>
"##,
    )
    .unwrap();

    std::fs::write(
        root.join("guide").join("way.xht"),
        r##"<html xmlns="http://www.w3.org/1999/xhtml">
  <body>
    <section id="start">
      <p>Guide &amp; walkthrough</p>
      <a data-waylink="/way.xht#top">home</a>
      <a data-waylink="/notes.xht#gone">missing note</a>
    </section>
  </body>
</html>
"##,
    )
    .unwrap();

    std::fs::write(
        root.join("notes.xht"),
        r##"<html xmlns="http://www.w3.org/1999/xhtml">
  <body>
    <p id="n1">First note</p>
    <p id="twice">One</p>
    <p id="twice">Two</p>
  </body>
</html>
"##,
    )
    .unwrap();

    root
}
