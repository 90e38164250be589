use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    broker::{test_identifier_form, DocumentBroker, DocumentSubscriber, Registration},
    diagnostic::Diagnostics,
    document::Document,
    error::WaylinkError,
    location::Location,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDocument {
    pub location: Location,
    pub arrived: bool,
    pub identifiers: usize,
    pub duplicates: usize,
}

/// Standing subscriber that sees every fetched document and checks its identifiers for
/// uniqueness.
pub struct IdentifierScanner {
    diagnostics: Diagnostics,
    scanned: Mutex<Vec<ScannedDocument>>,
}

impl IdentifierScanner {
    /// Create a scanner and register it as the broker's standing subscriber. Documents already
    /// fetched are replayed to it immediately.
    pub fn attach(broker: &DocumentBroker) -> Result<Arc<IdentifierScanner>, WaylinkError> {
        let scanner = Arc::new(IdentifierScanner {
            diagnostics: broker.diagnostics().clone(),
            scanned: Mutex::new(Vec::new()),
        });
        broker.register_standing_subscriber(scanner.clone())?;
        Ok(scanner)
    }

    /// Every terminal result seen so far, in arrival order.
    pub fn scanned(&self) -> Vec<ScannedDocument> {
        self.scanned.lock().clone()
    }
}

impl DocumentSubscriber for IdentifierScanner {
    fn on_document(&self, registration: &Registration, document: &Arc<Document>) {
        let mut identifiers = 0;
        let mut duplicates = 0;
        for element in document.elements() {
            if let Some(id) = document.identifier(element) {
                identifiers += 1;
                if !test_identifier_form(document, element, id, &self.diagnostics) {
                    duplicates += 1;
                }
            }
        }
        self.scanned.lock().push(ScannedDocument {
            location: registration.location.clone(),
            arrived: true,
            identifiers,
            duplicates,
        });
    }

    fn on_close(&self, registration: &Registration) {
        if registration.document.is_none() {
            self.scanned.lock().push(ScannedDocument {
                location: registration.location.clone(),
                arrived: false,
                identifiers: 0,
                duplicates: 0,
            });
        }
    }
}
