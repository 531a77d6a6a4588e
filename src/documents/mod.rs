// Specification documents: kinds, ordering, storage and structural checks
//
// Every other module refers to documents through `DocumentKind`; free-form
// labels coming back from reviewers are mapped onto it by `labels`.

pub mod labels;
pub mod store;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use labels::{normalize_label, normalize_labels};
pub use store::{DocumentStore, FsDocumentStore, SaveAction, SaveReceipt};
pub use validation::{StructuralValidator, TemplateValidator, ValidationError, ValidationReport};

/// Canonical document categories produced by the generator.
///
/// The derived `Ord` follows the generation order, so `BTreeMap`s keyed by
/// kind iterate requirements → design → tasks → changes → api_contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Requirements,
    Design,
    Tasks,
    Changes,
    ApiContract,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Requirements,
        DocumentKind::Design,
        DocumentKind::Tasks,
        DocumentKind::Changes,
        DocumentKind::ApiContract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Design => "design",
            Self::Tasks => "tasks",
            Self::Changes => "changes",
            Self::ApiContract => "api_contract",
        }
    }

    /// File name inside the output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Requirements => "requirements.md",
            Self::Design => "design.md",
            Self::Tasks => "tasks.md",
            Self::Changes => "changes.md",
            Self::ApiContract => "openapi.json",
        }
    }

    /// Markdown documents are free text; the API contract is strict JSON.
    pub fn is_markdown(self) -> bool {
        !matches!(self, Self::ApiContract)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of service the specification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    #[default]
    Api,
    Web,
}

impl ServiceType {
    /// Documents produced for this service type, in generation order.
    pub fn document_order(self) -> Vec<DocumentKind> {
        let mut order = vec![
            DocumentKind::Requirements,
            DocumentKind::Design,
            DocumentKind::Tasks,
            DocumentKind::Changes,
        ];
        if self == ServiceType::Api {
            order.push(DocumentKind::ApiContract);
        }
        order
    }
}

/// A document as read from disk at the start of an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    /// Absolute path of the backing file
    pub path: PathBuf,
    pub content: String,
}
