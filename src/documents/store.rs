// Document store: UTF-8 files named by document kind inside one output directory

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Document, DocumentKind};

/// Whether a save created a new file or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Created,
    Updated,
}

/// Metadata about a completed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub file_name: String,
    /// Absolute path of the written file
    pub file_path: PathBuf,
    pub size: u64,
    pub action: SaveAction,
}

/// Persistence layer for specification documents.
///
/// The store is the single source of truth: the refinement loop re-reads
/// through it at the start of every iteration and before every regeneration,
/// and all writes go through the same store.
pub trait DocumentStore: Send + Sync {
    /// Absolute output directory
    fn output_dir(&self) -> &Path;

    /// Absolute path of the file backing `kind`
    fn path_for(&self, kind: DocumentKind) -> PathBuf {
        self.output_dir().join(kind.file_name())
    }

    /// Read a document; `Ok(None)` when it has not been generated.
    fn read(&self, kind: DocumentKind) -> Result<Option<String>>;

    /// Write a document, replacing any previous content.
    fn write(&self, kind: DocumentKind, content: &str) -> Result<SaveReceipt>;

    /// Paths written through this store so far, deduplicated, in write order.
    fn saved_files(&self) -> Vec<PathBuf>;
}

/// Load every document in `order` that exists on disk.
///
/// A document that fails to read is logged and skipped so one unreadable
/// file does not hide the others.
pub fn load_documents(
    store: &dyn DocumentStore,
    order: &[DocumentKind],
) -> Result<BTreeMap<DocumentKind, Document>> {
    let dir = store.output_dir();
    if !dir.is_dir() {
        anyhow::bail!("Output directory does not exist: {}", dir.display());
    }

    let mut documents = BTreeMap::new();
    for &kind in order {
        match store.read(kind) {
            Ok(Some(content)) => {
                documents.insert(
                    kind,
                    Document {
                        kind,
                        path: store.path_for(kind),
                        content,
                    },
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(document = %kind, "Failed to load document: {:#}", e);
            }
        }
    }
    Ok(documents)
}

/// Filesystem-backed store
pub struct FsDocumentStore {
    output_dir: PathBuf,
    saved: Mutex<Vec<PathBuf>>,
}

impl FsDocumentStore {
    /// Create the output directory if needed and resolve it to an absolute path.
    pub fn prepare(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;
        let output_dir = output_dir.canonicalize().with_context(|| {
            format!("Failed to resolve output directory: {}", output_dir.display())
        })?;

        Ok(Self {
            output_dir,
            saved: Mutex::new(Vec::new()),
        })
    }

    /// Open an existing output directory without creating it.
    pub fn open(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        let output_dir = output_dir.canonicalize().with_context(|| {
            format!("Output directory not found: {}", output_dir.display())
        })?;

        Ok(Self {
            output_dir,
            saved: Mutex::new(Vec::new()),
        })
    }
}

impl DocumentStore for FsDocumentStore {
    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn read(&self, kind: DocumentKind) -> Result<Option<String>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        Ok(Some(content))
    }

    fn write(&self, kind: DocumentKind, content: &str) -> Result<SaveReceipt> {
        let path = self.path_for(kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let action = if path.exists() {
            SaveAction::Updated
        } else {
            SaveAction::Created
        };

        fs::write(&path, content)
            .with_context(|| format!("Failed to write document: {}", path.display()))?;
        let size = fs::metadata(&path)
            .with_context(|| format!("Failed to stat document: {}", path.display()))?
            .len();

        if let Ok(mut saved) = self.saved.lock() {
            if !saved.contains(&path) {
                saved.push(path.clone());
            }
        }

        tracing::info!(
            document = %kind,
            file = %path.display(),
            ?action,
            size,
            "Document saved"
        );

        Ok(SaveReceipt {
            file_name: kind.file_name().to_string(),
            file_path: path,
            size,
            action,
        })
    }

    fn saved_files(&self) -> Vec<PathBuf> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
