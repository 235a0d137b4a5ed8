//! Document metadata and stored-payload collaborators.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::watermark::WatermarkPolicy;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub doc_id: String,
    pub title: String,
    /// Payload location, relative to the payload root.
    pub encrypted_path: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Whether the stored payload is `IV ‖ Tag ‖ Ciphertext` or plain bytes.
    #[serde(default = "encrypted_by_default")]
    pub is_encrypted: bool,
    #[serde(default)]
    pub watermark_policy: WatermarkPolicy,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_content_type() -> String {
    "application/pdf".into()
}

fn encrypted_by_default() -> bool {
    true
}

impl DocumentMetadata {
    pub fn is_active(&self) -> bool {
        self.status == DocumentStatus::Active
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Read access to document metadata.
pub trait DocumentCatalog: Send + Sync {
    fn document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError>;

    fn list_active(&self) -> Result<Vec<DocumentMetadata>, StoreError>;
}

/// Loads the stored payload bytes of a document.
pub trait PayloadSource: Send + Sync {
    fn load(&self, document: &DocumentMetadata) -> Result<Vec<u8>, StoreError>;
}

// ============================================================================
// In-memory catalog
// ============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    documents: Mutex<Vec<DocumentMetadata>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by `doc_id`. A replacement keeps its original
    /// `created_at` and gets `updated_at = now`.
    pub fn upsert(&self, document: DocumentMetadata, now: DateTime<Utc>) {
        upsert_in(&mut self.documents.lock(), document, now);
    }

    /// Mark a document inactive. Returns whether it existed.
    pub fn deactivate(&self, doc_id: &str, now: DateTime<Utc>) -> bool {
        deactivate_in(&mut self.documents.lock(), doc_id, now)
    }
}

impl DocumentCatalog for MemoryCatalog {
    fn document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        Ok(self
            .documents
            .lock()
            .iter()
            .find(|d| d.doc_id == doc_id)
            .cloned())
    }

    fn list_active(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        Ok(self
            .documents
            .lock()
            .iter()
            .filter(|d| d.is_active())
            .cloned()
            .collect())
    }
}

fn upsert_in(documents: &mut Vec<DocumentMetadata>, mut document: DocumentMetadata, now: DateTime<Utc>) {
    document.updated_at = now;
    match documents.iter_mut().find(|d| d.doc_id == document.doc_id) {
        Some(existing) => {
            document.created_at = existing.created_at;
            *existing = document;
        }
        None => {
            document.created_at = now;
            documents.push(document);
        }
    }
}

fn deactivate_in(documents: &mut [DocumentMetadata], doc_id: &str, now: DateTime<Utc>) -> bool {
    match documents.iter_mut().find(|d| d.doc_id == doc_id) {
        Some(doc) => {
            doc.status = DocumentStatus::Inactive;
            doc.updated_at = now;
            true
        }
        None => false,
    }
}

// ============================================================================
// JSON registry file
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    documents: Vec<DocumentMetadata>,
}

/// Catalog backed by a `registry.json` file of the form
/// `{ "documents": [ ... ] }`.
///
/// The file is read once at open and rewritten on every mutation. A missing
/// file is an empty registry.
pub struct JsonRegistryCatalog {
    path: PathBuf,
    documents: Mutex<Vec<DocumentMetadata>>,
}

impl JsonRegistryCatalog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let registry = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<RegistryFile>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            path = %path.display(),
            documents = registry.documents.len(),
            "document registry loaded"
        );
        Ok(Self {
            path,
            documents: Mutex::new(registry.documents),
        })
    }

    pub fn upsert(&self, document: DocumentMetadata, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut documents = self.documents.lock();
        let mut next = documents.clone();
        upsert_in(&mut next, document, now);
        self.save(&next)?;
        *documents = next;
        Ok(())
    }

    pub fn deactivate(&self, doc_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock();
        let mut next = documents.clone();
        if !deactivate_in(&mut next, doc_id, now) {
            return Ok(false);
        }
        self.save(&next)?;
        *documents = next;
        Ok(true)
    }

    /// Write to a sibling temp file and rename over the registry, so readers
    /// see either the old file or the new one.
    fn save(&self, documents: &[DocumentMetadata]) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct RegistryRef<'a> {
            documents: &'a [DocumentMetadata],
        }
        let json = serde_json::to_string_pretty(&RegistryRef { documents })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl DocumentCatalog for JsonRegistryCatalog {
    fn document(&self, doc_id: &str) -> Result<Option<DocumentMetadata>, StoreError> {
        Ok(self
            .documents
            .lock()
            .iter()
            .find(|d| d.doc_id == doc_id)
            .cloned())
    }

    fn list_active(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        Ok(self
            .documents
            .lock()
            .iter()
            .filter(|d| d.is_active())
            .cloned()
            .collect())
    }
}

// ============================================================================
// Payload sources
// ============================================================================

/// Resolves `encrypted_path` against a root directory.
pub struct FilePayloadSource {
    root: PathBuf,
}

impl FilePayloadSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(relative);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::Corrupt(format!(
                "payload path outside root: {}",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl PayloadSource for FilePayloadSource {
    fn load(&self, document: &DocumentMetadata) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(&document.encrypted_path)?;
        Ok(std::fs::read(path)?)
    }
}

/// Payloads held in memory, keyed by document id.
#[derive(Default)]
pub struct MemoryPayloadSource {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPayloadSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc_id: impl Into<String>, payload: Vec<u8>) {
        self.payloads.lock().insert(doc_id.into(), payload);
    }
}

impl PayloadSource for MemoryPayloadSource {
    fn load(&self, document: &DocumentMetadata) -> Result<Vec<u8>, StoreError> {
        self.payloads
            .lock()
            .get(&document.doc_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no payload for {}", document.doc_id),
                ))
            })
    }
}
