use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::enums::DocumentType;

/// Metadata supplied by the file-management collaborator alongside a PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Originating facility, parsed from the filename or email subject.
    pub facility: Option<String>,
    /// Document-type token ("LAB", "PS", ...) or an FSE tipologia string.
    pub document_type: Option<String>,
    /// Opaque link back to a patient record outside the core. Never used for redaction.
    pub patient_ref: Option<String>,
}

/// Where the PDF bytes live.
#[derive(Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// A report PDF to process. Immutable once created; the core only reads it.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub facility_hint: Option<String>,
    pub document_type_hint: Option<DocumentType>,
    pub filename_tokens: Vec<String>,
    pub patient_ref: Option<String>,
    source: DocumentSource,
}

impl Document {
    /// Document backed by a file on disk. Bytes are read lazily.
    pub fn from_path(path: impl Into<PathBuf>, metadata: DocumentMetadata) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::build(file_name, DocumentSource::Path(path), metadata)
    }

    /// Document backed by bytes already in memory.
    pub fn from_bytes(
        file_name: &str,
        bytes: impl Into<Arc<[u8]>>,
        metadata: DocumentMetadata,
    ) -> Self {
        Self::build(
            file_name.to_string(),
            DocumentSource::Memory(bytes.into()),
            metadata,
        )
    }

    fn build(file_name: String, source: DocumentSource, metadata: DocumentMetadata) -> Self {
        let filename_tokens = filename_tokens(&file_name);
        let document_type_hint = metadata
            .document_type
            .as_deref()
            .and_then(parse_type_hint)
            .or_else(|| DocumentType::from_filename_tokens(&filename_tokens));

        Self {
            id: Uuid::new_v4(),
            file_name,
            facility_hint: metadata
                .facility
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            document_type_hint,
            filename_tokens,
            patient_ref: metadata.patient_ref,
            source,
        }
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            DocumentSource::Path(p) => Some(p),
            DocumentSource::Memory(_) => None,
        }
    }

    /// Read the PDF bytes.
    pub fn read_bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match &self.source {
            DocumentSource::Path(p) => std::fs::read(p).map(Cow::Owned),
            DocumentSource::Memory(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// SHA-256 fingerprint of document bytes (hex). Logged instead of file names.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Split a file name into lowercase alphanumeric tokens, extension dropped.
pub fn filename_tokens(file_name: &str) -> Vec<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Accept either a tag ("LAB") or a tipologia string ("Referto di laboratorio").
fn parse_type_hint(raw: &str) -> Option<DocumentType> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(tag) = trimmed.to_uppercase().parse::<DocumentType>() {
        return Some(tag);
    }
    match DocumentType::from_tipologia(trimmed) {
        DocumentType::Altro => None,
        other => Some(other),
    }
}
