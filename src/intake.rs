//! Intake classification: per-file format and encryption detection plus
//! content normalization.
//!
//! Everything here is either a pure function over a filename/content or a
//! single async read. The session decides what to do with the results.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Serialize;

use crate::error::ReadError;

pub type EntryId = String;

/// Extensions read as raw bytes and carried as base64.
const BINARY_EXTENSIONS: &[&str] = &["der", "pfx", "p12"];

/// PKCS#12 containers, conventionally password protected.
const CONTAINER_EXTENSIONS: &[&str] = &["pfx", "p12"];

/// Present in encrypted PEM bodies (`BEGIN ENCRYPTED PRIVATE KEY`, `Proc-Type: 4,ENCRYPTED`).
pub const ENCRYPTED_MARKER: &str = "ENCRYPTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Encrypted,
    Ready,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Text,
    Base64,
}

/// Normalized file content. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub encoding: Encoding,
    pub data: Arc<str>,
}

impl Payload {
    pub fn text(data: impl Into<Arc<str>>) -> Self {
        Self {
            encoding: Encoding::Text,
            data: data.into(),
        }
    }

    pub fn base64(raw: &[u8]) -> Self {
        Self {
            encoding: Encoding::Base64,
            data: STANDARD.encode(raw).into(),
        }
    }

    /// Only text payloads are inspected; base64 bodies never contain the marker by accident.
    pub fn has_encrypted_marker(&self) -> bool {
        self.encoding == Encoding::Text && self.data.contains(ENCRYPTED_MARKER)
    }

    /// Original bytes, as sent to the parse service.
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.encoding {
            Encoding::Text => Ok(self.data.as_bytes().to_vec()),
            Encoding::Base64 => STANDARD.decode(self.data.as_bytes()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One submitted file's tracked ingestion state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: EntryId,
    pub name: String,
    pub extension: String,
    pub status: EntryStatus,
    pub encoding: Encoding,
    #[serde(skip)]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileEntry {
    pub fn new(id: EntryId, name: &str) -> Self {
        let extension = extension_of(name);
        Self {
            id,
            name: name.to_string(),
            status: initial_status(&extension),
            encoding: encoding_for(&extension),
            extension,
            payload: None,
            error: None,
        }
    }

    /// Whether this entry has shown any sign of needing a secret.
    pub fn shows_encryption(&self) -> bool {
        self.status == EntryStatus::Encrypted
            || is_container(&self.extension)
            || self
                .payload
                .as_ref()
                .is_some_and(Payload::has_encrypted_marker)
    }
}

/// Where a submitted file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory { name: String, bytes: Bytes },
}

impl FileSource {
    pub fn name(&self) -> String {
        match self {
            FileSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            FileSource::Memory { name, .. } => name.clone(),
        }
    }
}

/// A read the session wants performed. `batch_index` is the file's
/// position within its submission.
#[derive(Debug, Clone)]
pub struct PendingRead {
    pub id: EntryId,
    pub batch_index: usize,
    pub encoding: Encoding,
    pub source: FileSource,
}

pub fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_container(extension: &str) -> bool {
    CONTAINER_EXTENSIONS.contains(&extension)
}

pub fn encoding_for(extension: &str) -> Encoding {
    if BINARY_EXTENSIONS.contains(&extension) {
        Encoding::Base64
    } else {
        Encoding::Text
    }
}

pub fn initial_status(extension: &str) -> EntryStatus {
    if is_container(extension) {
        EntryStatus::Encrypted
    } else {
        EntryStatus::Pending
    }
}

/// Status after a successful read. Container formats stay encrypted
/// whatever their content looks like.
pub fn settled_status(extension: &str, payload: &Payload) -> EntryStatus {
    if is_container(extension) || payload.has_encrypted_marker() {
        EntryStatus::Encrypted
    } else {
        EntryStatus::Ready
    }
}

pub fn normalize(raw: &[u8], encoding: Encoding) -> Result<Payload, ReadError> {
    match encoding {
        Encoding::Base64 => Ok(Payload::base64(raw)),
        Encoding::Text => std::str::from_utf8(raw)
            .map(Payload::text)
            .map_err(|_| ReadError::NotText),
    }
}

/// Reads and normalizes one source. The single suspend point per file.
pub async fn read_source(source: &FileSource, encoding: Encoding) -> Result<Payload, ReadError> {
    match source {
        FileSource::Path(path) => {
            let raw = tokio::fs::read(path).await?;
            normalize(&raw, encoding)
        }
        FileSource::Memory { bytes, .. } => normalize(bytes, encoding),
    }
}
