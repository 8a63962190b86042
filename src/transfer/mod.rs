use std::path::Path;

use thiserror::Error;
use tokio::fs as async_fs;

use crate::protocol::{FileMetadata, MAX_FILE_SIZE};

/// Errors surfaced while selecting a file to send
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("file is {size} bytes, transfers are capped at {MAX_FILE_SIZE} bytes")]
    TooLarge { size: u64 },
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A file picked for sending: an opaque named byte blob.
///
/// The whole content is buffered at selection time, so the later
/// metadata-then-payload emission has no suspension point in between.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn from_bytes(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk. Oversized files are rejected before the content
    /// is touched, leaving nothing selected.
    pub async fn from_path(path: &Path) -> Result<Self, SelectError> {
        let meta = async_fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(SelectError::NotAFile(path.display().to_string()));
        }
        if meta.len() > MAX_FILE_SIZE {
            return Err(SelectError::TooLarge { size: meta.len() });
        }

        let name = path
            .file_name()
            .ok_or_else(|| SelectError::NotAFile(path.display().to_string()))?
            .to_string_lossy()
            .to_string();
        let content_type = content_type_for(path).to_string();
        let bytes = async_fs::read(path).await?;

        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.size(),
            content_type: self.content_type.clone(),
        }
    }
}

/// Advisory content-type for the format families the product advertises.
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        _ => "application/octet-stream",
    }
}

/// A fully reassembled received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Receive-side reassembly state for one incoming file.
///
/// Chunks are kept in arrival order; the transport guarantees that order
/// matches emission order, and concatenating them reconstructs the file.
#[derive(Debug)]
pub struct TransferState {
    metadata: FileMetadata,
    chunks: Vec<Vec<u8>>,
    received_bytes: u64,
}

impl TransferState {
    pub fn new(metadata: FileMetadata) -> Self {
        Self {
            metadata,
            chunks: Vec::new(),
            received_bytes: 0,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.received_bytes += chunk.len() as u64;
        self.chunks.push(chunk);
    }

    /// Percentage of the declared size received so far, rounded, capped at 100.
    pub fn progress(&self) -> u8 {
        if self.metadata.size == 0 {
            return if self.is_complete() { 100 } else { 0 };
        }
        let pct = (self.received_bytes as f64 / self.metadata.size as f64 * 100.0).round();
        pct.min(100.0) as u8
    }

    /// Strict equality: a sender that overshoots its declared size never
    /// completes the transfer.
    pub fn is_complete(&self) -> bool {
        self.received_bytes == self.metadata.size
    }

    /// Concatenate the chunks, in arrival order, into the finished artifact.
    pub fn into_file(self) -> ReceivedFile {
        let mut bytes = Vec::with_capacity(self.received_bytes as usize);
        for chunk in &self.chunks {
            bytes.extend_from_slice(chunk);
        }
        ReceivedFile {
            name: self.metadata.name,
            content_type: self.metadata.content_type,
            bytes,
        }
    }
}
