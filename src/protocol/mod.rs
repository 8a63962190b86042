use serde::{Deserialize, Serialize};

/// Largest file the sending side will accept. Checked before any metadata
/// frame is emitted.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Descriptor announced ahead of a file's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Structured records exchanged between peers as text frames.
///
/// The payload itself travels as an untagged binary frame; receivers tell the
/// two apart by frame type, and text frames by the `kind` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PeerMessage {
    /// Announcement preceding a file's byte stream.
    Metadata(FileMetadata),
}

impl PeerMessage {
    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from the JSON wire form
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// One outbound transport message: a structured record or a raw byte block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Metadata(FileMetadata),
    Payload(Vec<u8>),
}
