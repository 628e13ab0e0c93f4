//! Attachment metadata and the decoded bytes that travel with it.
//!
//! Only metadata is stored in message records. Payload bytes are handed to the
//! attachment store once, at ingestion time.

/// Metadata about a genuine attachment of the original message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    /// Filesystem-safe filename. Never one of the PEC infrastructure names.
    pub filename: String,

    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Decoded size in bytes.
    pub size_bytes: u64,

    /// Content-ID without angle brackets, for parts referenced from HTML.
    pub content_id: Option<String>,

    /// `true` for inline images, `false` for regular attachments.
    pub is_inline: bool,
}

/// Decoded attachment content, produced alongside [`Attachment`] records.
#[derive(Debug, Clone)]
pub struct AttachmentPayload {
    /// Name to store the bytes under. Nameless inline images get a synthetic
    /// `inline_<cid>.<subtype>` name.
    pub filename: String,
    /// Decoded bytes.
    pub data: Vec<u8>,
}
