//! The extracted-message record and its lightweight catalog summary.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::attachment::Attachment;

/// One genuine message recovered from a PEC envelope.
///
/// Serialized as-is into `emails/<id>.json` by the JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMessage {
    /// Stable identity (`email_` + 12 hex chars). Identical inputs always
    /// yield the same id, so the same message in two archives shares storage.
    pub id: String,

    /// Raw `Message-ID` header of the inner message (may be empty).
    pub origin_envelope_id: String,

    /// Decoded subject line of the inner message.
    pub subject: String,

    /// Bare sender address.
    pub sender: String,

    /// `To` then `Cc` addresses, in header order. Duplicates are kept.
    pub recipients: Vec<String>,

    /// Display date (`%d/%m/%Y %H:%M`), or the raw header when unparseable.
    pub date: String,

    /// The parsed `Date` header with the sender's offset. `None` when the
    /// header is missing or unparseable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<FixedOffset>>,

    /// Longest `text/plain` body part.
    pub body_text: Option<String>,

    /// Longest `text/html` body part.
    pub body_html: Option<String>,

    /// Genuine attachments and inline images, in MIME order.
    pub attachments: Vec<Attachment>,

    /// Issuing provider (`gestore-emittente`) from the certification metadata.
    pub cert_provider: Option<String>,

    /// Certification type (`tipo` attribute, e.g. `posta-certificata`).
    pub cert_type: Option<String>,

    /// Certification timestamp, `"<giorno> <ora>"`.
    pub cert_date: Option<String>,

    /// Grouping key. Set by the clusterer, not by the extractor.
    pub normalized_subject: Option<String>,

    /// Basename of the archive this record was extracted from.
    pub archive_name: String,
}

impl ExtractedMessage {
    /// Build the per-source summary row for this message.
    pub fn summary(&self) -> MessageSummary {
        MessageSummary {
            id: self.id.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            date: self.date.clone(),
            normalized_subject: self.normalized_subject.clone().unwrap_or_default(),
            attachment_count: self.attachments.len(),
            cert_provider: self.cert_provider.clone(),
            archive_name: self.archive_name.clone(),
        }
    }

    /// Whether either body variant carries any content.
    pub fn has_body(&self) -> bool {
        self.body_text.as_deref().is_some_and(|t| !t.is_empty())
            || self.body_html.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Lightweight per-message row stored inside a [`Source`](super::catalog::Source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub normalized_subject: String,
    pub attachment_count: usize,
    pub cert_provider: Option<String>,
    pub archive_name: String,
}
