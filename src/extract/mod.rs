//! Recovering the genuine message from a PEC envelope.
//!
//! An envelope is the provider's signed wrapper. Inside it sit the
//! certification metadata (`daticert.xml`), the original message
//! (`postacert.eml`) and a detached signature. [`MessageExtractor`] turns one
//! raw envelope into one [`ExtractedMessage`]; nothing in here returns an
//! error, malformed pieces just degrade to defaults.

pub mod classify;
pub mod identity;
pub mod navigate;

use tracing::{debug, warn};

use crate::config::{Config, DEFAULT_DATE_FORMAT};
use crate::model::address::{bare_address, Mailbox};
use crate::model::attachment::AttachmentPayload;
use crate::model::message::ExtractedMessage;
use crate::parser::daticert::CertMetadata;
use crate::parser::header::{format_date, parse_date, HeaderMap};
use crate::parser::mime::{MimeMessage, MimeNode};

/// Extracts one [`ExtractedMessage`] per envelope.
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    date_format: String,
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl MessageExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            date_format: config.general.checked_date_format().to_string(),
        }
    }

    /// Extract the message carried by `envelope`.
    ///
    /// Returns `None` only when the bytes cannot be parsed as a message at all.
    pub fn extract(&self, envelope: &[u8], archive_name: &str) -> Option<ExtractedMessage> {
        self.extract_with_payloads(envelope, archive_name)
            .map(|(message, _)| message)
    }

    /// Like [`extract`](Self::extract), also returning the decoded bytes of
    /// every attachment, named as in the record.
    pub fn extract_with_payloads(
        &self,
        envelope: &[u8],
        archive_name: &str,
    ) -> Option<(ExtractedMessage, Vec<AttachmentPayload>)> {
        let Some(outer) = MimeMessage::parse(envelope) else {
            warn!(
                archive = archive_name,
                size = envelope.len(),
                "Envelope is not a parseable message, skipping"
            );
            return None;
        };

        let parts = navigate::find_parts(&outer);
        let (inner, cert) = match &parts.original {
            Some(original) => {
                let cert = parts
                    .metadata
                    .map(metadata_of)
                    .unwrap_or_default();
                (&**original, cert)
            }
            None => {
                debug!(
                    archive = archive_name,
                    "No original message in envelope, using the envelope itself"
                );
                (&outer, CertMetadata::default())
            }
        };

        let headers = &inner.headers;
        let subject = headers.decoded("subject");
        let sender = bare_address(&headers.decoded("from"));
        let recipients = recipients(headers);
        let message_id = first_non_empty(headers.raw("message-id"), &outer.headers, "message-id");
        let raw_date = first_non_empty(headers.raw("date"), &outer.headers, "date");
        let date = format_date(&raw_date, &self.date_format);

        let classified = classify::classify(&inner.root);
        let id = identity::message_id(&message_id, &sender, &subject, &raw_date);

        debug!(
            id = %id,
            subject = %subject,
            attachments = classified.attachments.len(),
            "Extracted message"
        );

        let message = ExtractedMessage {
            id,
            origin_envelope_id: message_id,
            subject,
            sender,
            recipients,
            date,
            sent_at: parse_date(&raw_date),
            body_text: classified.body_text,
            body_html: classified.body_html,
            attachments: classified.attachments,
            cert_provider: cert.provider,
            cert_type: cert.cert_type,
            cert_date: cert.date,
            normalized_subject: None,
            archive_name: archive_name.to_string(),
        };
        Some((message, classified.payloads))
    }
}

fn metadata_of(node: &MimeNode) -> CertMetadata {
    match node {
        MimeNode::Leaf { data, .. } => CertMetadata::parse(data),
        _ => CertMetadata::default(),
    }
}

/// `To` then `Cc`, bare addresses in header order.
fn recipients(headers: &HeaderMap) -> Vec<String> {
    ["to", "cc"]
        .iter()
        .flat_map(|name| Mailbox::parse_list(&headers.decoded(name)))
        .map(|mailbox| mailbox.address)
        .filter(|address| !address.is_empty())
        .collect()
}

/// `value` when non-empty, else the same header from the envelope.
fn first_non_empty(value: String, envelope: &HeaderMap, name: &str) -> String {
    if value.is_empty() {
        envelope.raw(name)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = "From posta-certificata@pec.aruba.it Tue Mar 12 09:15:02 2024\r\n\
From: \"Per conto di: ufficio@pec.esempio.it\" <posta-certificata@pec.aruba.it>\r\n\
To: protocollo@pec.comune.it\r\n\
Subject: POSTA CERTIFICATA: Richiesta documenti\r\n\
Message-ID: <opec210.1@pec.aruba.it>\r\n\
Date: Tue, 12 Mar 2024 09:15:02 +0100\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/signed; protocol=\"application/pkcs7-signature\"; micalg=sha-256; boundary=\"S\"\r\n\
\r\n\
--S\r\n\
Content-Type: multipart/mixed; boundary=\"M\"\r\n\
\r\n\
--M\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Messaggio di posta certificata\r\n\
--M\r\n\
Content-Type: application/xml; name=\"daticert.xml\"\r\n\
Content-Disposition: inline; filename=\"daticert.xml\"\r\n\
\r\n\
<?xml version=\"1.0\"?><postacert tipo=\"posta-certificata\" errore=\"nessuno\"><dati><gestore-emittente>ARUBA PEC S.p.A.</gestore-emittente><data zona=\"+0100\"><giorno>12/03/2024</giorno><ora>09:15:02</ora></data></dati></postacert>\r\n\
--M\r\n\
Content-Type: message/rfc822; name=\"postacert.eml\"\r\n\
Content-Disposition: inline; filename=\"postacert.eml\"\r\n\
\r\n\
From: Ufficio <ufficio@pec.esempio.it>\r\n\
To: protocollo@pec.comune.it, Archivio <archivio@pec.comune.it>\r\n\
Cc: protocollo@pec.comune.it\r\n\
Subject: =?UTF-8?Q?Richiesta_documenti_n=C2=B0_12?=\r\n\
Message-ID: <orig-1@esempio.it>\r\n\
Date: Tue, 12 Mar 2024 09:14:40 +0100\r\n\
Content-Type: multipart/mixed; boundary=\"I\"\r\n\
\r\n\
--I\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Si richiede copia degli atti.\r\n\
--I\r\n\
Content-Type: application/pdf; name=\"atto.pdf\"\r\n\
Content-Disposition: attachment; filename=\"atto.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--I--\r\n\
\r\n\
--M--\r\n\
\r\n\
--S\r\n\
Content-Type: application/pkcs7-signature; name=\"smime.p7s\"\r\n\
Content-Disposition: attachment; filename=\"smime.p7s\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAAA\r\n\
--S--\r\n";

    #[test]
    fn test_extract_full_envelope() {
        let (msg, payloads) = MessageExtractor::default()
            .extract_with_payloads(ENVELOPE.as_bytes(), "marzo.mbox")
            .expect("extract");

        assert_eq!(msg.subject, "Richiesta documenti n° 12");
        assert_eq!(msg.sender, "ufficio@pec.esempio.it");
        assert_eq!(
            msg.recipients,
            [
                "protocollo@pec.comune.it",
                "archivio@pec.comune.it",
                "protocollo@pec.comune.it"
            ]
        );
        assert_eq!(msg.date, "12/03/2024 09:14");
        assert_eq!(msg.origin_envelope_id, "<orig-1@esempio.it>");
        assert_eq!(msg.body_text.as_deref(), Some("Si richiede copia degli atti."));
        assert_eq!(msg.cert_provider.as_deref(), Some("ARUBA PEC S.p.A."));
        assert_eq!(msg.cert_type.as_deref(), Some("posta-certificata"));
        assert_eq!(msg.cert_date.as_deref(), Some("12/03/2024 09:15:02"));
        assert_eq!(msg.archive_name, "marzo.mbox");
        assert!(msg.normalized_subject.is_none());

        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, "atto.pdf");
        assert_eq!(payloads[0].data, b"%PDF-1.4\n");
    }

    #[test]
    fn test_invalid_configured_date_format_falls_back() {
        let mut config = Config::default();
        config.general.date_format = "%d/%Q".to_string();
        let msg = MessageExtractor::new(&config)
            .extract(ENVELOPE.as_bytes(), "marzo.mbox")
            .expect("extract");
        assert_eq!(msg.date, "12/03/2024 09:14");
        assert_eq!(
            msg.sent_at.map(|d| d.to_rfc3339()).as_deref(),
            Some("2024-03-12T09:14:40+01:00")
        );
    }

    #[test]
    fn test_near_miss_infrastructure_names_are_not_attachments() {
        let envelope = ENVELOPE.replace(
            "filename=\"atto.pdf\"",
            "filename=\"smime.p7s.\"",
        );
        let msg = MessageExtractor::default()
            .extract(envelope.as_bytes(), "marzo.mbox")
            .expect("extract");
        assert!(msg.attachments.is_empty(), "{:?}", msg.attachments);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = MessageExtractor::default();
        let a = extractor.extract(ENVELOPE.as_bytes(), "a.mbox").unwrap();
        let b = extractor.extract(ENVELOPE.as_bytes(), "b.mbox").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, identity::message_id("<orig-1@esempio.it>", "", "", ""));
    }

    #[test]
    fn test_degraded_envelope_uses_outer_headers() {
        let raw = b"From: Mittente <mittente@esempio.it>\r\n\
Subject: Avviso senza busta\r\n\
Date: not a date\r\n\
\r\n\
Testo semplice\r\n";
        let msg = MessageExtractor::default().extract(raw, "x.mbox").unwrap();
        assert_eq!(msg.subject, "Avviso senza busta");
        assert_eq!(msg.sender, "mittente@esempio.it");
        assert_eq!(msg.date, "not a date");
        assert!(msg.cert_provider.is_none());
        assert!(msg.body_text.as_deref().unwrap_or("").contains("Testo semplice"));
        assert_eq!(
            msg.id,
            identity::message_id("", "mittente@esempio.it", "Avviso senza busta", "not a date")
        );
    }
}
