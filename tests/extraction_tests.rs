//! Integration tests for envelope splitting, extraction and grouping.

use std::collections::HashSet;
use std::path::Path;

use pec_catalog::extract::classify::is_infrastructure_name;
use pec_catalog::extract::identity;
use pec_catalog::extract::MessageExtractor;
use pec_catalog::group::{normalize, Clusterer};
use pec_catalog::model::message::ExtractedMessage;
use pec_catalog::parser::mbox::MboxParser;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn extract_fixture() -> Vec<ExtractedMessage> {
    let parser = MboxParser::new(fixture("pec_sample.mbox")).unwrap();
    let archive_name = parser.archive_name();
    let extractor = MessageExtractor::default();
    parser
        .messages()
        .unwrap()
        .iter()
        .filter_map(|raw| extractor.extract(raw, &archive_name))
        .collect()
}

// ─── Every envelope yields one complete record ──────────────────────

#[test]
fn test_every_envelope_yields_a_record() {
    let messages = extract_fixture();
    assert_eq!(messages.len(), 5);
    for m in &messages {
        assert!(!m.subject.is_empty(), "empty subject in {}", m.id);
        assert!(m.sender.contains('@'), "bad sender {:?}", m.sender);
        assert!(!m.date.is_empty());
        assert!(m.has_body(), "no body in {}", m.subject);
        assert_eq!(m.archive_name, "pec_sample.mbox");
    }
}

// ─── Inner message, not the provider wrapper ────────────────────────

#[test]
fn test_inner_message_fields() {
    let messages = extract_fixture();
    let first = &messages[0];
    assert_eq!(first.subject, "Richiesta documenti");
    assert_eq!(first.sender, "ufficio@pec.esempio.it");
    assert_eq!(
        first.recipients,
        [
            "protocollo@pec.comune.esempio.it",
            "archivio@pec.comune.esempio.it",
            "protocollo@pec.comune.esempio.it",
        ]
    );
    assert_eq!(first.date, "12/03/2024 09:14");
    assert_eq!(first.origin_envelope_id, "<orig-1001@esempio.it>");
    assert!(first
        .body_text
        .as_deref()
        .unwrap()
        .contains("pratica 12/2024"));
    assert_eq!(first.cert_provider.as_deref(), Some("ARUBA PEC S.p.A."));
    assert_eq!(first.cert_type.as_deref(), Some("posta-certificata"));
    assert_eq!(first.cert_date.as_deref(), Some("12/03/2024 09:15:02"));

    assert_eq!(first.attachments.len(), 1);
    let pdf = &first.attachments[0];
    assert_eq!(pdf.filename, "richiesta.pdf");
    assert_eq!(pdf.content_type, "application/pdf");
    assert_eq!(pdf.size_bytes, 9);
    assert!(!pdf.is_inline);
}

// ─── Alternative bodies, inline images, attachments ─────────────────

#[test]
fn test_related_and_alternative_parts() {
    let messages = extract_fixture();
    let reply = &messages[1];
    assert_eq!(reply.subject, "R: Richiesta documenti");
    assert_eq!(reply.cert_provider.as_deref(), Some("InfoCert S.p.A."));
    assert_eq!(
        reply.body_text.as_deref().map(str::trim),
        Some("In allegato la documentazione richiesta.")
    );
    assert!(reply.body_html.as_deref().unwrap().contains("cid:firma@comune"));

    let names: Vec<&str> = reply.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, ["inline_firma@comune.png", "note.txt"]);

    let image = &reply.attachments[0];
    assert!(image.is_inline);
    assert_eq!(image.content_id.as_deref(), Some("firma@comune"));
    assert_eq!(image.size_bytes, 8);
    assert!(!reply.attachments[1].is_inline);
}

// ─── Charsets and envelope fallbacks ────────────────────────────────

#[test]
fn test_encoded_subject_and_envelope_fallbacks() {
    let messages = extract_fixture();
    let notice = &messages[2];
    assert_eq!(notice.subject, "Convocazione riunione del lunedì");
    assert_eq!(notice.sender, "segreteria@pec.esempio.it");
    assert!(notice.body_text.as_deref().unwrap().contains("è convocata"));

    // No Message-ID or Date on the inner message: both come from the envelope.
    assert_eq!(
        notice.origin_envelope_id,
        "<opec210.20240318164000.3003@pec.aruba.it>"
    );
    assert_eq!(notice.date, "18/03/2024 16:40");

    // Its certification metadata is truncated XML.
    assert!(notice.cert_provider.is_none());
    assert!(notice.cert_type.is_none());
}

// ─── Degraded mode and re-parsed originals ──────────────────────────

#[test]
fn test_receipt_without_original_uses_envelope() {
    let messages = extract_fixture();
    let receipt = &messages[3];
    assert_eq!(receipt.subject, "ACCETTAZIONE: Richiesta documenti");
    assert_eq!(receipt.sender, "posta-certificata@pec.aruba.it");
    assert!(receipt.cert_type.is_none());
    assert!(receipt.attachments.is_empty());
    assert!(receipt
        .body_text
        .as_deref()
        .unwrap()
        .contains("Ricevuta di accettazione"));
}

#[test]
fn test_original_attached_as_plain_file() {
    let messages = extract_fixture();
    let minutes = &messages[4];
    assert_eq!(minutes.subject, "Verbale assemblea");
    assert_eq!(minutes.sender, "amministrazione@pec.condominio.it");
    assert_eq!(minutes.date, "22/03/2024 12:29");
    assert!(minutes.attachments.is_empty());
}

// ─── Infrastructure parts never leak ────────────────────────────────

#[test]
fn test_no_infrastructure_attachments() {
    for m in extract_fixture() {
        for a in &m.attachments {
            assert!(!is_infrastructure_name(&a.filename), "{} leaked", a.filename);
        }
    }
}

// ─── Determinism ────────────────────────────────────────────────────

#[test]
fn test_ids_are_deterministic() {
    let a: Vec<String> = extract_fixture().into_iter().map(|m| m.id).collect();
    let b: Vec<String> = extract_fixture().into_iter().map(|m| m.id).collect();
    assert_eq!(a, b);
    assert_eq!(a.iter().collect::<HashSet<_>>().len(), a.len());
    assert_eq!(a[0], identity::message_id("<orig-1001@esempio.it>", "", "", ""));
}

// ─── Grouping the fixture ───────────────────────────────────────────

#[test]
fn test_fixture_grouping() {
    let mut messages = extract_fixture();
    let groups = Clusterer::default().cluster(&mut messages);

    let total: usize = groups.iter().map(|g| g.member_ids.len()).sum();
    assert_eq!(total, messages.len());

    assert_eq!(groups[0].label, "Richiesta documenti");
    assert_eq!(
        groups[0].member_ids,
        [messages[0].id.clone(), messages[1].id.clone()]
    );
    assert_eq!(groups.len(), 4);
    assert_eq!(
        messages[1].normalized_subject.as_deref(),
        Some("Richiesta documenti")
    );
}

#[test]
fn test_normalize_examples() {
    assert_eq!(normalize("POSTA CERTIFICATA: Re: Oggetto: test"), "test");
    assert_eq!(normalize("R: Hello"), "Hello");
    let once = normalize("  POSTA   CERTIFICATA:  I:  Fwd: Convocazione ");
    assert_eq!(once, "Convocazione");
    assert_eq!(normalize(&once), once);
}

// ─── Identity collisions on a large synthetic corpus ────────────────

/// Ids keep 48 bits of SHA-256, so collisions are possible in principle.
/// For 50 000 distinct keys the birthday bound puts the expected number of
/// colliding pairs around 4e-6; the count is reported, not asserted zero.
#[test]
fn test_identity_collisions_on_synthetic_corpus() {
    const N: usize = 50_000;
    let mut seen = HashSet::with_capacity(N);
    let mut collisions = 0usize;
    for i in 0..N {
        let id = identity::message_id(
            &format!("<msg-{i}@pec.esempio.it>"),
            "ufficio@pec.esempio.it",
            "Richiesta documenti",
            "Tue, 12 Mar 2024 09:14:40 +0100",
        );
        assert!(id.starts_with("email_"));
        assert_eq!(id.len(), "email_".len() + identity::MESSAGE_ID_HEX_LEN);
        if !seen.insert(id) {
            collisions += 1;
        }
    }
    eprintln!("{collisions} id collision(s) across {N} synthetic messages");
    assert!(collisions <= N / 1000);
}
