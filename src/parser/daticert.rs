//! Certification metadata (`daticert.xml`) parsing.
//!
//! ```xml
//! <postacert tipo="posta-certificata" errore="nessuno">
//!   <intestazione>
//!     <mittente>mittente@pec.it</mittente>
//!     <oggetto>Oggetto del messaggio</oggetto>
//!   </intestazione>
//!   <dati>
//!     <gestore-emittente>ARUBA PEC S.p.A.</gestore-emittente>
//!     <data zona="+0100"><giorno>12/03/2024</giorno><ora>09:15:02</ora></data>
//!   </dati>
//! </postacert>
//! ```

use roxmltree::{Document, Node, ParsingOptions};
use tracing::debug;

/// Fields read from the certification metadata. Every field is optional:
/// a malformed document simply yields [`CertMetadata::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertMetadata {
    /// `tipo` attribute (e.g. `posta-certificata`, `accettazione`).
    pub cert_type: Option<String>,
    /// `errore` attribute (`nessuno` when delivery succeeded).
    pub error: Option<String>,
    /// `intestazione/mittente`.
    pub sender: Option<String>,
    /// `intestazione/oggetto`.
    pub subject: Option<String>,
    /// `dati/gestore-emittente`.
    pub provider: Option<String>,
    /// `dati/data/giorno` + `dati/data/ora`, joined by a space.
    pub date: Option<String>,
}

impl CertMetadata {
    /// Parse the raw bytes of a `daticert.xml` part.
    pub fn parse(data: &[u8]) -> Self {
        let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
        let text = String::from_utf8_lossy(data);

        // daticert.xml usually references a DTD; it is never fetched.
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = match Document::parse_with_options(&text, options) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(error = %e, "Malformed certification metadata, ignoring");
                return Self::default();
            }
        };

        let root = doc.root_element();
        let heading = child(root, "intestazione");
        let data_section = child(root, "dati");

        Self {
            cert_type: root.attribute("tipo").map(str::to_string),
            error: root.attribute("errore").map(str::to_string),
            sender: heading.and_then(|h| child_text(h, "mittente")),
            subject: heading.and_then(|h| child_text(h, "oggetto")),
            provider: data_section.and_then(|d| child_text(d, "gestore-emittente")),
            date: data_section
                .and_then(|d| child(d, "data"))
                .and_then(|date| {
                    // Both elements must exist; either may be empty.
                    let day = child(date, "giorno")?;
                    let time = child(date, "ora")?;
                    Some(format!("{} {}", element_text(day), element_text(time)))
                }),
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn element_text(node: Node<'_, '_>) -> String {
    node.text().map(str::trim).unwrap_or_default().to_string()
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .map(element_text)
        .filter(|t| !t.is_empty())
}
