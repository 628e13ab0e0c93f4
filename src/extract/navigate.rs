//! Locating the certification metadata and the original message inside a
//! PEC envelope.
//!
//! Typical layout:
//!
//! ```text
//! multipart/signed
//! ├── multipart/mixed            <- bundle
//! │   ├── multipart/alternative  (provider's notice)
//! │   ├── application/xml        daticert.xml
//! │   └── message/rfc822         postacert.eml
//! └── application/pkcs7-signature smime.p7s
//! ```

use std::borrow::Cow;

use crate::parser::mime::{MimeMessage, MimeNode};

pub const METADATA_FILENAME: &str = "daticert.xml";
pub const ORIGINAL_FILENAME: &str = "postacert.eml";

const BUNDLE_TYPE: &str = "multipart/mixed";

/// What navigation found inside one envelope.
#[derive(Debug, Default)]
pub struct EnvelopeParts<'a> {
    /// The certification metadata part.
    pub metadata: Option<&'a MimeNode>,
    /// The original message. Borrowed when it was already embedded,
    /// owned when a leaf had to be re-parsed.
    pub original: Option<Cow<'a, MimeMessage>>,
}

/// Find the bundle container: the envelope itself, one of its children, or
/// a grandchild under a multipart child.
pub fn find_bundle(root: &MimeNode) -> Option<&MimeNode> {
    if root.content_type() == BUNDLE_TYPE {
        return Some(root);
    }
    for part in root.children() {
        if part.content_type() == BUNDLE_TYPE {
            return Some(part);
        }
        if let Some(sub) = part
            .children()
            .iter()
            .find(|sub| sub.content_type() == BUNDLE_TYPE)
        {
            return Some(sub);
        }
    }
    None
}

/// Scan the bundle's immediate parts for the metadata and the original
/// message. Without a bundle, the envelope's own children are scanned.
/// When several parts match, the last one wins.
pub fn find_parts(envelope: &MimeMessage) -> EnvelopeParts<'_> {
    let bundle = find_bundle(&envelope.root).unwrap_or(&envelope.root);
    let mut found = EnvelopeParts::default();

    for part in bundle.children() {
        let info = part.info();
        let filename = info.filename.as_deref();

        if filename == Some(METADATA_FILENAME)
            || (info.content_type == "application/xml" && filename.is_none())
        {
            found.metadata = Some(part);
        } else if filename == Some(ORIGINAL_FILENAME) || info.content_type == "message/rfc822" {
            match part {
                MimeNode::Embedded { message, .. } => {
                    found.original = Some(Cow::Borrowed(message.as_ref()));
                }
                MimeNode::Leaf { data, .. } => {
                    if let Some(message) = MimeMessage::parse(data) {
                        found.original = Some(Cow::Owned(message));
                    }
                }
                MimeNode::Multipart { .. } => {}
            }
        }
    }
    found
}
