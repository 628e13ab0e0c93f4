//! MIME tree model for PEC envelopes.
//!
//! `mail-parser` does the transfer and charset decoding; its flat part list is
//! then folded into a recursive [`MimeNode`] so that envelope navigation can be
//! written as plain pattern matches. Nesting deeper than [`MAX_DEPTH`] is cut
//! off: no known envelope layout goes beyond four levels.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::warn;

use crate::parser::header::HeaderMap;

/// Maximum nesting depth kept when building the tree (guards adversarial input).
pub const MAX_DEPTH: usize = 10;

/// Content-level headers of one MIME part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartInfo {
    /// Lowercased `type/subtype`. Defaults to `text/plain`.
    pub content_type: String,
    /// Lowercased disposition type (`attachment`, `inline`), if present.
    pub disposition: Option<String>,
    /// Decoded filename from `Content-Disposition` or `Content-Type; name=`.
    pub filename: Option<String>,
    /// Raw `Content-ID` value.
    pub content_id: Option<String>,
}

impl PartInfo {
    pub fn has_disposition(&self, kind: &str) -> bool {
        self.disposition.as_deref() == Some(kind)
    }
}

/// One node of the envelope tree.
#[derive(Debug, Clone)]
pub enum MimeNode {
    /// A part with a body: text, HTML, or binary content.
    Leaf {
        info: PartInfo,
        /// Decoded body bytes.
        data: Vec<u8>,
        /// Decoded text for `text/*` parts.
        text: Option<String>,
    },
    /// A `multipart/*` container.
    Multipart {
        info: PartInfo,
        children: Vec<MimeNode>,
    },
    /// A `message/rfc822` part, already unwrapped.
    Embedded {
        info: PartInfo,
        message: Box<MimeMessage>,
    },
}

impl MimeNode {
    pub fn info(&self) -> &PartInfo {
        match self {
            MimeNode::Leaf { info, .. }
            | MimeNode::Multipart { info, .. }
            | MimeNode::Embedded { info, .. } => info,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.info().content_type
    }

    /// Immediate children of a multipart node (empty for anything else).
    pub fn children(&self) -> &[MimeNode] {
        match self {
            MimeNode::Multipart { children, .. } => children,
            _ => &[],
        }
    }
}

/// A parsed message: its top-level headers and its body tree.
#[derive(Debug, Clone)]
pub struct MimeMessage {
    pub headers: HeaderMap,
    pub root: MimeNode,
}

impl MimeMessage {
    /// Parse raw message bytes (a leading mbox `From ` line is skipped).
    ///
    /// Returns `None` only when `mail-parser` cannot make anything of the input.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let bytes = skip_from_line(raw);
        let message = MessageParser::default().parse(bytes)?;
        Some(Self::from_parsed(&message, 0))
    }

    fn from_parsed(message: &Message<'_>, depth: usize) -> Self {
        let raw: &[u8] = message.raw_message.as_ref();
        let root = message.root_part();
        let header_bytes = raw
            .get(root.offset_header as usize..root.offset_body as usize)
            .unwrap_or_default();

        Self {
            headers: HeaderMap::parse(header_bytes),
            root: build_node(message, 0, depth).unwrap_or_else(|| MimeNode::Leaf {
                info: PartInfo {
                    content_type: "text/plain".to_string(),
                    ..PartInfo::default()
                },
                data: Vec::new(),
                text: None,
            }),
        }
    }
}

/// Fold part `part_id` of `message` (and its descendants) into a [`MimeNode`].
fn build_node(message: &Message<'_>, part_id: usize, depth: usize) -> Option<MimeNode> {
    if depth > MAX_DEPTH {
        warn!(depth, "MIME nesting too deep, dropping subtree");
        return None;
    }
    let part = message.parts.get(part_id)?;
    let info = part_info(part);

    let node = match &part.body {
        PartType::Multipart(ids) => MimeNode::Multipart {
            info,
            children: ids
                .iter()
                .filter_map(|&id| build_node(message, id as usize, depth + 1))
                .collect(),
        },
        PartType::Message(nested) => MimeNode::Embedded {
            info,
            message: Box::new(MimeMessage::from_parsed(nested, depth + 1)),
        },
        PartType::Text(text) | PartType::Html(text) => MimeNode::Leaf {
            info,
            data: text.as_bytes().to_vec(),
            text: Some(text.to_string()),
        },
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            let data = bytes.to_vec();
            // Some mailers label XML or text as binary; keep a lossy view.
            let text = info
                .content_type
                .starts_with("text/")
                .then(|| String::from_utf8_lossy(&data).into_owned());
            MimeNode::Leaf { info, data, text }
        }
    };
    Some(node)
}

fn part_info(part: &MessagePart<'_>) -> PartInfo {
    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase();

    let disposition = part
        .content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase());

    PartInfo {
        content_type,
        disposition,
        filename: part.attachment_name().map(str::to_string),
        content_id: part.content_id().map(str::to_string),
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
