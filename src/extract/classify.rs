//! Part classification: body text, genuine attachments, inline images.

use std::collections::HashSet;

use crate::extract::navigate::{METADATA_FILENAME, ORIGINAL_FILENAME};
use crate::model::attachment::{Attachment, AttachmentPayload};
use crate::parser::mime::{MimeNode, PartInfo};

/// Envelope parts that are never attachments of the original message.
const INFRASTRUCTURE_NAMES: [&str; 3] = ["smime.p7s", METADATA_FILENAME, ORIGINAL_FILENAME];

/// Body and attachments recovered from a message tree.
#[derive(Debug, Default)]
pub struct Classified {
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub payloads: Vec<AttachmentPayload>,
}

/// Classify every leaf of `root`.
///
/// A single-part message only contributes a body. Multipart containers are
/// skipped and embedded messages are descended into.
pub fn classify(root: &MimeNode) -> Classified {
    let mut out = Classified::default();

    if let MimeNode::Leaf { info, data, text } = root {
        let body = leaf_text(data, text.as_deref());
        match info.content_type.as_str() {
            "text/plain" => out.body_text = Some(body),
            "text/html" => out.body_html = Some(body),
            _ => {}
        }
        return out;
    }

    let mut leaves = Vec::new();
    collect_leaves(root, &mut leaves);

    let mut used_names = HashSet::new();
    for leaf in leaves {
        let MimeNode::Leaf { info, data, text } = leaf else {
            continue;
        };

        // Checked before and after sanitizing: trimming can turn a near-miss
        // such as "smime.p7s." into an infrastructure name.
        if info.filename.as_deref().is_some_and(|name| {
            is_infrastructure_name(name) || is_infrastructure_name(&sanitize_filename(name))
        }) {
            continue;
        }

        let is_attachment = is_attachment(info);
        let is_inline_image = info.has_disposition("inline") && info.content_type.starts_with("image/");

        match info.content_type.as_str() {
            "text/plain" if !is_attachment => {
                keep_longest(&mut out.body_text, leaf_text(data, text.as_deref()));
            }
            "text/html" if !is_attachment => {
                keep_longest(&mut out.body_html, leaf_text(data, text.as_deref()));
            }
            _ if info.filename.is_some() || is_attachment || is_inline_image => {
                let name = unique_name(&attachment_name(info, is_inline_image), &mut used_names);
                out.attachments.push(Attachment {
                    filename: name.clone(),
                    content_type: info.content_type.clone(),
                    size_bytes: data.len() as u64,
                    content_id: content_id(info),
                    is_inline: is_inline_image,
                });
                out.payloads.push(AttachmentPayload {
                    filename: name,
                    data: data.clone(),
                });
            }
            _ => {}
        }
    }
    out
}

/// Case-insensitive match against the PEC infrastructure filenames.
pub fn is_infrastructure_name(filename: &str) -> bool {
    INFRASTRUCTURE_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(filename))
}

/// Replace characters unsafe in filenames with `_` and trim leading and
/// trailing dots and spaces. Empty results become `"unnamed"`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn collect_leaves<'a>(node: &'a MimeNode, out: &mut Vec<&'a MimeNode>) {
    match node {
        MimeNode::Leaf { .. } => out.push(node),
        MimeNode::Multipart { children, .. } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
        MimeNode::Embedded { message, .. } => collect_leaves(&message.root, out),
    }
}

/// An "attachment" disposition, or a filename outside an "inline" disposition.
fn is_attachment(info: &PartInfo) -> bool {
    info.has_disposition("attachment")
        || (info.filename.is_some() && !info.has_disposition("inline"))
}

fn leaf_text(data: &[u8], text: Option<&str>) -> String {
    match text {
        Some(t) => t.to_string(),
        None => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Keep the longer of the current candidate and `text`. Empty text never wins.
fn keep_longest(slot: &mut Option<String>, text: String) {
    if text.is_empty() {
        return;
    }
    if slot.as_ref().is_none_or(|current| text.len() > current.len()) {
        *slot = Some(text);
    }
}

fn attachment_name(info: &PartInfo, is_inline_image: bool) -> String {
    match &info.filename {
        Some(name) => sanitize_filename(name),
        None if is_inline_image => {
            let subtype = info
                .content_type
                .split_once('/')
                .map(|(_, sub)| sub)
                .unwrap_or("bin");
            let cid = content_id(info).unwrap_or_else(|| "image".to_string());
            sanitize_filename(&format!("inline_{cid}.{subtype}"))
        }
        None => "unnamed".to_string(),
    }
}

fn content_id(info: &PartInfo) -> Option<String> {
    info.content_id
        .as_deref()
        .map(|cid| cid.trim().trim_matches(|c| c == '<' || c == '>').to_string())
        .filter(|cid| !cid.is_empty())
}

/// `name`, or `base_1.ext`, `base_2.ext`, … when already taken.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (base, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    };
    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
