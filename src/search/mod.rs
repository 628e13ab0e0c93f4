//! Linear catalog search.
//!
//! Two phases per summary: the cheap metadata fields kept in the catalog
//! (subject, sender, normalized subject), then the stored body text and HTML.
//! Complexity is O(n) in summaries, plus one record load per metadata miss.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::store::CatalogStore;
use crate::error::Result;
use crate::model::catalog::Catalog;
use crate::model::message::{ExtractedMessage, MessageSummary};

/// Case-insensitive substring search across every source.
///
/// Each message id is reported once, with the summary of the first source
/// that lists it. A blank query matches nothing.
pub fn search<S: CatalogStore + ?Sized>(
    store: &S,
    catalog: &Catalog,
    query: &str,
) -> Result<Vec<MessageSummary>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut results = Vec::new();
    let mut body_scans = 0usize;

    for summary in catalog.summaries() {
        if seen.contains(summary.id.as_str()) {
            continue;
        }

        let matched = summary_matches(summary, &needle) || {
            body_scans += 1;
            store
                .load_message(&summary.id)?
                .is_some_and(|message| body_matches(&message, &needle))
        };

        if matched {
            seen.insert(summary.id.as_str());
            results.push(summary.clone());
        }
    }

    debug!(query, results = results.len(), body_scans, "Search finished");
    Ok(results)
}

fn summary_matches(summary: &MessageSummary, needle: &str) -> bool {
    [
        summary.subject.as_str(),
        summary.sender.as_str(),
        summary.normalized_subject.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

fn body_matches(message: &ExtractedMessage, needle: &str) -> bool {
    [message.body_text.as_deref(), message.body_html.as_deref()]
        .into_iter()
        .flatten()
        .any(|body| body.to_lowercase().contains(needle))
}
