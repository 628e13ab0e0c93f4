//! Groups, sources and the cumulative catalog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::message::MessageSummary;

/// A set of messages whose normalized subjects are similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// `group_` + 8 hex chars derived from the label.
    pub id: String,
    /// Longest normalized subject among the members.
    pub label: String,
    /// Member message ids, in bucket order.
    pub member_ids: Vec<String>,
}

/// The extracted result set of one ingested archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub archive_name: String,
    /// Ingestion timestamp (`%d/%m/%Y %H:%M`). Kept across in-place replacement.
    pub ingested_at: String,
    pub message_count: usize,
    pub groups: Vec<Group>,
    pub summaries: Vec<MessageSummary>,
}

impl Source {
    /// Ids of every message listed by this source.
    pub fn message_ids(&self) -> HashSet<&str> {
        self.summaries.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            id: self.id.clone(),
            archive_name: self.archive_name.clone(),
            ingested_at: self.ingested_at.clone(),
            message_count: self.message_count,
        }
    }
}

/// A source without its groups and summaries, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub archive_name: String,
    pub ingested_at: String,
    pub message_count: usize,
}

/// Process-wide aggregate of every ingested source.
///
/// Totals are derived data: call [`Catalog::recompute_totals`] after any change
/// to `sources` instead of adjusting them by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Sum of `message_count` over all sources. Not deduplicated.
    pub total_messages: usize,
    pub total_sources: usize,
    pub sources: Vec<Source>,
}

impl Catalog {
    pub fn from_sources(sources: Vec<Source>) -> Self {
        let mut catalog = Self {
            total_messages: 0,
            total_sources: 0,
            sources,
        };
        catalog.recompute_totals();
        catalog
    }

    /// Recompute `total_messages` and `total_sources` from scratch.
    pub fn recompute_totals(&mut self) {
        self.total_sources = self.sources.len();
        self.total_messages = self.sources.iter().map(|s| s.message_count).sum();
    }

    /// Iterate every summary across sources. Shared ids appear once per source.
    pub fn summaries(&self) -> impl Iterator<Item = &MessageSummary> {
        self.sources.iter().flat_map(|s| s.summaries.iter())
    }
}
