//! Subject-similarity clustering.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::config::{Config, DEFAULT_DATE_FORMAT, DEFAULT_SIMILARITY_THRESHOLD};
use crate::extract::identity::short_hash;
use crate::group::{similarity, subject};
use crate::model::catalog::Group;
use crate::model::message::ExtractedMessage;

const GROUP_ID_HEX_LEN: usize = 8;

/// Partitions messages into groups of similar normalized subjects.
#[derive(Debug, Clone)]
pub struct Clusterer {
    threshold: f64,
    date_format: String,
}

impl Default for Clusterer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Clusterer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.grouping.similarity_threshold,
            date_format: config.general.checked_date_format().to_string(),
        }
    }

    /// Set every message's `normalized_subject`, then group them.
    ///
    /// Messages with the same normalized subject (case-insensitive) always
    /// share a group. Each bucket, in first-seen order, then absorbs every
    /// later bucket whose key is similar enough to its own key. Absorption is
    /// not transitive, so the result depends on input order.
    ///
    /// Groups come out largest first; ties go to the group with the earliest
    /// parseable member date, and groups without any parseable date come last.
    pub fn cluster(&self, messages: &mut [ExtractedMessage]) -> Vec<Group> {
        for message in messages.iter_mut() {
            message.normalized_subject = Some(subject::normalize(&message.subject));
        }

        // Exact buckets, keyed by lowercased normalized subject.
        let mut keys: Vec<String> = Vec::new();
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, message) in messages.iter().enumerate() {
            let key = message
                .normalized_subject
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                keys.push(key);
                buckets.push(Vec::new());
                buckets.len() - 1
            });
            buckets[slot].push(i);
        }

        // Fuzzy merge against each seed's own key.
        let mut consumed = vec![false; buckets.len()];
        let mut merged: Vec<Vec<usize>> = Vec::new();
        for i in 0..buckets.len() {
            if consumed[i] {
                continue;
            }
            consumed[i] = true;
            let mut members = buckets[i].clone();
            for j in i + 1..buckets.len() {
                if !consumed[j] && similarity::ratio(&keys[i], &keys[j]) >= self.threshold {
                    members.extend_from_slice(&buckets[j]);
                    consumed[j] = true;
                }
            }
            merged.push(members);
        }

        merged.sort_by_cached_key(|members| {
            let earliest = members
                .iter()
                .filter_map(|&i| self.sent_instant(&messages[i]))
                .min();
            (std::cmp::Reverse(members.len()), earliest.is_none(), earliest)
        });

        let groups: Vec<Group> = merged
            .into_iter()
            .map(|members| build_group(messages, &members))
            .collect();

        debug!(
            messages = messages.len(),
            groups = groups.len(),
            threshold = self.threshold,
            "Clustered messages"
        );
        groups
    }

    /// The instant a message was sent. Records without a parsed `sent_at`
    /// fall back to their display date, read as UTC.
    fn sent_instant(&self, message: &ExtractedMessage) -> Option<DateTime<Utc>> {
        match message.sent_at {
            Some(sent_at) => Some(sent_at.with_timezone(&Utc)),
            None => NaiveDateTime::parse_from_str(&message.date, &self.date_format)
                .ok()
                .map(|naive| naive.and_utc()),
        }
    }
}

/// Label with the longest normalized subject (first one on ties).
fn build_group(messages: &[ExtractedMessage], members: &[usize]) -> Group {
    let mut label = "";
    for &i in members {
        let normalized = messages[i].normalized_subject.as_deref().unwrap_or_default();
        if normalized.chars().count() > label.chars().count() {
            label = normalized;
        }
    }
    Group {
        id: short_hash("group_", label, GROUP_ID_HEX_LEN),
        label: label.to_string(),
        member_ids: members.iter().map(|&i| messages[i].id.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn message(id: &str, subject: &str, date: &str) -> ExtractedMessage {
        ExtractedMessage {
            id: id.to_string(),
            origin_envelope_id: String::new(),
            subject: subject.to_string(),
            sender: "mittente@pec.it".to_string(),
            recipients: Vec::new(),
            date: date.to_string(),
            sent_at: None,
            body_text: Some("corpo".to_string()),
            body_html: None,
            attachments: Vec::new(),
            cert_provider: None,
            cert_type: None,
            cert_date: None,
            normalized_subject: None,
            archive_name: "test.mbox".to_string(),
        }
    }

    fn ids(group: &Group) -> Vec<&str> {
        group.member_ids.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_partition_is_exact() {
        let mut messages = vec![
            message("e1", "POSTA CERTIFICATA: Richiesta documenti", "01/02/2024 10:00"),
            message("e2", "Verbale assemblea", "02/02/2024 10:00"),
            message("e3", "Re: richiesta documenti", "03/02/2024 10:00"),
            message("e4", "Richiesta documento", "04/02/2024 10:00"),
            message("e5", "Fattura n. 12", "05/02/2024 10:00"),
            message("e6", "", "06/02/2024 10:00"),
        ];
        let groups = Clusterer::default().cluster(&mut messages);

        let mut seen = HashSet::new();
        for group in &groups {
            for id in &group.member_ids {
                assert!(seen.insert(id.clone()), "{id} appears twice");
            }
        }
        let all: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(seen, all);

        assert!(messages.iter().all(|m| m.normalized_subject.is_some()));
        assert_eq!(ids(&groups[0]), ["e1", "e3", "e4"]);
        assert_eq!(groups[0].label, "Richiesta documenti");
    }

    #[test]
    fn test_merge_is_not_transitive() {
        let a = "xxrbale riunione marzo";
        let b = "verbale riunione marzo";
        let c = "verbale riunione maryy";
        assert!(similarity::ratio(a, b) >= 0.85);
        assert!(similarity::ratio(b, c) >= 0.85);
        assert!(similarity::ratio(a, c) < 0.85);

        let clusterer = Clusterer::default();

        let mut seeded_by_a = vec![message("a", a, ""), message("b", b, ""), message("c", c, "")];
        let groups = clusterer.cluster(&mut seeded_by_a);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), ["a", "b"]);
        assert_eq!(ids(&groups[1]), ["c"]);

        let mut seeded_by_b = vec![message("b", b, ""), message("a", a, ""), message("c", c, "")];
        let groups = clusterer.cluster(&mut seeded_by_b);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), ["b", "a", "c"]);
    }

    #[test]
    fn test_ordering_by_size_then_date() {
        let mut messages = vec![
            message("late", "Singolo tardivo", "10/03/2024 09:00"),
            message("nodate", "Senza data", "ieri"),
            message("early", "Singolo anticipato", "01/03/2024 09:00"),
            message("p1", "Coppia", "15/03/2024 09:00"),
            message("p2", "R: Coppia", "16/03/2024 09:00"),
        ];
        let groups = Clusterer::default().cluster(&mut messages);
        let order: Vec<&str> = groups.iter().map(|g| g.member_ids[0].as_str()).collect();
        assert_eq!(order, ["p1", "early", "late", "nodate"]);
    }

    #[test]
    fn test_ties_compare_instants_across_offsets() {
        // 10:00 in Rome is 09:00 UTC, earlier than 09:30 in London.
        let sent = |raw: &str| DateTime::parse_from_rfc2822(raw).ok();
        let mut rome = message("rome", "Avviso Roma", "12/03/2024 10:00");
        rome.sent_at = sent("Tue, 12 Mar 2024 10:00:00 +0100");
        let mut london = message("london", "Notifica Londra", "12/03/2024 09:30");
        london.sent_at = sent("Tue, 12 Mar 2024 09:30:00 +0000");

        let mut messages = vec![london, rome];
        let groups = Clusterer::default().cluster(&mut messages);
        let order: Vec<&str> = groups.iter().map(|g| g.member_ids[0].as_str()).collect();
        assert_eq!(order, ["rome", "london"]);
    }

    #[test]
    fn test_group_id_derives_from_label() {
        let mut first = vec![message("x", "Re: Avviso di pagamento", "")];
        let mut second = vec![message("y", "Avviso di pagamento", "")];
        let g1 = Clusterer::default().cluster(&mut first);
        let g2 = Clusterer::default().cluster(&mut second);
        assert_eq!(g1[0].id, g2[0].id);
        assert!(g1[0].id.starts_with("group_"));
        assert_eq!(g1[0].id.len(), "group_".len() + 8);
    }

    #[test]
    fn test_empty_input() {
        assert!(Clusterer::default().cluster(&mut []).is_empty());
    }
}
