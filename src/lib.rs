//! `pec-catalog`: recovers the original messages carried by Italian certified
//! email (PEC) envelopes and keeps a cumulative, subject-grouped catalog of
//! them across any number of MBOX archives.
//!
//! The pipeline for one archive is
//! [`MboxParser`](parser::mbox::MboxParser) →
//! [`MessageExtractor`](extract::MessageExtractor) →
//! [`Clusterer`](group::Clusterer) →
//! [`CatalogManager`](catalog::CatalogManager), which persists the result
//! through a [`CatalogStore`](catalog::CatalogStore).

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod group;
pub mod model;
pub mod parser;
pub mod search;
