//! Core data model: extracted messages, attachments, groups, sources and the catalog.

pub mod address;
pub mod attachment;
pub mod catalog;
pub mod message;
