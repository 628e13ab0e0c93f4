//! Envelope parsing: MBOX splitting, MIME tree, headers and certification metadata.

pub mod daticert;
pub mod header;
pub mod mbox;
pub mod mime;
