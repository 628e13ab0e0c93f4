//! Streaming MBOX splitter.
//!
//! Reads the archive line-by-line with a 1 MB buffer and hands every envelope
//! to a callback. Tolerant of mixed line endings, missing blank lines before
//! separators, and truncated final messages.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CatalogError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Streaming MBOX parser.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX (that happens on the first line of `parse`).
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CatalogError::FileNotFound(path.clone())
            } else {
                CatalogError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Override the per-message size cap. Bytes past the cap are dropped.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Basename of the archive, used as the source's `archive_name`.
    pub fn archive_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Split the archive, calling `message_callback` with each envelope's raw
    /// bytes (separator line included). Returning `false` stops early.
    ///
    /// Returns the number of messages delivered. A non-empty file whose first
    /// non-blank line is not a `From ` separator is rejected as
    /// [`CatalogError::InvalidArchive`].
    pub fn parse(&self, message_callback: &mut dyn FnMut(&[u8]) -> bool) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start: u64 = 0;
        let mut prev_line_was_empty = true;
        let mut seen_separator = false;
        let mut truncated = false;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| CatalogError::io(&self.path, e))?;
            if line_len == 0 {
                break; // EOF
            }

            let is_from_line = is_mbox_separator(&line_buf);

            if !seen_separator {
                if is_blank_line(&line_buf) {
                    current_offset += line_len as u64;
                    continue;
                }
                if !is_from_line {
                    return Err(CatalogError::InvalidArchive(self.path.clone()));
                }
            }

            if is_from_line {
                if seen_separator && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !message_buf.is_empty() {
                    if !message_callback(&message_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                seen_separator = true;
                truncated = false;
                message_start = current_offset;
                message_buf.clear();
                message_buf.extend_from_slice(&line_buf);
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            current_offset += line_len as u64;
        }

        if !message_buf.is_empty() && message_callback(&message_buf) {
            count += 1;
        }

        Ok(count)
    }

    /// Collect every envelope of the archive in order.
    pub fn messages(&self) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        self.parse(&mut |raw| {
            out.push(raw.to_vec());
            true
        })?;
        Ok(out)
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
