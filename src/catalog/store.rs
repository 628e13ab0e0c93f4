//! Catalog persistence.
//!
//! The [`CatalogStore`] trait is everything [`CatalogManager`](super::CatalogManager)
//! needs from storage. [`JsonStore`] keeps it all as plain files:
//!
//! ```text
//! <data_dir>/
//! ├── catalog.json
//! ├── emails/<message id>.json
//! ├── attachments/<message id>/<filename>
//! └── uploads/<archive name>
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::extract::identity::short_hash;
use crate::model::attachment::AttachmentPayload;
use crate::model::catalog::Catalog;
use crate::model::message::ExtractedMessage;

const CATALOG_FILE: &str = "catalog.json";
const EMAILS_DIR: &str = "emails";
const ATTACHMENTS_DIR: &str = "attachments";
const UPLOADS_DIR: &str = "uploads";

const SOURCE_ID_HEX_LEN: usize = 12;

/// Storage backend for the catalog, message records and attachment bytes.
pub trait CatalogStore {
    /// The persisted catalog, or `None` when nothing has been ingested yet.
    fn load_catalog(&self) -> Result<Option<Catalog>>;

    /// Persist `catalog` and write one record per distinct id in `new_messages`.
    fn save_catalog(&mut self, catalog: &Catalog, new_messages: &[ExtractedMessage]) -> Result<()>;

    fn load_message(&self, id: &str) -> Result<Option<ExtractedMessage>>;

    /// Remove a message record and its attachment bytes. Missing data is not an error.
    fn delete_message_and_attachments(&mut self, id: &str) -> Result<()>;

    /// A fresh source id. Two calls never return the same value.
    fn generate_source_id(&self, archive_name: &str) -> String;

    /// Store the decoded attachment bytes of message `id`, replacing any
    /// bytes already stored for it.
    fn store_attachments(&mut self, id: &str, payloads: &[AttachmentPayload]) -> Result<()>;

    /// Copy an archive into the staging area. Returns the staged path.
    fn stage_upload(&mut self, archive: &Path) -> Result<PathBuf>;

    /// Remove the staged copy of `archive_name`, if any.
    fn remove_upload(&mut self, archive_name: &str) -> Result<()>;

    /// Drop everything: catalog, records, attachments and staged uploads.
    fn clear(&mut self) -> Result<()>;
}

/// File-backed [`CatalogStore`] rooted at a data directory.
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    counter: AtomicU64,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
            counter: AtomicU64::new(0),
        };
        store.ensure_layout()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a stored attachment, if it exists and stays inside the
    /// message's attachment directory.
    pub fn attachment_path(&self, id: &str, filename: &str) -> Option<PathBuf> {
        if !is_safe_component(id) || !is_safe_component(filename) {
            return None;
        }
        let path = self.attachments_dir(id).join(filename);
        path.is_file().then_some(path)
    }

    fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.root.join(EMAILS_DIR),
            self.root.join(ATTACHMENTS_DIR),
            self.root.join(UPLOADS_DIR),
        ] {
            fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;
        }
        Ok(())
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    fn message_path(&self, id: &str) -> PathBuf {
        self.root.join(EMAILS_DIR).join(format!("{id}.json"))
    }

    fn attachments_dir(&self, id: &str) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR).join(id)
    }

    fn upload_path(&self, archive_name: &str) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(archive_name)
    }
}

impl CatalogStore for JsonStore {
    fn load_catalog(&self) -> Result<Option<Catalog>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn save_catalog(&mut self, catalog: &Catalog, new_messages: &[ExtractedMessage]) -> Result<()> {
        self.ensure_layout()?;

        let mut written = HashSet::new();
        for message in new_messages {
            if written.insert(message.id.as_str()) {
                write_json(&self.message_path(&message.id), message)?;
            }
        }

        write_json(&self.catalog_path(), catalog)?;
        debug!(
            sources = catalog.total_sources,
            messages = written.len(),
            "Saved catalog"
        );
        Ok(())
    }

    fn load_message(&self, id: &str) -> Result<Option<ExtractedMessage>> {
        if !is_safe_component(id) {
            return Ok(None);
        }
        let path = self.message_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn delete_message_and_attachments(&mut self, id: &str) -> Result<()> {
        if !is_safe_component(id) {
            return Ok(());
        }
        let record = self.message_path(id);
        if record.exists() {
            fs::remove_file(&record).map_err(|e| CatalogError::io(&record, e))?;
        }
        let dir = self.attachments_dir(id);
        if dir.is_dir() {
            fs::remove_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;
        }
        Ok(())
    }

    fn generate_source_id(&self, archive_name: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let now = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, false);
        short_hash("src_", &format!("{archive_name}{now}#{n}"), SOURCE_ID_HEX_LEN)
    }

    fn store_attachments(&mut self, id: &str, payloads: &[AttachmentPayload]) -> Result<()> {
        if payloads.is_empty() || !is_safe_component(id) {
            return Ok(());
        }
        let dir = self.attachments_dir(id);
        if dir.is_dir() {
            fs::remove_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

        for payload in payloads {
            if !is_safe_component(&payload.filename) {
                warn!(id, filename = %payload.filename, "Skipping attachment with unsafe name");
                continue;
            }
            let path = dir.join(&payload.filename);
            fs::write(&path, &payload.data).map_err(|e| CatalogError::io(&path, e))?;
        }
        Ok(())
    }

    fn stage_upload(&mut self, archive: &Path) -> Result<PathBuf> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_safe_component(&name) {
            return Err(CatalogError::InvalidUpload {
                name,
                reason: "not a plain file name".to_string(),
            });
        }
        let target = self.upload_path(&name);
        if archive != target {
            fs::copy(archive, &target).map_err(|e| CatalogError::io(archive, e))?;
        }
        Ok(target)
    }

    fn remove_upload(&mut self, archive_name: &str) -> Result<()> {
        if !is_safe_component(archive_name) {
            return Ok(());
        }
        let path = self.upload_path(archive_name);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| CatalogError::io(&path, e))?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let catalog = self.catalog_path();
        if catalog.exists() {
            fs::remove_file(&catalog).map_err(|e| CatalogError::io(&catalog, e))?;
        }
        // Anything else under the root (e.g. logs) is left alone.
        for sub in [EMAILS_DIR, ATTACHMENTS_DIR, UPLOADS_DIR] {
            let dir = self.root.join(sub);
            if dir.is_dir() {
                fs::remove_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;
            }
        }
        self.ensure_layout()
    }
}

/// A single path component with no traversal.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| CatalogError::json(path, e))
}

/// Written to a sibling temp file, then renamed into place.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CatalogError::json(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| CatalogError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CatalogError::io(path, e))
}
