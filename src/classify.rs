//! Storage routing: where an item's artifacts land on disk
//!
//! Decision per item:
//!
//! - No attachments: one text file `txt/<ts>-<body or id>.txt`.
//! - Attachments and a body: a folder `<ts>-<body>` holding `info.txt` and
//!   the attachments `1.<ext>`, `2.<ext>`, ...
//! - Attachments but no body: the same folder layout under `null/<id>`.
//!
//! Planning is pure; [`prepare_folder`] and [`write_text`] do the disk work.

use crate::config::ClockZone;
use crate::error::PersistenceError;
use crate::types::Item;
use crate::utils::{format_display_timestamp, sanitize_filename};
use std::path::{Path, PathBuf};

/// Subdirectory of the content area holding text-only items
pub const TEXT_AREA: &str = "txt";
/// Subdirectory holding folders of items without a body
pub const NULL_AREA: &str = "null";
/// Name of the metadata file inside an item folder
pub const INFO_FILE: &str = "info.txt";

/// Where one attachment is written
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentTarget {
    /// Source URL
    pub source_url: String,
    /// Destination file
    pub path: PathBuf,
}

/// Storage shape chosen for an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoragePlan {
    /// A single text artifact in the text area
    TextFile {
        /// Destination file
        path: PathBuf,
        /// Full file content
        content: String,
    },
    /// A folder with an info artifact and the attachments
    Folder {
        /// Item folder
        dir: PathBuf,
        /// Content of `info.txt`
        info: String,
        /// Attachments in source order
        attachments: Vec<AttachmentTarget>,
    },
}

impl StoragePlan {
    /// Path of the text artifact (the text file or the folder's `info.txt`)
    pub fn record_path(&self) -> PathBuf {
        match self {
            StoragePlan::TextFile { path, .. } => path.clone(),
            StoragePlan::Folder { dir, .. } => dir.join(INFO_FILE),
        }
    }
}

/// Decides the storage shape of items under one content area
#[derive(Clone, Debug)]
pub struct ItemClassifier {
    root: PathBuf,
    clock: ClockZone,
    max_name_length: usize,
}

impl ItemClassifier {
    /// Classifier writing below `root`
    pub fn new(root: impl Into<PathBuf>, clock: ClockZone, max_name_length: usize) -> Self {
        Self {
            root: root.into(),
            clock,
            max_name_length,
        }
    }

    /// Content area root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plan where `item` is stored
    pub fn plan(&self, item: &Item) -> StoragePlan {
        let formatted = format_display_timestamp(&item.published_at, self.clock);
        let content = render_record(item, &formatted);
        let body_name = if item.has_body() {
            Some(sanitize_filename(&item.body, self.max_name_length)).filter(|s| !s.is_empty())
        } else {
            None
        };

        if !item.has_attachments() {
            let stem = body_name.as_deref().unwrap_or(&item.id);
            return StoragePlan::TextFile {
                path: self
                    .root
                    .join(TEXT_AREA)
                    .join(format!("{}-{}.txt", formatted, stem)),
                content,
            };
        }

        let dir = match body_name {
            Some(name) => {
                let folder = format!("{}-{}", formatted, name).replace(' ', "-");
                self.root
                    .join(sanitize_filename(&folder, self.max_name_length))
            }
            None => self.root.join(NULL_AREA).join(&item.id),
        };

        let attachments = item
            .attachments
            .iter()
            .map(|a| AttachmentTarget {
                source_url: a.source_url.clone(),
                path: dir.join(a.file_name()),
            })
            .collect();

        StoragePlan::Folder {
            dir,
            info: content,
            attachments,
        }
    }
}

/// Text of a text artifact: canonical URL, formatted time, then the body
pub fn render_record(item: &Item, formatted_time: &str) -> String {
    format!(
        "URL: {}\nPublished: {}\nContent:\n{}",
        item.canonical_url, formatted_time, item.body
    )
}

/// Make `dir` usable as an item folder
///
/// A regular file occupying the name is removed first; an existing
/// directory is reused as is.
pub async fn prepare_folder(dir: &Path) -> Result<(), PersistenceError> {
    match tokio::fs::symlink_metadata(dir).await {
        Ok(meta) if meta.is_dir() => {
            tracing::debug!(dir = %dir.display(), "Reusing existing item folder");
            return Ok(());
        }
        Ok(_) => {
            tracing::debug!(dir = %dir.display(), "Removing file that blocks item folder");
            tokio::fs::remove_file(dir)
                .await
                .map_err(|source| PersistenceError::Remove {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        Err(_) => {}
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| PersistenceError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

/// Canonical URL recorded in the `info.txt` of an existing item folder
///
/// `None` if the folder has no readable info file or its first line is not a
/// `URL:` record.
pub async fn recorded_url(dir: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(dir.join(INFO_FILE)).await.ok()?;
    content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("URL: "))
        .map(|url| url.trim().to_string())
}

/// Write a text artifact, creating its parent directory if needed
pub async fn write_text(path: &Path, content: &str) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })
}
