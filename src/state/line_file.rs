//! Line-oriented state files
//!
//! Every state file is plain UTF-8 with one record per line. Appends go
//! straight to the end of the file; full rewrites go through a temporary file
//! in the same directory that is renamed over the target, so a crash never
//! leaves a half-written file behind.

use crate::error::PersistenceError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A state file holding one record per line
#[derive(Debug, Clone)]
pub(crate) struct LineFile {
    path: PathBuf,
}

impl LineFile {
    /// Open `path`, creating an empty file if it does not exist yet
    pub(crate) fn open(path: PathBuf) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blank lines, trimmed, in file order
    pub(crate) fn read_lines(&self) -> Result<Vec<String>, PersistenceError> {
        let content = fs::read_to_string(&self.path).map_err(|source| PersistenceError::Read {
            path: self.path.clone(),
            source,
        })?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Append one record
    pub(crate) fn append(&self, line: &str) -> Result<(), PersistenceError> {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{}", line).map_err(write_err)?;
        file.flush().map_err(write_err)
    }

    /// Replace the whole file with `lines`
    pub(crate) fn rewrite<I, S>(&self, lines: I) -> Result<(), PersistenceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        for line in lines {
            writeln!(tmp, "{}", line.as_ref()).map_err(write_err)?;
        }
        tmp.flush().map_err(write_err)?;
        tmp.as_file_mut().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
