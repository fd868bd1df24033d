/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

pub mod local;

use std::fmt::Display;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

use crate::layout::Role;
use crate::path::ObjectPath;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("object '{0}' not found")]
    ObjectNotFound(ObjectPath),
    #[error("directory '{0}' not found")]
    DirectoryNotFound(ObjectPath),
    #[error("directory '{0}' already exists")]
    DirectoryExists(ObjectPath),
    #[error("directory '{0}' is not empty")]
    DirectoryNotEmpty(ObjectPath),
    #[error("'{0}' is a directory")]
    IsDirectory(ObjectPath),
    #[error("'{0}' is a file")]
    IsFile(ObjectPath),
    #[error("backend does not support moving objects")]
    CantMove,
    #[error("backend does not support moving directories")]
    CantDirMove,
    #[error("i/o failure at '{path}': {message}")]
    Io { path: ObjectPath, message: String },
}

impl BackendError {
    pub fn io(path: &ObjectPath, err: &std::io::Error) -> Self {
        BackendError::Io {
            path: path.clone(),
            message: err.to_string(),
        }
    }

    /// Transient failures are worth a low-level retry; everything else
    /// is a definite answer from the backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Io { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A single listing entry.
#[derive(Clone, Debug)]
pub enum Entry {
    File(FileEntry),
    Dir(DirEntry),
}

#[derive(Clone, Debug)]
pub struct FileEntry {
    pub path: ObjectPath,
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Clone, Debug)]
pub struct DirEntry {
    pub path: ObjectPath,
}

/// Usage figures of one underlying store. A `None` field means the
/// store cannot report it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct About {
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub trashed: Option<u64>,
    pub other: Option<u64>,
    pub free: Option<u64>,
    pub objects: Option<u64>,
}

/// Capability set every underlying object store must provide.
///
/// Byte payloads are materialised in memory; there is no streaming
/// surface on this seam.
pub trait Backend: Send + Sync + Display {
    /// Single-level listing of `dir`.
    fn list(&self, dir: &ObjectPath) -> BackendResult<Vec<Entry>>;

    /// Reads the whole object, or the inclusive byte range `[start, end]`.
    fn open(&self, remote: &ObjectPath, range: Option<(u64, u64)>) -> BackendResult<Vec<u8>>;

    fn size(&self, remote: &ObjectPath) -> BackendResult<u64>;

    fn mod_time(&self, remote: &ObjectPath) -> BackendResult<SystemTime>;

    fn set_mod_time(&self, remote: &ObjectPath, mtime: SystemTime) -> BackendResult<()>;

    /// Creates a new object. Parent directories are created as needed.
    fn put(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> BackendResult<()>;

    /// Rewrites an existing object.
    fn update(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> BackendResult<()>;

    fn remove(&self, remote: &ObjectPath) -> BackendResult<()>;

    fn mkdir(&self, dir: &ObjectPath) -> BackendResult<()>;

    fn rmdir(&self, dir: &ObjectPath) -> BackendResult<()>;

    /// Server-side move, where the store supports one.
    fn move_object(&self, _src: &ObjectPath, _dst: &ObjectPath) -> BackendResult<()> {
        Err(BackendError::CantMove)
    }

    /// Server-side directory move, where the store supports one.
    fn dir_move(&self, _src: &ObjectPath, _dst: &ObjectPath) -> BackendResult<()> {
        Err(BackendError::CantDirMove)
    }

    /// Usage report, `None` when the store has no usage surface.
    fn about(&self) -> Option<BackendResult<About>> {
        None
    }

    /// Recursive enumeration of all file entries under `dir`.
    fn walk(&self, dir: &ObjectPath) -> BackendResult<Vec<FileEntry>> {
        let mut files = Vec::new();
        let mut stack = vec![dir.clone()];
        while let Some(current) = stack.pop() {
            for entry in self.list(&current)? {
                match entry {
                    Entry::File(file) => files.push(file),
                    Entry::Dir(sub) => stack.push(sub.path),
                }
            }
        }
        Ok(files)
    }

    fn exists(&self, remote: &ObjectPath) -> BackendResult<bool> {
        match self.size(remote) {
            Ok(_) => Ok(true),
            Err(BackendError::ObjectNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// The three stores of one striped filesystem, addressed by role.
#[derive(Clone)]
pub struct BackendSet {
    pub even: Arc<dyn Backend>,
    pub odd: Arc<dyn Backend>,
    pub parity: Arc<dyn Backend>,
}

impl BackendSet {
    pub fn new(even: Arc<dyn Backend>, odd: Arc<dyn Backend>, parity: Arc<dyn Backend>) -> Self {
        Self { even, odd, parity }
    }

    pub fn get(&self, role: Role) -> &Arc<dyn Backend> {
        match role {
            Role::Even => &self.even,
            Role::Odd => &self.odd,
            Role::Parity => &self.parity,
        }
    }
}
