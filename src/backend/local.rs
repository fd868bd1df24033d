/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use super::{About, Backend, BackendError, BackendResult, DirEntry, Entry, FileEntry};
use crate::path::ObjectPath;

/// Object store backed by a local directory tree.
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(name: &str, root: &Path) -> Self {
        Self {
            name: name.to_owned(),
            root: root.to_path_buf(),
        }
    }

    fn resolve(&self, remote: &ObjectPath) -> PathBuf {
        if remote.is_root() {
            self.root.clone()
        } else {
            self.root.join(remote.as_str())
        }
    }

}

impl Display for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Backend for LocalBackend {
    fn list(&self, dir: &ObjectPath) -> BackendResult<Vec<Entry>> {
        let local = self.resolve(dir);
        match fs::metadata(&local) {
            Ok(meta) if meta.is_file() => return Err(BackendError::IsFile(dir.clone())),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::DirectoryNotFound(dir.clone()));
            }
            Err(err) => return Err(BackendError::io(dir, &err)),
        }

        let mut entries = Vec::new();
        let read = fs::read_dir(&local).map_err(|err| BackendError::io(dir, &err))?;
        for item in read {
            let item = item.map_err(|err| BackendError::io(dir, &err))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let path = dir.join(&name);
            let meta = item.metadata().map_err(|err| BackendError::io(&path, &err))?;
            if meta.is_dir() {
                entries.push(Entry::Dir(DirEntry { path }));
            } else {
                entries.push(Entry::File(FileEntry {
                    path,
                    size: meta.len(),
                    mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                }));
            }
        }
        Ok(entries)
    }

    fn open(&self, remote: &ObjectPath, range: Option<(u64, u64)>) -> BackendResult<Vec<u8>> {
        let local = self.resolve(remote);
        let data = match fs::read(&local) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::ObjectNotFound(remote.clone()));
            }
            Err(err) => {
                if local.is_dir() {
                    return Err(BackendError::IsDirectory(remote.clone()));
                }
                return Err(BackendError::io(remote, &err));
            }
        };
        match range {
            None => Ok(data),
            Some((start, end)) => {
                let start = (start as usize).min(data.len());
                let end = ((end + 1) as usize).min(data.len());
                Ok(data[start..end.max(start)].to_vec())
            }
        }
    }

    fn size(&self, remote: &ObjectPath) -> BackendResult<u64> {
        let local = self.resolve(remote);
        match fs::metadata(&local) {
            Ok(meta) if meta.is_dir() => Err(BackendError::IsDirectory(remote.clone())),
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BackendError::ObjectNotFound(remote.clone()))
            }
            Err(err) => Err(BackendError::io(remote, &err)),
        }
    }

    fn mod_time(&self, remote: &ObjectPath) -> BackendResult<SystemTime> {
        let local = self.resolve(remote);
        match fs::metadata(&local) {
            Ok(meta) => meta.modified().map_err(|err| BackendError::io(remote, &err)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BackendError::ObjectNotFound(remote.clone()))
            }
            Err(err) => Err(BackendError::io(remote, &err)),
        }
    }

    fn set_mod_time(&self, remote: &ObjectPath, mtime: SystemTime) -> BackendResult<()> {
        let local = self.resolve(remote);
        let file = match File::options().write(true).open(&local) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::ObjectNotFound(remote.clone()));
            }
            Err(err) => return Err(BackendError::io(remote, &err)),
        };
        file.set_modified(mtime)
            .map_err(|err| BackendError::io(remote, &err))
    }

    fn put(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> BackendResult<()> {
        let local = self.resolve(remote);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|err| BackendError::io(remote, &err))?;
        }
        fs::write(&local, data).map_err(|err| BackendError::io(remote, &err))?;
        self.set_mod_time(remote, mtime)
    }

    fn update(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> BackendResult<()> {
        let local = self.resolve(remote);
        if !local.is_file() {
            return Err(BackendError::ObjectNotFound(remote.clone()));
        }
        fs::write(&local, data).map_err(|err| BackendError::io(remote, &err))?;
        self.set_mod_time(remote, mtime)
    }

    fn remove(&self, remote: &ObjectPath) -> BackendResult<()> {
        let local = self.resolve(remote);
        match fs::remove_file(&local) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BackendError::ObjectNotFound(remote.clone()))
            }
            Err(err) => Err(BackendError::io(remote, &err)),
        }
    }

    fn mkdir(&self, dir: &ObjectPath) -> BackendResult<()> {
        let local = self.resolve(dir);
        if local.is_file() {
            return Err(BackendError::IsFile(dir.clone()));
        }
        if local.is_dir() {
            return Err(BackendError::DirectoryExists(dir.clone()));
        }
        fs::create_dir_all(&local).map_err(|err| BackendError::io(dir, &err))
    }

    fn rmdir(&self, dir: &ObjectPath) -> BackendResult<()> {
        let local = self.resolve(dir);
        match fs::metadata(&local) {
            Ok(meta) if meta.is_file() => return Err(BackendError::IsFile(dir.clone())),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::DirectoryNotFound(dir.clone()));
            }
            Err(err) => return Err(BackendError::io(dir, &err)),
        }
        let mut children = fs::read_dir(&local).map_err(|err| BackendError::io(dir, &err))?;
        if children.next().is_some() {
            return Err(BackendError::DirectoryNotEmpty(dir.clone()));
        }
        fs::remove_dir(&local).map_err(|err| BackendError::io(dir, &err))
    }

    fn move_object(&self, src: &ObjectPath, dst: &ObjectPath) -> BackendResult<()> {
        let from = self.resolve(src);
        let to = self.resolve(dst);
        if !from.is_file() {
            return Err(BackendError::ObjectNotFound(src.clone()));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| BackendError::io(dst, &err))?;
        }
        fs::rename(&from, &to).map_err(|err| BackendError::io(src, &err))
    }

    fn dir_move(&self, src: &ObjectPath, dst: &ObjectPath) -> BackendResult<()> {
        let from = self.resolve(src);
        let to = self.resolve(dst);
        if !from.is_dir() {
            return Err(BackendError::DirectoryNotFound(src.clone()));
        }
        if to.exists() {
            return Err(BackendError::DirectoryExists(dst.clone()));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| BackendError::io(dst, &err))?;
        }
        fs::rename(&from, &to).map_err(|err| BackendError::io(src, &err))
    }

    fn about(&self) -> Option<BackendResult<About>> {
        let mut used = 0u64;
        let mut objects = 0u64;
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    return Some(Err(BackendError::Io {
                        path: ObjectPath::root(),
                        message: err.to_string(),
                    }));
                }
            };
            if entry.file_type().is_file() {
                objects += 1;
                used += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Some(Ok(About {
            used: Some(used),
            objects: Some(objects),
            ..About::default()
        }))
    }

    fn walk(&self, dir: &ObjectPath) -> BackendResult<Vec<FileEntry>> {
        let local = self.resolve(dir);
        if !local.is_dir() {
            return Err(BackendError::DirectoryNotFound(dir.clone()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&local).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
            let entry = entry.map_err(|err| BackendError::Io {
                path: dir.clone(),
                message: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&local)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let meta = entry.metadata().map_err(|err| BackendError::Io {
                path: dir.clone(),
                message: err.to_string(),
            })?;
            files.push(FileEntry {
                path: dir.join(&rel),
                size: meta.len(),
                mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(files)
    }
}
