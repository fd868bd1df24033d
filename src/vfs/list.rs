/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::BTreeMap;

use log::{debug, info, warn};

use super::{TripleFs, VfsError, VfsResult};
use crate::backend::{BackendError, DirEntry, Entry, FileEntry};
use crate::codec::{size_from_even_and_parity, size_from_odd_and_parity};
use crate::layout::{strip_parity_suffix, transient_name_patterns, Role, ROLES};
use crate::path::ObjectPath;

#[derive(Default)]
struct MergedFile {
    even: Option<FileEntry>,
    odd: Option<FileEntry>,
    parity: Option<(FileEntry, bool)>,
}

impl MergedFile {
    fn present_count(&self) -> usize {
        usize::from(self.even.is_some())
            + usize::from(self.odd.is_some())
            + usize::from(self.parity.is_some())
    }

    fn logical_size(&self) -> Option<u64> {
        match (&self.even, &self.odd, &self.parity) {
            (Some(even), Some(odd), _) => Some(even.size + odd.size),
            (Some(even), None, Some((parity, odd_length))) => Some(size_from_even_and_parity(
                even.size,
                parity.size,
                *odd_length,
            )),
            (None, Some(odd), Some((parity, _))) => {
                Some(size_from_odd_and_parity(odd.size, parity.size))
            }
            (Some(even), None, None) => Some(even.size * 2),
            (None, Some(odd), None) => Some(odd.size * 2),
            _ => None,
        }
    }

    fn mtime(&self) -> Option<std::time::SystemTime> {
        self.even
            .as_ref()
            .map(|e| e.mtime)
            .or_else(|| self.odd.as_ref().map(|o| o.mtime))
            .or_else(|| self.parity.as_ref().map(|(p, _)| p.mtime))
    }
}

impl TripleFs {
    /// Merged single-level listing of `dir` across the three backends.
    ///
    /// Parity-suffixed names are presence hints and never surface.
    /// With auto-cleanup, broken objects are hidden and orphaned
    /// directories removed; with auto-heal, directories missing on one
    /// backend are reconstructed.
    pub fn list(&self, dir: &ObjectPath) -> VfsResult<Vec<Entry>> {
        let transient = transient_name_patterns();
        let results = self.on_all(|role| {
            self.retrier()
                .run("list", || self.backends().get(role).list(dir))
        });

        let mut listings: [Option<Vec<Entry>>; 3] = [None, None, None];
        let mut missing = [false; 3];
        let mut hard_error: Option<BackendError> = None;
        for (role, result) in results {
            let slot = ROLES.iter().position(|r| *r == role).unwrap();
            match result {
                Ok(entries) => listings[slot] = Some(entries),
                Err(BackendError::DirectoryNotFound(_)) => missing[slot] = true,
                Err(err) => {
                    warn!("listing '{}' failed on {} backend: {}", dir, role, err);
                    if hard_error.is_none() {
                        hard_error = Some(err);
                    }
                }
            }
        }

        if listings.iter().all(|l| l.is_none()) {
            return match hard_error {
                Some(err) => Err(VfsError::Backend(err)),
                None => Err(VfsError::Backend(BackendError::DirectoryNotFound(
                    dir.clone(),
                ))),
            };
        }

        // a parity directory left behind after both data directories are
        // gone carries no readable objects; clear it out
        if missing[0] && missing[1] {
            if let Some(parity_entries) = &listings[2] {
                let has_files = parity_entries.iter().any(|e| matches!(e, Entry::File(_)));
                if !has_files {
                    info!("removing data-less parity directory '{}'", dir);
                    if let Err(err) = self.backends().parity.rmdir(dir) {
                        warn!("failed to remove parity directory '{}': {}", dir, err);
                    }
                    return Ok(Vec::new());
                }
            }
        }

        let mut files: BTreeMap<ObjectPath, MergedFile> = BTreeMap::new();
        let mut dirs: BTreeMap<ObjectPath, [bool; 3]> = BTreeMap::new();
        let mut passthrough: Vec<FileEntry> = Vec::new();
        for (slot, role) in ROLES.iter().enumerate() {
            let Some(entries) = &listings[slot] else {
                continue;
            };
            for entry in entries {
                match entry {
                    Entry::Dir(sub) => {
                        dirs.entry(sub.path.clone()).or_default()[slot] = true;
                    }
                    Entry::File(file) => {
                        if transient.is_match(file.path.name()) {
                            debug!("suppressing transient name '{}'", file.path);
                            continue;
                        }
                        match role {
                            Role::Even => {
                                files.entry(file.path.clone()).or_default().even =
                                    Some(file.clone());
                            }
                            Role::Odd => {
                                files.entry(file.path.clone()).or_default().odd =
                                    Some(file.clone());
                            }
                            Role::Parity => {
                                let (base, is_parity, odd_length) =
                                    strip_parity_suffix(file.path.name());
                                if !is_parity {
                                    // not a parity particle: a foreign file
                                    // passes through the listing unchanged
                                    passthrough.push(file.clone());
                                    continue;
                                }
                                let base_path = file.path.with_name(base);
                                files.entry(base_path).or_default().parity =
                                    Some((file.clone(), odd_length));
                            }
                        }
                    }
                }
            }
        }

        let repairs_safe = hard_error.is_none();

        // the listed directory itself is repairable when it exists on
        // exactly two backends
        if repairs_safe
            && self.options().auto_heal
            && !dir.is_root()
            && listings.iter().filter(|l| l.is_some()).count() == 2
        {
            if let Some(slot) = missing.iter().position(|m| *m) {
                self.reconstruct_dir(dir, ROLES[slot]);
            }
        }

        let mut output: Vec<Entry> = Vec::new();

        for (path, presence) in dirs {
            let count = presence.iter().filter(|p| **p).count();
            match count {
                1 if repairs_safe && self.options().auto_cleanup => {
                    let slot = presence.iter().position(|p| *p).unwrap();
                    if self.remove_orphaned_dir(&path, ROLES[slot]) {
                        continue;
                    }
                    output.push(Entry::Dir(DirEntry { path }));
                }
                2 if repairs_safe && self.options().auto_heal => {
                    let slot = presence.iter().position(|p| !*p).unwrap();
                    self.reconstruct_dir(&path, ROLES[slot]);
                    output.push(Entry::Dir(DirEntry { path }));
                }
                _ => output.push(Entry::Dir(DirEntry { path })),
            }
        }

        for (path, merged) in files {
            if merged.present_count() < 2 && self.options().auto_cleanup {
                debug!(
                    "hiding broken object '{}' ({}/3 particles)",
                    path,
                    merged.present_count()
                );
                continue;
            }
            let Some(size) = merged.logical_size() else {
                debug!("hiding parity-only object '{}'", path);
                continue;
            };
            output.push(Entry::File(FileEntry {
                path,
                size,
                mtime: merged.mtime().expect("present particle has an mtime"),
            }));
        }

        output.extend(passthrough.into_iter().map(Entry::File));

        // the listed directory itself may be an orphan: empty and on a
        // single backend
        if output.is_empty()
            && !dir.is_root()
            && repairs_safe
            && self.options().auto_cleanup
            && listings.iter().filter(|l| l.is_some()).count() == 1
        {
            let slot = listings.iter().position(|l| l.is_some()).unwrap();
            self.remove_orphaned_dir(dir, ROLES[slot]);
        }

        output.sort_by(|a, b| {
            let key = |e: &Entry| match e {
                Entry::File(f) => f.path.clone(),
                Entry::Dir(d) => d.path.clone(),
            };
            key(a).cmp(&key(b))
        });
        Ok(output)
    }

    /// Removes an empty directory present on a single backend. Returns
    /// whether it was removed.
    fn remove_orphaned_dir(&self, dir: &ObjectPath, role: Role) -> bool {
        let backend = self.backends().get(role);
        match backend.list(dir) {
            Ok(entries) if entries.is_empty() => {
                info!("removing orphaned directory '{}' on {} backend", dir, role);
                match backend.rmdir(dir) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("failed to remove orphaned directory '{}': {}", dir, err);
                        false
                    }
                }
            }
            Ok(_) => false,
            Err(err) => {
                warn!("failed to inspect orphaned directory '{}': {}", dir, err);
                false
            }
        }
    }

    /// Creates a directory on the one backend it is missing from.
    fn reconstruct_dir(&self, dir: &ObjectPath, role: Role) {
        match self.backends().get(role).mkdir(dir) {
            Ok(()) => info!("reconstructed directory '{}' on {} backend", dir, role),
            Err(BackendError::DirectoryExists(_)) => {}
            Err(err) => warn!(
                "failed to reconstruct directory '{}' on {} backend: {}",
                dir, role, err
            ),
        }
    }
}
