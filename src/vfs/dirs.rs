/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread;

use log::{debug, info, warn};

use super::{TripleFs, VfsError, VfsResult};
use crate::backend::BackendError;
use crate::layout::{parity_name, Role, ROLES};
use crate::path::ObjectPath;

impl TripleFs {
    /// Creates `dir` on all three backends. Any failure surfaces.
    pub fn mkdir(&self, dir: &ObjectPath) -> VfsResult<()> {
        self.ensure_writable()?;
        let results = self.on_all(|role| self.backends().get(role).mkdir(dir));
        for (_, result) in results {
            result?;
        }
        Ok(())
    }

    /// Best-effort directory removal: succeeds if any backend
    /// succeeded, reports `DirectoryNotFound` only when all three
    /// agree the directory is gone.
    pub fn rmdir(&self, dir: &ObjectPath) -> VfsResult<()> {
        let results = self.on_all(|role| self.backends().get(role).rmdir(dir));
        if results.iter().any(|(_, r)| r.is_ok()) {
            return Ok(());
        }
        let not_found = results
            .iter()
            .filter(|(_, r)| matches!(r, Err(BackendError::DirectoryNotFound(_))))
            .count();
        if not_found == 3 {
            return Err(VfsError::Backend(BackendError::DirectoryNotFound(
                dir.clone(),
            )));
        }
        let mut errors = results.into_iter().filter_map(|(_, r)| r.err());
        let first = errors.next().expect("no success means an error");
        if errors.all(|err| err == first) {
            return Err(VfsError::Backend(first));
        }
        // backends disagree while degraded; treat as removed
        warn!("rmdir '{}' got mixed failures, treating as success", dir);
        Ok(())
    }

    /// Retargets the particle triple of one object in lockstep. A
    /// particle absent on its backend is skipped; the destination then
    /// inherits the degradation and a later read heals it.
    pub fn move_object(&self, src: &ObjectPath, dst: &ObjectPath) -> VfsResult<()> {
        self.ensure_writable()?;
        let probe = self.probe_particles(src);

        let mut moves: Vec<(Role, ObjectPath, ObjectPath)> = Vec::new();
        if probe.even.is_some() {
            moves.push((Role::Even, src.clone(), dst.clone()));
        }
        if probe.odd.is_some() {
            moves.push((Role::Odd, src.clone(), dst.clone()));
        }
        if let Some((_, odd_length)) = probe.parity {
            moves.push((
                Role::Parity,
                parity_name(src, odd_length),
                parity_name(dst, odd_length),
            ));
        }

        let results = thread::scope(|scope| {
            let handles: Vec<_> = moves
                .into_iter()
                .map(|(role, from, to)| {
                    scope.spawn(move || {
                        let result = self
                            .retrier()
                            .once(|| self.backends().get(role).move_object(&from, &to));
                        (role, result)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("move thread panicked"))
                .collect::<Vec<_>>()
        });
        for (role, result) in results {
            match result {
                Ok(()) => {}
                // the probe raced an external change; nothing to move
                Err(BackendError::ObjectNotFound(_)) => {
                    debug!("{} particle of '{}' vanished before move", role, src)
                }
                Err(err) => return Err(VfsError::Backend(err)),
            }
        }
        info!("moved '{}' to '{}'", src, dst);
        Ok(())
    }

    /// Moves a whole directory tree on each backend. Only permitted
    /// within one logical filesystem.
    pub fn dir_move(&self, src_fs_name: &str, src: &ObjectPath, dst: &ObjectPath) -> VfsResult<()> {
        if src_fs_name != self.name() {
            return Err(VfsError::CantDirMove(src_fs_name.to_owned()));
        }
        self.ensure_writable()?;

        let (dst_exists, dst_non_empty) = self.probe_directory(dst);
        if dst_non_empty {
            return Err(VfsError::DirectoryExists(dst.clone()));
        }
        if dst_exists {
            debug!("removing empty destination directory '{}'", dst);
            self.rmdir(dst)?;
        }

        if let Some(parent) = dst.parent() {
            if !parent.is_root() {
                self.mkdir_all(&parent);
            }
        }

        let results = self.on_all(|role| self.backends().get(role).dir_move(src, dst));
        for (role, result) in results {
            match result {
                Ok(()) => {}
                Err(BackendError::DirectoryNotFound(_)) if self.options().auto_heal => {
                    // reconstruction on move: the source never existed on
                    // this backend, create the destination instead
                    info!(
                        "source '{}' missing on {} backend, creating '{}' there",
                        src, role, dst
                    );
                    match self.backends().get(role).mkdir(dst) {
                        Ok(()) | Err(BackendError::DirectoryExists(_)) => {}
                        Err(err) => return Err(VfsError::Backend(err)),
                    }
                }
                Err(err) => return Err(VfsError::Backend(err)),
            }
        }
        info!("moved directory '{}' to '{}'", src, dst);
        Ok(())
    }

    /// Runs one closure per role in parallel.
    pub(crate) fn on_all<T: Send>(
        &self,
        op: impl Fn(Role) -> T + Sync,
    ) -> [(Role, T); 3] {
        thread::scope(|scope| {
            let op = &op;
            let handles = ROLES.map(|role| (role, scope.spawn(move || op(role))));
            handles.map(|(role, handle)| (role, handle.join().expect("backend thread panicked")))
        })
    }

    /// Whether `dir` exists on any backend and whether any listing of
    /// it is non-empty.
    fn probe_directory(&self, dir: &ObjectPath) -> (bool, bool) {
        let mut exists = false;
        let mut non_empty = false;
        for (role, result) in self.on_all(|role| self.backends().get(role).list(dir)) {
            match result {
                Ok(entries) => {
                    exists = true;
                    if !entries.is_empty() {
                        non_empty = true;
                    }
                }
                Err(BackendError::DirectoryNotFound(_)) => {}
                Err(err) => warn!("probe of directory '{}' on {} failed: {}", dir, role, err),
            }
        }
        (exists, non_empty)
    }

    /// Creates `dir` and its parents on every backend, tolerating
    /// pre-existing directories.
    pub(crate) fn mkdir_all(&self, dir: &ObjectPath) {
        let mut chain = Vec::new();
        let mut current = Some(dir.clone());
        while let Some(step) = current {
            if step.is_root() {
                break;
            }
            current = step.parent();
            chain.push(step);
        }
        for step in chain.into_iter().rev() {
            for (role, result) in self.on_all(|role| self.backends().get(role).mkdir(&step)) {
                match result {
                    Ok(()) | Err(BackendError::DirectoryExists(_)) => {}
                    Err(err) => warn!("mkdir '{}' on {} backend failed: {}", step, role, err),
                }
            }
        }
    }
}
