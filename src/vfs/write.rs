/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread;
use std::time::SystemTime;

use log::{debug, info, warn};

use super::{TripleFs, VfsError, VfsResult};
use crate::backend::{BackendError, BackendResult};
use crate::codec::{parity as parity_of, split};
use crate::layout::{parity_name, Role};
use crate::path::ObjectPath;

impl TripleFs {
    /// Creates a new logical object. All three particle uploads must
    /// succeed; there is no rollback of a partial write, the next
    /// update's size check catches the inconsistency instead.
    pub fn put(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> VfsResult<()> {
        self.ensure_writable()?;
        let (even, odd) = split(data);
        let parity = parity_of(&even, &odd);
        let odd_length = data.len() % 2 == 1;
        let parity_remote = parity_name(remote, odd_length);

        debug!(
            "put '{}': {} bytes as {}+{}+{} particle bytes",
            remote,
            data.len(),
            even.len(),
            odd.len(),
            parity.len()
        );
        self.upload_each(
            remote,
            [
                (Role::Even, remote.clone(), even, false),
                (Role::Odd, remote.clone(), odd, false),
                (Role::Parity, parity_remote, parity, false),
            ],
            mtime,
        )
    }

    /// Rewrites an existing object. Particles that exist are updated in
    /// place, missing ones are created; a parity-suffix change removes
    /// the stale suffix afterwards. A mandatory post-write probe
    /// re-validates the size invariant.
    pub fn update(&self, remote: &ObjectPath, data: &[u8], mtime: SystemTime) -> VfsResult<()> {
        self.ensure_writable()?;
        let before = self.probe_particles(remote);
        let (even, odd) = split(data);
        let parity = parity_of(&even, &odd);
        let odd_length = data.len() % 2 == 1;
        let parity_remote = parity_name(remote, odd_length);

        let stale_parity = match before.parity {
            Some((_, old_flag)) if old_flag != odd_length => {
                Some(parity_name(remote, old_flag))
            }
            _ => None,
        };

        let expected = (even.len() as u64, odd.len() as u64);
        self.upload_each(
            remote,
            [
                (Role::Even, remote.clone(), even, before.even.is_some()),
                (Role::Odd, remote.clone(), odd, before.odd.is_some()),
                (
                    Role::Parity,
                    parity_remote,
                    parity,
                    before.parity.is_some() && stale_parity.is_none(),
                ),
            ],
            mtime,
        )?;

        if let Some(stale) = stale_parity {
            debug!("removing stale parity particle '{}'", stale);
            if let Err(err) = self
                .retrier()
                .once(|| self.backends().parity.remove(&stale))
            {
                warn!("failed to remove stale parity particle '{}': {}", stale, err);
            }
        }

        // mandatory post-write probe: a partial earlier failure must not
        // be silently completed into a corrupt object
        let after = self.probe_particles(remote);
        let observed = (after.even.unwrap_or(0), after.odd.unwrap_or(0));
        if observed != expected {
            return Err(VfsError::CorruptionDetected {
                remote: remote.clone(),
                even: observed.0,
                odd: observed.1,
            });
        }
        Ok(())
    }

    /// Best-effort, idempotent deletion of all particles.
    pub fn remove(&self, remote: &ObjectPath) -> VfsResult<()> {
        let targets = [
            (Role::Even, remote.clone()),
            (Role::Odd, remote.clone()),
            (Role::Parity, parity_name(remote, true)),
            (Role::Parity, parity_name(remote, false)),
        ];
        let results = thread::scope(|scope| {
            let handles = targets.map(|(role, name)| {
                scope.spawn(move || {
                    let result = self
                        .retrier()
                        .once(|| self.backends().get(role).remove(&name));
                    (role, name, result)
                })
            });
            handles.map(|handle| handle.join().expect("remove thread panicked"))
        });

        let mut removed = 0;
        let mut failure: Option<(Role, BackendError)> = None;
        for (role, name, result) in results {
            match result {
                Ok(()) => removed += 1,
                Err(BackendError::ObjectNotFound(_)) => {}
                Err(err) => {
                    warn!("failed to remove particle '{}': {}", name, err);
                    if failure.is_none() {
                        failure = Some((role, err));
                    }
                }
            }
        }
        if removed == 0 {
            if let Some((_, err)) = failure {
                return Err(VfsError::Backend(err));
            }
        }
        info!("removed '{}' ({} particles deleted)", remote, removed);
        Ok(())
    }

    /// Uploads three particles in parallel, choosing update (when the
    /// particle already exists) or put. Any sub-failure fails the whole
    /// operation, and writes never run with low-level retries.
    fn upload_each(
        &self,
        remote: &ObjectPath,
        particles: [(Role, ObjectPath, Vec<u8>, bool); 3],
        mtime: SystemTime,
    ) -> VfsResult<()> {
        let results = thread::scope(|scope| {
            let handles = particles.map(|(role, name, payload, exists)| {
                scope.spawn(move || {
                    let backend = self.backends().get(role);
                    let result: BackendResult<()> = self.retrier().once(|| {
                        if exists {
                            backend.update(&name, &payload, mtime)
                        } else {
                            backend.put(&name, &payload, mtime)
                        }
                    });
                    (role, result)
                })
            });
            handles.map(|handle| handle.join().expect("upload thread panicked"))
        });
        for (role, result) in results {
            if let Err(inner) = result {
                return Err(VfsError::ParticleUploadFailed {
                    remote: remote.clone(),
                    role,
                    inner,
                });
            }
        }
        Ok(())
    }
}
