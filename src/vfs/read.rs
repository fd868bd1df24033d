/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread;
use std::time::SystemTime;

use log::{debug, info};

use super::{TripleFs, VfsError, VfsResult};
use crate::backend::BackendResult;
use crate::codec::{merge, parity as parity_of, reconstruct_from_even, reconstruct_from_odd, split};
use crate::heal::HealJob;
use crate::layout::{parity_name, Role};
use crate::path::ObjectPath;

impl TripleFs {
    /// Reads the full logical object, reconstructing from parity when a
    /// data particle is missing.
    pub fn read(&self, remote: &ObjectPath) -> VfsResult<Vec<u8>> {
        let (even, odd) = thread::scope(|scope| {
            let even = scope.spawn(|| self.read_particle(Role::Even, remote));
            let odd = scope.spawn(|| self.read_particle(Role::Odd, remote));
            (
                even.join().expect("read thread panicked"),
                odd.join().expect("read thread panicked"),
            )
        });

        if let (Some(even), Some(odd)) = (&even, &odd) {
            return Ok(merge(even, odd)?);
        }

        let Some((parity, odd_length)) = self.read_parity(remote) else {
            debug!("no recoverable particle combination for '{}'", remote);
            return Err(VfsError::InsufficientParticles {
                remote: remote.clone(),
            });
        };

        let (data, missing) = match (&even, &odd) {
            (Some(even), None) => (
                reconstruct_from_even(even, &parity, odd_length)?,
                Role::Odd,
            ),
            (None, Some(odd)) => (
                reconstruct_from_odd(odd, &parity, odd_length)?,
                Role::Even,
            ),
            _ => {
                return Err(VfsError::InsufficientParticles {
                    remote: remote.clone(),
                });
            }
        };

        info!(
            "degraded read of '{}': {} particle missing, reconstructed {} bytes from parity",
            remote,
            missing,
            data.len()
        );
        if self.options().auto_heal {
            self.offer_heal(remote, missing, &data, odd_length);
        }
        Ok(data)
    }

    fn read_particle(&self, role: Role, remote: &ObjectPath) -> Option<Vec<u8>> {
        let backend = self.backends().get(role);
        let result: BackendResult<Vec<u8>> = self
            .retrier()
            .run("particle read", || backend.open(remote, None));
        result.ok()
    }

    fn read_parity(&self, remote: &ObjectPath) -> Option<(Vec<u8>, bool)> {
        for odd_length in [true, false] {
            let name = parity_name(remote, odd_length);
            let result = self
                .retrier()
                .run("parity read", || self.backends().parity.open(&name, None));
            if let Ok(bytes) = result {
                return Some((bytes, odd_length));
            }
        }
        None
    }

    /// Derives the missing particle from reconstructed data and offers
    /// it to the self-healing queue. Enqueue failures only log; the
    /// read has already succeeded.
    fn offer_heal(&self, remote: &ObjectPath, missing: Role, data: &[u8], odd_length: bool) {
        let (even, odd) = split(data);
        let payload = match missing {
            Role::Even => even,
            Role::Odd => odd,
            Role::Parity => parity_of(&even, &odd),
        };
        let mtime = self.mod_time(remote).unwrap_or_else(|_| SystemTime::now());
        self.healer().offer(HealJob {
            remote: remote.clone(),
            role: missing,
            payload,
            odd_length,
            mtime,
        });
    }
}
