/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

pub mod dirs;
pub mod list;
pub mod object;
pub mod read;
pub mod write;


pub use object::{HashType, Object, ReadRange};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use log::warn;
use thiserror::Error;

use crate::backend::{About, BackendError, BackendSet};
use crate::codec::CodecError;
use crate::codec::{size_from_even_and_parity, size_from_odd_and_parity};
use crate::heal::{Healer, DEFAULT_WORKERS, DRAIN_DEADLINE};
use crate::health::{check_all_backends, HealthReport, HEALTH_CHECK_DEADLINE};
use crate::layout::{parity_name, Role};
use crate::path::ObjectPath;
use crate::retry::{Retrier, TimeoutMode};

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("fewer than two backends reachable:\n{report}")]
    InsufficientBackends { report: HealthReport },
    #[error("write refused: a backend is unavailable\n{report}writes require all three backends; reads keep working with any two\nrun the 'status' command for a recovery guide")]
    DegradedWriteBlocked { report: HealthReport },
    #[error("object '{remote}' has too few particles to read")]
    InsufficientParticles { remote: ObjectPath },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("corruption detected on '{remote}': even particle {even} bytes, odd particle {odd} bytes")]
    CorruptionDetected {
        remote: ObjectPath,
        even: u64,
        odd: u64,
    },
    #[error("failed to upload {role} particle of '{remote}': {inner}")]
    ParticleUploadFailed {
        remote: ObjectPath,
        role: Role,
        inner: BackendError,
    },
    #[error("destination directory '{0}' exists and is not empty")]
    DirectoryExists(ObjectPath),
    #[error("source filesystem '{0}' is not this filesystem")]
    CantDirMove(String),
    #[error("command '{0}' not found")]
    CommandNotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Behaviour switches of one striped filesystem.
#[derive(Clone, Copy, Debug)]
pub struct FsOptions {
    pub timeout_mode: TimeoutMode,
    /// Hide broken objects from listings and remove orphaned directories.
    pub auto_cleanup: bool,
    /// Queue self-heal uploads on degraded reads and reconstruct missing
    /// directories during listings.
    pub auto_heal: bool,
    pub heal_workers: usize,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            timeout_mode: TimeoutMode::default(),
            auto_cleanup: true,
            auto_heal: true,
            heal_workers: DEFAULT_WORKERS,
        }
    }
}

/// Health of one logical object, derived from particle presence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectState {
    Healthy,
    /// Readable with two particles; the named role is missing.
    Degraded(Role),
    /// One or zero particles; unrecoverable.
    Broken,
}

/// Presence probe of the three particles of one logical object.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParticleProbe {
    pub even: Option<u64>,
    pub odd: Option<u64>,
    /// Size plus the odd-length flag recorded in the suffix.
    pub parity: Option<(u64, bool)>,
}

impl ParticleProbe {
    pub fn present_count(&self) -> usize {
        usize::from(self.even.is_some())
            + usize::from(self.odd.is_some())
            + usize::from(self.parity.is_some())
    }

    pub fn state(&self) -> ObjectState {
        match (self.even, self.odd, self.parity) {
            (Some(_), Some(_), Some(_)) => ObjectState::Healthy,
            (None, Some(_), Some(_)) => ObjectState::Degraded(Role::Even),
            (Some(_), None, Some(_)) => ObjectState::Degraded(Role::Odd),
            (Some(_), Some(_), None) => ObjectState::Degraded(Role::Parity),
            _ => ObjectState::Broken,
        }
    }

    /// Logical object size, from any readable particle combination.
    pub fn logical_size(&self) -> Option<u64> {
        match (self.even, self.odd, self.parity) {
            (Some(even), Some(odd), _) => Some(even + odd),
            (Some(even), None, Some((parity, odd_length))) => {
                Some(size_from_even_and_parity(even, parity, odd_length))
            }
            (None, Some(odd), Some((parity, _))) => Some(size_from_odd_and_parity(odd, parity)),
            _ => None,
        }
    }
}

/// One logical object store striped byte-wise over three backends.
pub struct TripleFs {
    name: String,
    backends: BackendSet,
    options: FsOptions,
    retrier: Retrier,
    healer: Healer,
}

impl TripleFs {
    /// Opens the filesystem. At least two of the three backends must be
    /// reachable within the construction deadline of the timeout mode.
    pub fn create(name: &str, backends: BackendSet, options: FsOptions) -> VfsResult<Arc<Self>> {
        let deadline = options.timeout_mode.profile().op_timeout;
        let report = check_all_backends(&backends, deadline);
        if report.available_count() < 2 {
            return Err(VfsError::InsufficientBackends { report });
        }
        if !report.all_available() {
            warn!(
                "filesystem '{}' starting degraded, {} backend unavailable",
                name,
                report
                    .failed_roles()
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join("+")
            );
        }
        let healer = Healer::start(backends.clone(), options.heal_workers);
        Ok(Arc::new(Self {
            name: name.to_owned(),
            backends,
            options,
            retrier: Retrier::new(options.timeout_mode),
            healer,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    pub(crate) fn retrier(&self) -> &Retrier {
        &self.retrier
    }

    pub(crate) fn healer(&self) -> &Healer {
        &self.healer
    }

    /// Drains outstanding self-heal uploads, then returns. Waits at
    /// most `deadline`; expiry is logged, not surfaced.
    pub fn shutdown(&self, deadline: Duration) {
        self.healer.shutdown(deadline);
    }

    pub fn shutdown_default(&self) {
        self.shutdown(DRAIN_DEADLINE);
    }

    /// Current availability of the three backends.
    pub fn health(&self) -> HealthReport {
        check_all_backends(&self.backends, HEALTH_CHECK_DEADLINE)
    }

    /// Pre-flight gate of the strict-write policy: a mutation is
    /// refused outright unless all three backends answer the probe, so
    /// the caller sees the first failure instead of a retried partial
    /// success.
    pub(crate) fn ensure_writable(&self) -> VfsResult<()> {
        let report = self.health();
        if report.all_available() {
            Ok(())
        } else {
            Err(VfsError::DegradedWriteBlocked { report })
        }
    }

    /// Probes the three particles of `remote` in parallel.
    pub fn probe_particles(&self, remote: &ObjectPath) -> ParticleProbe {
        thread::scope(|scope| {
            let even = scope.spawn(|| self.probe_size(Role::Even, remote));
            let odd = scope.spawn(|| self.probe_size(Role::Odd, remote));
            let parity = scope.spawn(|| self.probe_parity(remote));
            ParticleProbe {
                even: even.join().expect("probe thread panicked"),
                odd: odd.join().expect("probe thread panicked"),
                parity: parity.join().expect("probe thread panicked"),
            }
        })
    }

    fn probe_size(&self, role: Role, remote: &ObjectPath) -> Option<u64> {
        let backend = self.backends.get(role);
        match self
            .retrier
            .run("particle probe", || backend.size(remote))
        {
            Ok(size) => Some(size),
            Err(BackendError::ObjectNotFound(_))
            | Err(BackendError::DirectoryNotFound(_))
            | Err(BackendError::IsDirectory(_)) => None,
            Err(err) => {
                warn!(
                    "treating {} particle of '{}' as missing: {}",
                    role, remote, err
                );
                None
            }
        }
    }

    /// Probes both parity suffix variants; the one that exists encodes
    /// whether the logical length is odd.
    pub(crate) fn probe_parity(&self, remote: &ObjectPath) -> Option<(u64, bool)> {
        for odd_length in [true, false] {
            let name = parity_name(remote, odd_length);
            if let Some(size) = self.probe_size(Role::Parity, &name) {
                return Some((size, odd_length));
            }
        }
        None
    }

    /// Modification time of the logical object: the even particle's,
    /// falling back to odd, then parity.
    pub fn mod_time(&self, remote: &ObjectPath) -> VfsResult<SystemTime> {
        let probe = self.probe_particles(remote);
        let candidates: [(Role, ObjectPath); 3] = [
            (Role::Even, remote.clone()),
            (Role::Odd, remote.clone()),
            (
                Role::Parity,
                parity_name(remote, probe.parity.map(|(_, f)| f).unwrap_or(false)),
            ),
        ];
        for (role, name) in candidates {
            let present = match role {
                Role::Even => probe.even.is_some(),
                Role::Odd => probe.odd.is_some(),
                Role::Parity => probe.parity.is_some(),
            };
            if !present {
                continue;
            }
            match self
                .retrier
                .run("mod_time", || self.backends.get(role).mod_time(&name))
            {
                Ok(mtime) => return Ok(mtime),
                Err(err) => warn!("mod_time of {} particle failed: {}", role, err),
            }
        }
        Err(VfsError::Backend(BackendError::ObjectNotFound(
            remote.clone(),
        )))
    }

    /// Aggregated usage across the backends that report usage. A field
    /// unknown on any reporting backend stays unknown in the total.
    pub fn about(&self) -> VfsResult<About> {
        let mut reports = Vec::new();
        for role in crate::layout::ROLES {
            if let Some(result) = self.backends.get(role).about() {
                reports.push(result?);
            }
        }
        let sum = |field: fn(&About) -> Option<u64>| -> Option<u64> {
            let mut total = 0u64;
            for report in &reports {
                total += field(report)?;
            }
            Some(total)
        };
        Ok(About {
            total: sum(|a| a.total),
            used: sum(|a| a.used),
            trashed: sum(|a| a.trashed),
            other: sum(|a| a.other),
            free: sum(|a| a.free),
            objects: sum(|a| a.objects),
        })
    }
}
