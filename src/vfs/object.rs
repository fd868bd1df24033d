/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use log::warn;
use twox_hash::{XxHash3_64, XxHash64};

use super::{ObjectState, TripleFs, VfsError, VfsResult};
use crate::backend::BackendError;
use crate::codec::CodecError;
use crate::layout::{parity_name, Role, ROLES};
use crate::path::ObjectPath;

/// Byte range of a read. Ends are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadRange {
    #[default]
    All,
    /// From a byte offset to the end of the object.
    From(u64),
    /// Inclusive `start..=end`.
    Bounded(u64, u64),
    /// The last `n` bytes.
    Suffix(u64),
}

impl ReadRange {
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let len = data.len();
        match *self {
            ReadRange::All => data,
            ReadRange::From(start) => &data[(start as usize).min(len)..],
            ReadRange::Bounded(start, end) => {
                let start = (start as usize).min(len);
                let end = ((end as usize) + 1).min(len);
                &data[start..end.max(start)]
            }
            ReadRange::Suffix(n) => &data[len - (n as usize).min(len)..],
        }
    }
}

/// Hash algorithms computable over logical objects. There is no
/// particle-level hash that corresponds to a logical-object hash, so
/// hashing always reconstructs the merged bytes first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashType {
    Xxh64,
    Xxh3,
}

impl HashType {
    pub fn compute(&self, data: &[u8]) -> u64 {
        match self {
            HashType::Xxh64 => {
                let mut hasher = XxHash64::default();
                hasher.write(data);
                hasher.finish()
            }
            HashType::Xxh3 => {
                let mut hasher = XxHash3_64::default();
                hasher.write(data);
                hasher.finish()
            }
        }
    }
}

impl Display for HashType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashType::Xxh64 => write!(f, "xxh64"),
            HashType::Xxh3 => write!(f, "xxh3"),
        }
    }
}

impl FromStr for HashType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xxh64" => Ok(HashType::Xxh64),
            "xxh3" => Ok(HashType::Xxh3),
            other => Err(format!("unknown hash type '{}'", other)),
        }
    }
}

/// Handle to one logical object. Carries a shared reference to the
/// owning filesystem for metadata probes; dropping a handle never
/// blocks filesystem shutdown.
pub struct Object {
    fs: Arc<TripleFs>,
    remote: ObjectPath,
}

impl TripleFs {
    /// Looks up an object. Fails with `InsufficientParticles` when too
    /// few particles survive to ever read it.
    pub fn new_object(self: &Arc<Self>, remote: &ObjectPath) -> VfsResult<Object> {
        let probe = self.probe_particles(remote);
        match probe.state() {
            ObjectState::Healthy | ObjectState::Degraded(_) => Ok(Object {
                fs: Arc::clone(self),
                remote: remote.clone(),
            }),
            ObjectState::Broken if probe.present_count() == 0 => Err(VfsError::Backend(
                BackendError::ObjectNotFound(remote.clone()),
            )),
            ObjectState::Broken => Err(VfsError::InsufficientParticles {
                remote: remote.clone(),
            }),
        }
    }
}

impl Object {
    pub fn remote(&self) -> &ObjectPath {
        &self.remote
    }

    /// Logical size, computable from any two particles without reading
    /// data bytes.
    pub fn size(&self) -> VfsResult<u64> {
        let probe = self.fs.probe_particles(&self.remote);
        if let (Some(even), Some(odd)) = (probe.even, probe.odd) {
            if even != odd && even != odd + 1 {
                return Err(VfsError::Codec(CodecError::InvalidParticleSizes {
                    even: even as usize,
                    odd: odd as usize,
                }));
            }
        }
        probe
            .logical_size()
            .ok_or_else(|| VfsError::InsufficientParticles {
                remote: self.remote.clone(),
            })
    }

    pub fn mod_time(&self) -> VfsResult<SystemTime> {
        self.fs.mod_time(&self.remote)
    }

    /// Stamps `mtime` on every present particle.
    pub fn set_mod_time(&self, mtime: SystemTime) -> VfsResult<()> {
        let probe = self.fs.probe_particles(&self.remote);
        for role in ROLES {
            let name = match role {
                Role::Even if probe.even.is_some() => self.remote.clone(),
                Role::Odd if probe.odd.is_some() => self.remote.clone(),
                Role::Parity => match probe.parity {
                    Some((_, odd_length)) => parity_name(&self.remote, odd_length),
                    None => continue,
                },
                _ => continue,
            };
            if let Err(err) = self
                .fs
                .retrier()
                .once(|| self.fs.backends().get(role).set_mod_time(&name, mtime))
            {
                warn!(
                    "failed to stamp mtime on {} particle of '{}': {}",
                    role, self.remote, err
                );
            }
        }
        Ok(())
    }

    pub fn open(&self, range: ReadRange) -> VfsResult<Vec<u8>> {
        let data = self.fs.read(&self.remote)?;
        Ok(range.slice(&data).to_vec())
    }

    /// Hash of the merged logical bytes.
    pub fn hash(&self, hash_type: HashType) -> VfsResult<u64> {
        let data = self.fs.read(&self.remote)?;
        Ok(hash_type.compute(&data))
    }

    pub fn remove(&self) -> VfsResult<()> {
        self.fs.remove(&self.remote)
    }

    pub fn update(&self, data: &[u8], mtime: SystemTime) -> VfsResult<()> {
        self.fs.update(&self.remote, data, mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_slicing() {
        let data = b"ABCDEFGHIJ";
        assert_eq!(b"ABCDEFGHIJ", ReadRange::All.slice(data));
        assert_eq!(b"FGHIJ", ReadRange::From(5).slice(data));
        assert_eq!(b"", ReadRange::From(99).slice(data));
        assert_eq!(b"CDE", ReadRange::Bounded(2, 4).slice(data));
        assert_eq!(b"J", ReadRange::Bounded(9, 200).slice(data));
        assert_eq!(b"", ReadRange::Bounded(7, 3).slice(data));
        assert_eq!(b"HIJ", ReadRange::Suffix(3).slice(data));
        assert_eq!(b"ABCDEFGHIJ", ReadRange::Suffix(64).slice(data));
    }

    #[test]
    fn test_hash_types_differ() {
        let data = b"some object payload";
        let xxh64 = HashType::Xxh64.compute(data);
        let xxh3 = HashType::Xxh3.compute(data);
        assert_ne!(xxh64, xxh3);
        // deterministic
        assert_eq!(xxh64, HashType::Xxh64.compute(data));
    }

    #[test]
    fn test_hash_type_parse() {
        assert_eq!(Ok(HashType::Xxh64), "xxh64".parse());
        assert_eq!(Ok(HashType::Xxh3), "xxh3".parse());
        assert!("md5".parse::<HashType>().is_err());
    }
}
