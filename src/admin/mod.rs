/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

pub mod cleanup;
pub mod heal;
pub mod rebuild;
pub mod status;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use log::warn;

use crate::backend::{BackendError, FileEntry};
use crate::layout::{strip_parity_suffix, transient_name_patterns, Role, ROLES};
use crate::path::ObjectPath;
use crate::vfs::{ObjectState, TripleFs, VfsError};

use self::rebuild::{RebuildOptions, RebuildPriority};

/// Runs a named admin command with positional arguments and a
/// string-keyed option map, returning its report.
pub fn run(
    fs: &Arc<TripleFs>,
    name: &str,
    args: &[String],
    opts: &HashMap<String, String>,
) -> anyhow::Result<String> {
    match name {
        "status" => status::run(fs),
        "rebuild" => {
            let role = match args.first() {
                Some(arg) => Some(arg.parse::<Role>().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let options = RebuildOptions {
                role,
                check_only: parse_flag(opts, "check-only")?,
                dry_run: parse_flag(opts, "dry-run")?,
                priority: match opts.get("priority") {
                    Some(value) => value.parse::<RebuildPriority>().map_err(anyhow::Error::msg)?,
                    None => RebuildPriority::Auto,
                },
            };
            rebuild::run(fs, &options)
        }
        "heal" => heal::run(fs),
        "cleanup" => cleanup::run(fs),
        other => Err(VfsError::CommandNotFound(other.to_owned()).into()),
    }
}

fn parse_flag(opts: &HashMap<String, String>, key: &str) -> anyhow::Result<bool> {
    match opts.get(key) {
        None => Ok(false),
        Some(value) => value
            .parse::<bool>()
            .with_context(|| format!("option '{}' must be true or false", key)),
    }
}

/// Particle inventory of one logical object.
#[derive(Default)]
pub(crate) struct ObjectParticles {
    pub even: Option<FileEntry>,
    pub odd: Option<FileEntry>,
    pub parity: Option<(FileEntry, bool)>,
}

impl ObjectParticles {
    pub fn get(&self, role: Role) -> Option<&FileEntry> {
        match role {
            Role::Even => self.even.as_ref(),
            Role::Odd => self.odd.as_ref(),
            Role::Parity => self.parity.as_ref().map(|(entry, _)| entry),
        }
    }

    pub fn state(&self) -> ObjectState {
        match (&self.even, &self.odd, &self.parity) {
            (Some(_), Some(_), Some(_)) => ObjectState::Healthy,
            (None, Some(_), Some(_)) => ObjectState::Degraded(Role::Even),
            (Some(_), None, Some(_)) => ObjectState::Degraded(Role::Odd),
            (Some(_), Some(_), None) => ObjectState::Degraded(Role::Parity),
            _ => ObjectState::Broken,
        }
    }

    pub fn present_count(&self) -> usize {
        ROLES.iter().filter(|r| self.get(**r).is_some()).count()
    }
}

/// Full-namespace walk of the three backends, merged per logical
/// object. Transient names are collected separately for cleanup.
#[derive(Default)]
pub(crate) struct ParticleCensus {
    pub objects: BTreeMap<ObjectPath, ObjectParticles>,
    pub transient: Vec<(Role, ObjectPath)>,
    /// Files on the parity backend without a parity suffix. They are
    /// not particles and no admin command may touch them.
    pub foreign: Vec<ObjectPath>,
    /// Particle files and bytes per backend.
    pub counts: [(usize, u64); 3],
}

#[cfg(test)]
mod tests;

pub(crate) fn census(fs: &TripleFs) -> ParticleCensus {
    let transient_patterns = transient_name_patterns();
    let mut census = ParticleCensus::default();

    let walks = fs.on_all(|role| fs.backends().get(role).walk(&ObjectPath::root()));
    for (role, walk) in walks {
        let slot = ROLES.iter().position(|r| *r == role).unwrap();
        let entries = match walk {
            Ok(entries) => entries,
            Err(BackendError::DirectoryNotFound(_)) => Vec::new(),
            Err(err) => {
                warn!("namespace walk of {} backend failed: {}", role, err);
                Vec::new()
            }
        };
        for entry in entries {
            census.counts[slot].0 += 1;
            census.counts[slot].1 += entry.size;
            if transient_patterns.is_match(entry.path.name()) {
                census.transient.push((role, entry.path));
                continue;
            }
            match role {
                Role::Even => {
                    let key = entry.path.clone();
                    census.objects.entry(key).or_default().even = Some(entry);
                }
                Role::Odd => {
                    let key = entry.path.clone();
                    census.objects.entry(key).or_default().odd = Some(entry);
                }
                Role::Parity => {
                    let (base, is_parity, odd_length) = strip_parity_suffix(entry.path.name());
                    if !is_parity {
                        // not a particle; passes through untouched
                        census.foreign.push(entry.path);
                        continue;
                    }
                    let base_path = entry.path.with_name(base);
                    census.objects.entry(base_path).or_default().parity =
                        Some((entry, odd_length));
                }
            }
        }
    }
    census
}
