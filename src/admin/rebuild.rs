/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use log::{info, warn};

use super::{census, ObjectParticles, ParticleCensus};
use crate::backend::BackendResult;
use crate::codec::{parity as parity_of, reconstruct_from_even, reconstruct_from_odd, split};
use crate::layout::{parity_name, Role, ROLES};
use crate::path::ObjectPath;
use crate::report::Report;
use crate::vfs::TripleFs;

/// Ordering of the rebuild work list. Correctness does not depend on
/// it; the modes only change how progress is perceived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RebuildPriority {
    #[default]
    Auto,
    DirsSmall,
    Dirs,
    Small,
}

impl FromStr for RebuildPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RebuildPriority::Auto),
            "dirs-small" => Ok(RebuildPriority::DirsSmall),
            "dirs" => Ok(RebuildPriority::Dirs),
            "small" => Ok(RebuildPriority::Small),
            other => Err(format!("unknown rebuild priority '{}'", other)),
        }
    }
}

#[derive(Default)]
pub struct RebuildOptions {
    pub role: Option<Role>,
    /// Emit the analysis without planning or writing.
    pub check_only: bool,
    /// Emit the plan without writing.
    pub dry_run: bool,
    pub priority: RebuildPriority,
}

/// Restores a fresh or wiped backend to parity with its peers.
pub fn run(fs: &Arc<TripleFs>, options: &RebuildOptions) -> anyhow::Result<String> {
    let started = Instant::now();
    let census = census(fs);

    let target = match options.role {
        Some(role) => role,
        None => auto_detect(&census)?,
    };
    info!("rebuild target: {} backend", target);

    let mut plan: Vec<(&ObjectPath, &ObjectParticles)> = census
        .objects
        .iter()
        .filter(|(_, particles)| particles.get(target).is_none())
        .collect();
    let present = census.objects.len() - plan.len();
    order_plan(&mut plan, options.priority);

    let mut report = Report::new(format!("rebuild of the {} backend", target));
    report.field("objects", census.objects.len());
    report.field("already present", present);
    report.field("to rebuild", plan.len());

    if options.check_only {
        report.field("mode", "check-only, nothing written");
        return Ok(report.to_string());
    }
    if options.dry_run {
        report.field("mode", "dry-run, nothing written");
        report.blank();
        for (remote, _) in &plan {
            report.line(format!("would rebuild {} particle of '{}'", target, remote));
        }
        return Ok(report.to_string());
    }

    let mut rebuilt = 0usize;
    let mut bytes = 0u64;
    let mut unrecoverable: Vec<ObjectPath> = Vec::new();
    for (remote, particles) in plan {
        match restore_particle(fs, target, remote, particles) {
            Ok(written) => {
                rebuilt += 1;
                bytes += written;
            }
            Err(reason) => {
                warn!("cannot rebuild '{}': {}", remote, reason);
                unrecoverable.push(remote.clone());
            }
        }
    }

    report.field("rebuilt", rebuilt);
    report.field("bytes written", bytes);
    report.field("unrecoverable", unrecoverable.len());
    for remote in &unrecoverable {
        report.line(format!("  {}", remote));
    }
    report.field("elapsed", format!("{:.2?}", started.elapsed()));
    Ok(report.to_string())
}

fn auto_detect(census: &ParticleCensus) -> anyhow::Result<Role> {
    let min = census
        .counts
        .iter()
        .map(|(files, _)| *files)
        .min()
        .unwrap_or(0);
    let candidates: Vec<Role> = ROLES
        .iter()
        .enumerate()
        .filter(|(slot, _)| census.counts[*slot].0 == min)
        .map(|(_, role)| *role)
        .collect();
    if candidates.len() != 1 {
        bail!(
            "cannot auto-detect rebuild target: particle counts are equal, \
             pass the role explicitly"
        );
    }
    Ok(candidates[0])
}

fn order_plan(plan: &mut [(&ObjectPath, &ObjectParticles)], priority: RebuildPriority) {
    let estimate = |particles: &ObjectParticles| -> u64 {
        ROLES
            .iter()
            .filter_map(|role| particles.get(*role))
            .map(|entry| entry.size)
            .sum()
    };
    match priority {
        RebuildPriority::Auto => {}
        RebuildPriority::Small => {
            plan.sort_by_key(|(_, particles)| estimate(particles));
        }
        RebuildPriority::Dirs => {
            plan.sort_by(|(a, _), (b, _)| a.parent().cmp(&b.parent()).then_with(|| a.cmp(b)));
        }
        RebuildPriority::DirsSmall => {
            plan.sort_by(|(a, pa), (b, pb)| {
                a.parent()
                    .cmp(&b.parent())
                    .then_with(|| estimate(pa).cmp(&estimate(pb)))
            });
        }
    }
}

/// Reconstructs one missing particle from the two present ones and
/// uploads it to the target backend. Returns the bytes written, or the
/// reason reconstruction is impossible.
pub(crate) fn restore_particle(
    fs: &TripleFs,
    target: Role,
    remote: &ObjectPath,
    particles: &ObjectParticles,
) -> Result<u64, String> {
    let read = |role: Role, path: &ObjectPath| -> Result<Vec<u8>, String> {
        let backend = fs.backends().get(role);
        let result: BackendResult<Vec<u8>> =
            fs.retrier().run("rebuild read", || backend.open(path, None));
        result.map_err(|err| format!("failed to read {} particle: {}", role, err))
    };

    let (name, payload, mtime) = match target {
        Role::Parity => {
            let even_entry = particles.even.as_ref().ok_or("even particle missing")?;
            let odd_entry = particles.odd.as_ref().ok_or("odd particle missing")?;
            let even = read(Role::Even, &even_entry.path)?;
            let odd = read(Role::Odd, &odd_entry.path)?;
            let odd_length = (even.len() + odd.len()) % 2 == 1;
            (
                parity_name(remote, odd_length),
                parity_of(&even, &odd),
                even_entry.mtime,
            )
        }
        Role::Even => {
            let odd_entry = particles.odd.as_ref().ok_or("odd particle missing")?;
            let (parity_entry, odd_length) =
                particles.parity.as_ref().ok_or("parity particle missing")?;
            let odd = read(Role::Odd, &odd_entry.path)?;
            let parity = read(Role::Parity, &parity_entry.path)?;
            let data = reconstruct_from_odd(&odd, &parity, *odd_length)
                .map_err(|err| err.to_string())?;
            (remote.clone(), split(&data).0, odd_entry.mtime)
        }
        Role::Odd => {
            let even_entry = particles.even.as_ref().ok_or("even particle missing")?;
            let (parity_entry, odd_length) =
                particles.parity.as_ref().ok_or("parity particle missing")?;
            let even = read(Role::Even, &even_entry.path)?;
            let parity = read(Role::Parity, &parity_entry.path)?;
            let data = reconstruct_from_even(&even, &parity, *odd_length)
                .map_err(|err| err.to_string())?;
            (remote.clone(), split(&data).1, even_entry.mtime)
        }
    };

    let written = payload.len() as u64;
    fs.retrier()
        .once(|| fs.backends().get(target).put(&name, &payload, mtime))
        .map_err(|err| format!("failed to upload {} particle: {}", target, err))?;
    Ok(written)
}
