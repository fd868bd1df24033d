/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use log::{info, warn};

use super::census;
use crate::layout::ROLES;
use crate::report::Report;
use crate::vfs::TripleFs;

/// Walks the full namespace and deletes what can never be read again:
/// the single surviving particle of broken objects, and transient
/// leftovers of interrupted updates.
pub fn run(fs: &Arc<TripleFs>) -> anyhow::Result<String> {
    let census = census(fs);

    let mut broken = 0usize;
    let mut removed = 0usize;
    for (remote, particles) in &census.objects {
        if particles.present_count() != 1 {
            continue;
        }
        broken += 1;
        for role in ROLES {
            let Some(entry) = particles.get(role) else {
                continue;
            };
            info!(
                "removing orphaned {} particle '{}' of broken object '{}'",
                role, entry.path, remote
            );
            match fs
                .retrier()
                .once(|| fs.backends().get(role).remove(&entry.path))
            {
                Ok(()) => removed += 1,
                Err(err) => warn!("failed to remove particle '{}': {}", entry.path, err),
            }
        }
    }

    let mut transient_removed = 0usize;
    for (role, path) in &census.transient {
        match fs
            .retrier()
            .once(|| fs.backends().get(*role).remove(path))
        {
            Ok(()) => transient_removed += 1,
            Err(err) => warn!("failed to remove transient file '{}': {}", path, err),
        }
    }

    let mut report = Report::new("broken-object cleanup".to_owned());
    report.field("objects scanned", census.objects.len());
    report.field("broken objects", broken);
    report.field("particles removed", removed);
    report.field("transient files removed", transient_removed);
    report.field("foreign files ignored", census.foreign.len());
    Ok(report.to_string())
}
