/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use super::{census, rebuild::restore_particle};
use crate::path::ObjectPath;
use crate::report::Report;
use crate::vfs::{ObjectState, TripleFs};

/// Walks the full namespace and synchronously restores every object
/// that is missing exactly one particle.
pub fn run(fs: &Arc<TripleFs>) -> anyhow::Result<String> {
    let started = Instant::now();
    let census = census(fs);

    let mut healthy = 0usize;
    let mut healed = 0usize;
    let mut unrecoverable: Vec<ObjectPath> = Vec::new();
    for (remote, particles) in &census.objects {
        match particles.state() {
            ObjectState::Healthy => healthy += 1,
            ObjectState::Degraded(missing) => {
                match restore_particle(fs, missing, remote, particles) {
                    Ok(written) => {
                        info!(
                            "healed {} particle of '{}' ({} bytes)",
                            missing, remote, written
                        );
                        healed += 1;
                    }
                    Err(reason) => {
                        warn!("cannot heal '{}': {}", remote, reason);
                        unrecoverable.push(remote.clone());
                    }
                }
            }
            ObjectState::Broken => unrecoverable.push(remote.clone()),
        }
    }

    let mut report = Report::new("namespace heal".to_owned());
    report.field("scanned", census.objects.len());
    report.field("healthy", healthy);
    report.field("healed", healed);
    report.field("unrecoverable", unrecoverable.len());
    for remote in &unrecoverable {
        report.line(format!("  {}", remote));
    }
    report.field("elapsed", format!("{:.2?}", started.elapsed()));
    Ok(report.to_string())
}
