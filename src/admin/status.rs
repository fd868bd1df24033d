/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use super::census;
use crate::layout::{Role, ROLES};
use crate::report::Report;
use crate::vfs::TripleFs;

#[derive(Serialize)]
pub struct BackendStatus {
    pub role: Role,
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub particles: usize,
    pub bytes: u64,
}

#[derive(Serialize)]
pub struct StatusReport {
    pub filesystem: String,
    pub overall: String,
    pub backends: Vec<BackendStatus>,
}

pub fn collect(fs: &Arc<TripleFs>) -> StatusReport {
    let health = fs.health();
    let census = census(fs);

    let backends = ROLES
        .iter()
        .enumerate()
        .map(|(slot, role)| {
            let status = health.status(*role);
            BackendStatus {
                role: *role,
                name: status.name.clone(),
                available: status.available,
                detail: status.detail.clone(),
                particles: census.counts[slot].0,
                bytes: census.counts[slot].1,
            }
        })
        .collect();

    StatusReport {
        filesystem: fs.name().to_owned(),
        overall: if health.all_available() {
            "HEALTHY".to_owned()
        } else {
            "DEGRADED".to_owned()
        },
        backends,
    }
}

pub fn run(fs: &Arc<TripleFs>) -> anyhow::Result<String> {
    let status = collect(fs);
    let mut report = Report::new(format!("'{}' backend status", status.filesystem));

    for backend in &status.backends {
        report.heading(format!("{} backend '{}'", backend.role, backend.name));
        report.field(
            "available",
            match &backend.detail {
                Some(detail) if !backend.available => format!("no ({})", detail),
                _ => "yes".to_owned(),
            },
        );
        report.field("particles", backend.particles);
        report.field("bytes", backend.bytes);
        report.blank();
    }

    report.field("overall", &status.overall);
    if status.overall == "DEGRADED" {
        let failed: Vec<String> = status
            .backends
            .iter()
            .filter(|b| !b.available)
            .map(|b| b.role.to_string())
            .collect();
        report.blank();
        report.heading("recovery guide".to_owned());
        report.line(format!(
            "the {} backend is unavailable; reads keep working with the \
             remaining two, writes are refused",
            failed.join(" and ")
        ));
        report.line("1. replace the failed store (a fresh empty one is fine)".to_owned());
        for role in &failed {
            report.line(format!(
                "2. run 'rebuild {}' to regenerate its particles from the peers",
                role
            ));
        }
        report.line("3. re-run 'status' and confirm the overall state is HEALTHY".to_owned());
    }
    Ok(report.to_string())
}

pub fn run_json(fs: &Arc<TripleFs>) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&collect(fs)).with_context(|| "failed to serialize status report")
}
