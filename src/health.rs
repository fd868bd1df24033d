/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use log::{debug, warn};
use rand::Rng;

use crate::backend::{Backend, BackendError, BackendSet};
use crate::layout::{Role, ROLES};
use crate::path::ObjectPath;

pub const HEALTH_CHECK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct BackendHealth {
    pub role: Role,
    pub name: String,
    pub available: bool,
    /// Failure detail when unavailable.
    pub detail: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HealthReport {
    pub backends: Vec<BackendHealth>,
}

impl HealthReport {
    pub fn all_available(&self) -> bool {
        self.backends.iter().all(|b| b.available)
    }

    pub fn available_count(&self) -> usize {
        self.backends.iter().filter(|b| b.available).count()
    }

    pub fn failed_roles(&self) -> Vec<Role> {
        self.backends
            .iter()
            .filter(|b| !b.available)
            .map(|b| b.role)
            .collect()
    }

    pub fn status(&self, role: Role) -> &BackendHealth {
        self.backends
            .iter()
            .find(|b| b.role == role)
            .expect("report covers all roles")
    }
}

/// One status line per backend, each newline-terminated; error
/// messages wrap these lines with their own guidance.
impl Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for backend in &self.backends {
            match &backend.detail {
                Some(detail) if !backend.available => writeln!(
                    f,
                    "  {} backend '{}': UNAVAILABLE ({})",
                    backend.role, backend.name, detail
                )?,
                _ => writeln!(f, "  {} backend '{}': ok", backend.role, backend.name)?,
            }
        }
        Ok(())
    }
}

fn probe(backend: &Arc<dyn Backend>) -> Result<(), String> {
    match backend.list(&ObjectPath::root()) {
        Ok(_) => {}
        // an empty store or a root shadowed by a file still counts as reachable
        Err(BackendError::DirectoryNotFound(_)) | Err(BackendError::IsFile(_)) => {}
        Err(err) => return Err(err.to_string()),
    }

    let tag: u32 = rand::thread_rng().gen();
    let probe_dir = ObjectPath::new(&format!(".raid3fs-health-{:08x}", tag));
    match backend.mkdir(&probe_dir) {
        Ok(()) => {
            if let Err(err) = backend.rmdir(&probe_dir) {
                warn!("failed to remove probe directory '{}': {}", probe_dir, err);
            }
        }
        Err(BackendError::DirectoryExists(_)) => {}
        Err(err) => return Err(err.to_string()),
    }
    Ok(())
}

/// Probes all three backends in parallel with a short deadline.
///
/// A backend that does not answer before the deadline is reported
/// unavailable; its probe thread is left to finish on its own.
pub fn check_all_backends(backends: &BackendSet, deadline: Duration) -> HealthReport {
    let started = Instant::now();
    let (tx, rx) = unbounded();

    for role in ROLES {
        let backend = Arc::clone(backends.get(role));
        let tx = tx.clone();
        thread::spawn(move || {
            let result = probe(&backend);
            let _ = tx.send(BackendHealth {
                role,
                name: backend.to_string(),
                available: result.is_ok(),
                detail: result.err(),
            });
        });
    }
    drop(tx);

    let mut collected: Vec<BackendHealth> = Vec::with_capacity(3);
    let cutoff = started + deadline;
    while collected.len() < 3 {
        match rx.recv_deadline(cutoff) {
            Ok(health) => collected.push(health),
            Err(_) => break,
        }
    }

    for role in ROLES {
        if !collected.iter().any(|b| b.role == role) {
            collected.push(BackendHealth {
                role,
                name: backends.get(role).to_string(),
                available: false,
                detail: Some(format!(
                    "health check timed out after {:?}",
                    started.elapsed()
                )),
            });
        }
    }
    collected.sort_by_key(|b| ROLES.iter().position(|r| *r == b.role));

    let report = HealthReport {
        backends: collected,
    };
    debug!(
        "health check finished in {:?}: {}/3 available",
        started.elapsed(),
        report.available_count()
    );
    report
}
