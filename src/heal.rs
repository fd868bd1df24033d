/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::backend::{BackendResult, BackendSet};
use crate::layout::{parity_name, Role};
use crate::path::ObjectPath;

pub const QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_WORKERS: usize = 2;
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(60);

/// One missing particle to restore, with the bytes already derived by
/// the degraded read that discovered it.
pub struct HealJob {
    pub remote: ObjectPath,
    pub role: Role,
    pub payload: Vec<u8>,
    pub odd_length: bool,
    pub mtime: SystemTime,
}

impl HealJob {
    fn key(&self) -> (ObjectPath, Role) {
        (self.remote.clone(), self.role)
    }

    fn particle_name(&self) -> ObjectPath {
        match self.role {
            Role::Parity => parity_name(&self.remote, self.odd_length),
            Role::Even | Role::Odd => self.remote.clone(),
        }
    }
}

struct Shared {
    /// Keys currently queued or being uploaded; deduplicates offers.
    pending: Mutex<HashSet<(ObjectPath, Role)>>,
    outstanding: Mutex<usize>,
    drained: Condvar,
}

/// Background restorer of missing particles.
///
/// A bounded queue feeds a small set of worker threads. Offers carrying
/// a key already in flight are dropped; offers against a full queue are
/// dropped too, because the next degraded read of the same object will
/// re-derive and re-offer the particle.
pub struct Healer {
    tx: Mutex<Option<Sender<HealJob>>>,
    shared: Arc<Shared>,
}

impl Healer {
    pub fn start(backends: BackendSet, workers: usize) -> Self {
        let (tx, rx) = bounded::<HealJob>(QUEUE_CAPACITY);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashSet::new()),
            outstanding: Mutex::new(0),
            drained: Condvar::new(),
        });

        for worker in 0..workers {
            let rx: Receiver<HealJob> = rx.clone();
            let shared = Arc::clone(&shared);
            let backends = backends.clone();
            thread::spawn(move || {
                debug!("self-healing worker {} started", worker);
                for job in rx.iter() {
                    match upload(&backends, &job) {
                        Ok(()) => info!(
                            "restored {} particle of '{}' ({} bytes)",
                            job.role,
                            job.remote,
                            job.payload.len()
                        ),
                        Err(err) => {
                            // dropped, not retried: a later read of the same
                            // object re-derives the particle from backend state
                            warn!(
                                "failed to restore {} particle of '{}': {}",
                                job.role, job.remote, err
                            );
                        }
                    }
                    let key = job.key();
                    shared.pending.lock().unwrap().remove(&key);
                    let mut outstanding = shared.outstanding.lock().unwrap();
                    *outstanding -= 1;
                    if *outstanding == 0 {
                        shared.drained.notify_all();
                    }
                }
                debug!("self-healing worker {} stopped", worker);
            });
        }

        Self {
            tx: Mutex::new(Some(tx)),
            shared,
        }
    }

    /// Offers a job for background upload. Returns whether it was
    /// accepted; duplicates and full-queue offers are dropped.
    pub fn offer(&self, job: HealJob) -> bool {
        let key = job.key();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if !pending.insert(key.clone()) {
                debug!(
                    "{} particle of '{}' already queued for healing",
                    job.role, job.remote
                );
                return false;
            }
        }
        *self.shared.outstanding.lock().unwrap() += 1;

        let accepted = {
            let tx = self.tx.lock().unwrap();
            match tx.as_ref() {
                Some(tx) => match tx.try_send(job) {
                    Ok(()) => true,
                    Err(TrySendError::Full(job)) => {
                        warn!(
                            "self-healing queue full, dropping {} particle of '{}'",
                            job.role, job.remote
                        );
                        false
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                },
                None => false,
            }
        };
        if accepted {
            return true;
        }

        self.shared.pending.lock().unwrap().remove(&key);
        let mut outstanding = self.shared.outstanding.lock().unwrap();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.shared.drained.notify_all();
        }
        false
    }

    /// Closes the queue and waits for in-flight restores, up to `deadline`.
    ///
    /// Returns whether the queue drained completely.
    pub fn shutdown(&self, deadline: Duration) -> bool {
        if let Some(tx) = self.tx.lock().unwrap().take() {
            drop(tx);
        }

        let mut outstanding = self.shared.outstanding.lock().unwrap();
        if *outstanding == 0 {
            return true;
        }
        debug!("waiting for {} self-healing uploads", *outstanding);
        let (guard, timeout) = self
            .shared
            .drained
            .wait_timeout_while(outstanding, deadline, |outstanding| *outstanding > 0)
            .unwrap();
        outstanding = guard;
        if timeout.timed_out() {
            error!(
                "self-healing timed out: {} uploads still outstanding after {:?}",
                *outstanding, deadline
            );
            return false;
        }
        true
    }
}

fn upload(backends: &BackendSet, job: &HealJob) -> BackendResult<()> {
    let name = job.particle_name();
    backends.get(job.role).put(&name, &job.payload, job.mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::backend::Backend;
    use crate::testutil::temp_root;
    use std::fs;

    fn set(root: &std::path::Path) -> BackendSet {
        BackendSet::new(
            Arc::new(LocalBackend::new("even", &root.join("even"))),
            Arc::new(LocalBackend::new("odd", &root.join("odd"))),
            Arc::new(LocalBackend::new("parity", &root.join("parity"))),
        )
    }

    fn job(remote: &str, role: Role, payload: &[u8]) -> HealJob {
        HealJob {
            remote: ObjectPath::new(remote),
            role,
            payload: payload.to_vec(),
            odd_length: true,
            mtime: SystemTime::now(),
        }
    }

    #[test]
    fn test_restores_missing_particle() {
        let root = temp_root("heal-restore");
        let backends = set(&root);
        let healer = Healer::start(backends.clone(), DEFAULT_WORKERS);

        assert!(healer.offer(job("file.txt", Role::Odd, b"oddbytes")));
        assert!(healer.shutdown(DRAIN_DEADLINE));

        assert_eq!(
            b"oddbytes".to_vec(),
            backends.odd.open(&ObjectPath::new("file.txt"), None).unwrap()
        );
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_parity_restore_uses_suffix() {
        let root = temp_root("heal-parity");
        let backends = set(&root);
        let healer = Healer::start(backends.clone(), DEFAULT_WORKERS);

        assert!(healer.offer(job("file.txt", Role::Parity, b"pp")));
        assert!(healer.shutdown(DRAIN_DEADLINE));

        assert!(backends
            .parity
            .exists(&ObjectPath::new("file.txt.parity-ol"))
            .unwrap());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_duplicate_offers_dropped() {
        let root = temp_root("heal-dedup");
        // zero workers: jobs stay queued, the second offer must hit the
        // pending set
        let healer = Healer::start(set(&root), 0);
        assert!(healer.offer(job("dup.txt", Role::Even, b"aa")));
        assert!(!healer.offer(job("dup.txt", Role::Even, b"aa")));
        assert!(healer.offer(job("dup.txt", Role::Odd, b"bb")));
        assert!(!healer.shutdown(Duration::from_millis(50)));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_fast_shutdown_when_idle() {
        let root = temp_root("heal-idle");
        let healer = Healer::start(set(&root), DEFAULT_WORKERS);
        let started = std::time::Instant::now();
        assert!(healer.shutdown(DRAIN_DEADLINE));
        assert!(started.elapsed() < Duration::from_millis(100));
        fs::remove_dir_all(&root).unwrap();
    }
}
