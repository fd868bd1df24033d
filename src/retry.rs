/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::backend::BackendResult;

/// Coarse preset configuring the low-level behaviour of the underlying
/// stores: retry count, connect timeout, operation timeout.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    #[default]
    Standard,
    Balanced,
    Aggressive,
}

#[derive(Clone, Copy, Debug)]
pub struct TimeoutProfile {
    pub low_level_retries: u32,
    pub connect_timeout: Duration,
    pub op_timeout: Duration,
}

impl TimeoutMode {
    pub fn profile(self) -> TimeoutProfile {
        match self {
            TimeoutMode::Standard => TimeoutProfile {
                low_level_retries: 10,
                connect_timeout: Duration::from_secs(60),
                op_timeout: Duration::from_secs(300),
            },
            TimeoutMode::Balanced => TimeoutProfile {
                low_level_retries: 5,
                connect_timeout: Duration::from_secs(30),
                op_timeout: Duration::from_secs(60),
            },
            TimeoutMode::Aggressive => TimeoutProfile {
                low_level_retries: 1,
                connect_timeout: Duration::from_secs(5),
                op_timeout: Duration::from_secs(5),
            },
        }
    }
}

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Low-level retry wrapper around backend calls.
///
/// Read-family operations go through [`Retrier::run`] and get the
/// preset's retry budget. Every mutating operation goes through
/// [`Retrier::once`]: a write must surface its first failure, because a
/// retried partial success could complete a write into a corrupt
/// logical object.
#[derive(Clone, Copy, Debug)]
pub struct Retrier {
    retries: u32,
}

impl Retrier {
    pub fn new(mode: TimeoutMode) -> Self {
        Self {
            retries: mode.profile().low_level_retries,
        }
    }

    pub fn run<T>(&self, what: &str, mut f: impl FnMut() -> BackendResult<T>) -> BackendResult<T> {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "retrying {} after transient failure (attempt {}/{}): {}",
                        what, attempt, self.retries, err
                    );
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn once<T>(&self, f: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::path::ObjectPath;

    fn transient() -> BackendError {
        BackendError::Io {
            path: ObjectPath::new("x"),
            message: "connection reset".to_owned(),
        }
    }

    #[test]
    fn test_run_retries_transient() {
        let retrier = Retrier::new(TimeoutMode::Balanced);
        let mut calls = 0;
        let result: BackendResult<u32> = retrier.run("probe", || {
            calls += 1;
            if calls < 3 { Err(transient()) } else { Ok(7) }
        });
        assert_eq!(Ok(7), result);
        assert_eq!(3, calls);
    }

    #[test]
    fn test_run_gives_up_on_definite_answer() {
        let retrier = Retrier::new(TimeoutMode::Standard);
        let mut calls = 0;
        let missing = ObjectPath::new("gone");
        let result: BackendResult<u32> = retrier.run("probe", || {
            calls += 1;
            Err(BackendError::ObjectNotFound(missing.clone()))
        });
        assert_eq!(Err(BackendError::ObjectNotFound(missing)), result);
        assert_eq!(1, calls);
    }

    #[test]
    fn test_once_never_retries() {
        let retrier = Retrier::new(TimeoutMode::Standard);
        let result: BackendResult<u32> = retrier.once(|| Err(transient()));
        assert!(result.is_err());
    }
}
