/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

use crate::heal::DEFAULT_WORKERS;
use crate::retry::TimeoutMode;
use crate::vfs::FsOptions;

#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    /// Name of the logical filesystem
    pub fs_name: String,
    /// Root of the store holding the even-index bytes
    pub even: String,
    /// Root of the store holding the odd-index bytes
    pub odd: String,
    /// Root of the store holding the XOR parity stream
    pub parity: String,
    /// Retry/timeout preset for the underlying stores
    #[serde(default)]
    pub timeout_mode: TimeoutMode,
    /// Hide broken objects from listings and remove orphaned directories
    #[serde(default = "default_true")]
    pub auto_cleanup: bool,
    /// Restore missing particles discovered by reads and listings
    #[serde(default = "default_true")]
    pub auto_heal: bool,
    /// Worker threads uploading self-heal particles
    #[serde(default = "default_heal_workers")]
    pub heal_workers: usize,
}

fn default_true() -> bool {
    true
}

fn default_heal_workers() -> usize {
    DEFAULT_WORKERS
}

impl Config {
    pub fn fs_options(&self) -> FsOptions {
        FsOptions {
            timeout_mode: self.timeout_mode,
            auto_cleanup: self.auto_cleanup,
            auto_heal: self.auto_heal,
            heal_workers: self.heal_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(
            r#"
fs_name = "raid3"
even = "/srv/raid3/even"
odd = "/srv/raid3/odd"
parity = "/srv/raid3/parity"
"#,
        )
        .unwrap();
        assert_eq!(TimeoutMode::Standard, config.timeout_mode);
        assert!(config.auto_cleanup);
        assert!(config.auto_heal);
        assert_eq!(DEFAULT_WORKERS, config.heal_workers);
    }

    #[test]
    fn test_overrides() {
        let config: Config = toml::from_str(
            r#"
fs_name = "raid3"
even = "/a"
odd = "/b"
parity = "/c"
timeout_mode = "aggressive"
auto_cleanup = false
heal_workers = 4
"#,
        )
        .unwrap();
        assert_eq!(TimeoutMode::Aggressive, config.timeout_mode);
        assert!(!config.auto_cleanup);
        assert!(config.auto_heal);
        assert_eq!(4, config.heal_workers);
    }
}
