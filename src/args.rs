/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file in TOML format
    #[arg(long, default_value_t = String::from("./config.toml"))]
    pub config_path: String,

    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, PartialEq, Clone, Subcommand)]
#[clap(rename_all = "kebab_case")]
pub enum Mode {
    /// Report per-backend health and overall state
    Status {
        /// Emit the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Regenerate the particles of a fresh or wiped backend
    Rebuild {
        /// Backend to rebuild (even, odd or parity); auto-detected when omitted
        role: Option<String>,
        /// Analyse only, do not plan or write
        #[arg(long, default_value_t = false)]
        check_only: bool,
        /// Emit the plan, do not write
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Work ordering: auto, dirs-small, dirs or small
        #[arg(long, default_value_t = String::from("auto"))]
        priority: String,
    },
    /// Synchronously restore all objects missing one particle
    Heal,
    /// Delete unreadable leftovers: broken objects and transient files
    Cleanup,
    /// Upload a local file
    Put {
        /// Local file to upload
        local: String,
        /// Destination object path
        remote: String,
    },
    /// Write an object to stdout
    Cat {
        remote: String,
        /// Start offset of a range read
        #[arg(long)]
        offset: Option<u64>,
        /// Inclusive end of a range read
        #[arg(long)]
        end: Option<u64>,
    },
    /// List a directory
    Ls {
        dir: Option<String>,
    },
    /// Delete an object
    Rm {
        remote: String,
    },
    /// Move an object
    Mv {
        src: String,
        dst: String,
    },
    /// Create a directory
    Mkdir {
        dir: String,
    },
    /// Remove a directory
    Rmdir {
        dir: String,
    },
    /// Print the hash of an object
    Hash {
        remote: String,
        /// Hash type: xxh64 or xxh3
        #[arg(long, default_value_t = String::from("xxh64"))]
        hash_type: String,
    },
}
