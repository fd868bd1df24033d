/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Ok};
use args::{Args, Mode};
use backend::local::LocalBackend;
use backend::{BackendSet, Entry};
use clap::Parser;
use config::Config;
use log::{error, info};
use path::ObjectPath;
use vfs::{HashType, ReadRange, TripleFs};

mod admin;
mod args;
mod backend;
mod codec;
mod config;
mod heal;
mod health;
mod layout;
mod path;
mod report;
mod retry;
mod vfs;

#[cfg(test)]
mod testutil;

fn main() {
    let status = run();
    if let Err(ref err) = status {
        error!("{:?}", err);
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    log4rs::init_file("log4rs.yml", Default::default()).with_context(|| "failed to init logger")?;
    info!("init logger");

    info!("read configuration");
    let config = fs::read_to_string(&args.config_path)
        .with_context(|| format!("failed to read configuration file '{}'", args.config_path))?;
    let config: Config =
        toml::from_str(&config).with_context(|| "failed to parse configuration")?;

    let backends = BackendSet::new(
        Arc::new(LocalBackend::new("even", Path::new(&config.even))),
        Arc::new(LocalBackend::new("odd", Path::new(&config.odd))),
        Arc::new(LocalBackend::new("parity", Path::new(&config.parity))),
    );
    let fs = TripleFs::create(&config.fs_name, backends, config.fs_options())
        .with_context(|| format!("failed to open filesystem '{}'", config.fs_name))?;

    let status = dispatch(&fs, args.mode);
    fs.shutdown_default();
    status
}

fn dispatch(fs: &Arc<TripleFs>, mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Status { json } => {
            let report = if json {
                admin::status::run_json(fs)?
            } else {
                admin::status::run(fs)?
            };
            println!("{}", report);
        }
        Mode::Rebuild {
            role,
            check_only,
            dry_run,
            priority,
        } => {
            let mut opts = HashMap::new();
            opts.insert("check-only".to_owned(), check_only.to_string());
            opts.insert("dry-run".to_owned(), dry_run.to_string());
            opts.insert("priority".to_owned(), priority);
            let args: Vec<String> = role.into_iter().collect();
            println!("{}", admin::run(fs, "rebuild", &args, &opts)?);
        }
        Mode::Heal => println!("{}", admin::run(fs, "heal", &[], &HashMap::new())?),
        Mode::Cleanup => println!("{}", admin::run(fs, "cleanup", &[], &HashMap::new())?),
        Mode::Put { local, remote } => {
            let data = std::fs::read(&local)
                .with_context(|| format!("failed to read local file '{}'", local))?;
            let mtime = std::fs::metadata(&local)
                .and_then(|meta| meta.modified())
                .unwrap_or_else(|_| SystemTime::now());
            let remote = ObjectPath::new(&remote);
            if fs.probe_particles(&remote).present_count() > 0 {
                fs.update(&remote, &data, mtime)?;
            } else {
                fs.put(&remote, &data, mtime)?;
            }
            info!("uploaded '{}' ({} bytes)", remote, data.len());
        }
        Mode::Cat {
            remote,
            offset,
            end,
        } => {
            let object = fs.new_object(&ObjectPath::new(&remote))?;
            let range = match (offset, end) {
                (None, None) => ReadRange::All,
                (Some(start), None) => ReadRange::From(start),
                (start, Some(end)) => ReadRange::Bounded(start.unwrap_or(0), end),
            };
            let data = object.open(range)?;
            std::io::stdout()
                .write_all(&data)
                .with_context(|| "failed to write to stdout")?;
        }
        Mode::Ls { dir } => {
            let dir = ObjectPath::new(&dir.unwrap_or_default());
            for entry in fs.list(&dir)? {
                match entry {
                    Entry::File(file) => println!("{:>12}  {}", file.size, file.path),
                    Entry::Dir(sub) => println!("{:>12}  {}/", "-", sub.path),
                }
            }
        }
        Mode::Rm { remote } => fs.remove(&ObjectPath::new(&remote))?,
        Mode::Mv { src, dst } => {
            fs.move_object(&ObjectPath::new(&src), &ObjectPath::new(&dst))?
        }
        Mode::Mkdir { dir } => fs.mkdir(&ObjectPath::new(&dir))?,
        Mode::Rmdir { dir } => fs.rmdir(&ObjectPath::new(&dir))?,
        Mode::Hash { remote, hash_type } => {
            let hash_type: HashType = hash_type.parse().map_err(anyhow::Error::msg)?;
            let object = fs.new_object(&ObjectPath::new(&remote))?;
            println!("{:016x}  {}", object.hash(hash_type)?, remote);
        }
    }
    Ok(())
}
