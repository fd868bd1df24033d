/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

/// Prefix for temporary test directories
const TMP_DIR_PREFIX: &str = "raid3fs-test";

/// Creates a fresh unique temporary directory for one test.
pub fn temp_root(name: &str) -> PathBuf {
    let tag: u32 = rand::thread_rng().gen();
    let path = Path::new("/tmp").join(format!("{}-{}-{:08x}", TMP_DIR_PREFIX, name, tag));
    fs::create_dir_all(&path).unwrap();
    path
}
