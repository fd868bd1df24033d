/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;

/// Remote-relative path of a logical object or directory.
///
/// Always stored normalized: forward-slash separators, no leading or
/// trailing slash. The root directory is the empty path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ObjectPath {
    base: String,
}

impl ObjectPath {
    pub fn root() -> Self {
        Self {
            base: String::new(),
        }
    }

    pub fn new(path: &str) -> Self {
        let mut base = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !base.is_empty() {
                base.push('/');
            }
            base.push_str(segment);
        }
        Self { base }
    }

    pub fn join(&self, name: &str) -> Self {
        if self.base.is_empty() {
            Self::new(name)
        } else {
            Self::new(&format!("{}/{}", self.base, name))
        }
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.base.is_empty() {
            return None;
        }
        match self.base.rfind('/') {
            Some(idx) => Some(Self {
                base: self.base[..idx].to_owned(),
            }),
            None => Some(Self::root()),
        }
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        match self.base.rfind('/') {
            Some(idx) => &self.base[idx + 1..],
            None => &self.base,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub fn is_root(&self) -> bool {
        self.base.is_empty()
    }

    /// Replaces the last path segment.
    pub fn with_name(&self, name: &str) -> Self {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Self::new(name),
        }
    }
}

impl Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)
    }
}
