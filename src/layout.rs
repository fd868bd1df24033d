/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;
use std::str::FromStr;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::path::ObjectPath;

/// Suffix of the parity particle when the object length is even.
pub const PARITY_SUFFIX_EVEN_LENGTH: &str = ".parity-el";
/// Suffix of the parity particle when the object length is odd.
pub const PARITY_SUFFIX_ODD_LENGTH: &str = ".parity-ol";

/// Which of the three particles a byte stream is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Even,
    Odd,
    Parity,
}

pub const ROLES: [Role; 3] = [Role::Even, Role::Odd, Role::Parity];

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Even => write!(f, "even"),
            Role::Odd => write!(f, "odd"),
            Role::Parity => write!(f, "parity"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "even" => Ok(Role::Even),
            "odd" => Ok(Role::Odd),
            "parity" => Ok(Role::Parity),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Name of the parity particle for a logical object.
///
/// The suffix is the only record of whether the object length was odd,
/// and reconstruction is impossible without it.
pub fn parity_name(remote: &ObjectPath, odd_length: bool) -> ObjectPath {
    let suffix = if odd_length {
        PARITY_SUFFIX_ODD_LENGTH
    } else {
        PARITY_SUFFIX_EVEN_LENGTH
    };
    remote.with_name(&format!("{}{}", remote.name(), suffix))
}

/// Splits a particle name into (base name, is_parity, odd_length).
///
/// Names without a parity suffix are not parity particles and pass
/// through listings unchanged.
pub fn strip_parity_suffix(name: &str) -> (&str, bool, bool) {
    if let Some(base) = name.strip_suffix(PARITY_SUFFIX_ODD_LENGTH) {
        (base, true, true)
    } else if let Some(base) = name.strip_suffix(PARITY_SUFFIX_EVEN_LENGTH) {
        (base, true, false)
    } else {
        (name, false, false)
    }
}

/// Patterns of transient names that must never surface in listings:
/// leftovers of interrupted update rollbacks.
pub fn transient_name_patterns() -> RegexSet {
    RegexSet::new([r"\.tmp\.(even|odd|parity)$"]).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_name_suffixes() {
        let remote = ObjectPath::new("dir/hello.txt");
        assert_eq!(
            "dir/hello.txt.parity-ol",
            parity_name(&remote, true).as_str()
        );
        assert_eq!(
            "dir/hello.txt.parity-el",
            parity_name(&remote, false).as_str()
        );
    }

    #[test]
    fn test_strip_roundtrip() {
        for remote in ["hello.txt", "a/b/c.bin", "no-extension"] {
            for odd_length in [true, false] {
                let name = parity_name(&ObjectPath::new(remote), odd_length);
                let (base, is_parity, flag) = strip_parity_suffix(name.name());
                assert_eq!(ObjectPath::new(remote).name(), base);
                assert!(is_parity);
                assert_eq!(odd_length, flag);
            }
        }
    }

    #[test]
    fn test_strip_passthrough() {
        let (base, is_parity, odd_length) = strip_parity_suffix("plain.txt");
        assert_eq!("plain.txt", base);
        assert!(!is_parity);
        assert!(!odd_length);
    }

    #[test]
    fn test_transient_names() {
        let patterns = transient_name_patterns();
        assert!(patterns.is_match("report.pdf.tmp.even"));
        assert!(patterns.is_match("report.pdf.tmp.odd"));
        assert!(patterns.is_match("report.pdf.tmp.parity"));
        assert!(!patterns.is_match("report.pdf"));
        assert!(!patterns.is_match("report.pdf.parity-el"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Ok(Role::Even), "even".parse());
        assert_eq!(Ok(Role::Parity), "parity".parse());
        assert!("raid".parse::<Role>().is_err());
    }
}
