//! Daemon version parsing
//!
//! `SHOW STATUS LIKE 'version'` returns one composite string such as
//! `6.0.4 1a3a4ea82@230314 (columnar 2.0.4 5a49bd7@230306) (secondary 2.0.4 5a49bd7@230306)`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Oldest searchd release that supports FREEZE
pub const MIN_VERSION: &str = "5.0.2";

/// Development builds dated on or after this (YYMMDD) are accepted as well
pub const MIN_DATE: &str = "220530";

/// Placeholder for a component that did not report a version
pub const UNKNOWN_VERSION: &str = "0.0.0";

/// Versions of the daemon and its extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub manticore: String,
    pub columnar: String,
    pub secondary: String,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let ver = r"(\d+\.\d+\.\d+[^()]*)";
        Regex::new(&format!(
            r"(?is)^{ver}(\(columnar\s{ver}\))?([^(]*\(secondary\s{ver}\))?"
        ))
        .expect("version pattern is valid")
    })
}

impl VersionInfo {
    /// Parse the composite status string; missing parts become "0.0.0"
    pub fn parse(status: &str) -> Self {
        let caps = version_regex().captures(status.trim());
        let group = |idx: usize| {
            caps.as_ref()
                .and_then(|c| c.get(idx))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
        };

        Self {
            manticore: group(1),
            columnar: group(3),
            secondary: group(5),
        }
    }

    /// Semantic part of the engine version (before the first space)
    pub fn engine_number(&self) -> &str {
        self.manticore
            .split_whitespace()
            .next()
            .unwrap_or(UNKNOWN_VERSION)
    }

    /// Build date from an `@YYMMDD` suffix of the engine version
    ///
    /// Anything but exactly six digits is not a build date.
    pub fn engine_build_date(&self) -> Option<&str> {
        let (_, tail) = self.manticore.split_once('@')?;
        let end = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        let date = &tail[..end];
        (date.len() == MIN_DATE.len()).then_some(date)
    }

    /// Fail unless the engine is new enough by version or by build date
    pub fn ensure_supported(&self) -> Result<()> {
        let number = self.engine_number();
        let too_old = || Error::Version {
            found: self.manticore.clone(),
            minimum: MIN_VERSION.to_string(),
        };

        let Some(cmp) = compare_versions(number, MIN_VERSION) else {
            return Err(too_old());
        };
        if number == UNKNOWN_VERSION {
            return Err(too_old());
        }
        if cmp != Ordering::Less {
            return Ok(());
        }

        match self.engine_build_date() {
            Some(date) if date >= MIN_DATE => Ok(()),
            _ => Err(too_old()),
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "manticore: {}, columnar: {}, secondary: {}",
            self.manticore, self.columnar, self.secondary
        )
    }
}

/// Compare dotted numeric versions; `None` if either is not numeric
fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.split('.').map(|p| p.parse::<u64>().ok()).collect()
    };
    let (a, b) = (parse(a)?, parse(b)?);
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}
