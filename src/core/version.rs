//! Package version records and ordering
//!
//! Versions follow the pacman `[epoch:]version[-release]` form and are
//! ordered with the same segment rules as pacman's `vercmp`:
//! - epoch dominates, then version, then release
//! - versions are split into runs of digits or letters, separators ignored
//! - numeric runs compare numerically, a numeric run beats an alphabetic one
//! - a leftover alphabetic run is older (`2rc < 2`), a leftover numeric run newer

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::VersionError;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?P<epoch>\d+)[:~])?(?P<version>[A-Za-z0-9][^\s:-]*)(?:-(?P<release>\d+))?$")
            .expect("Invalid version regex")
    })
}

/// Canonical version of a package: epoch, upstream version and package release
///
/// A release of `0` means the raw string carried no release component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRecord {
    /// Epoch, overrides any version ordering when different
    pub epoch: u64,
    /// Upstream version string
    pub version: String,
    /// Package release number
    pub release: u32,
}

impl VersionRecord {
    /// Create a record from its parts
    pub fn new(epoch: u64, version: impl Into<String>, release: u32) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }

    /// Parse a raw `[epoch:]version[-release]` string
    ///
    /// The legacy `epoch~version-release` spelling is accepted as well.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::MalformedVersion` when the string does not
    /// decompose into epoch, version and release.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(malformed(raw, "empty version"));
        }

        let caps = version_regex()
            .captures(trimmed)
            .ok_or_else(|| malformed(raw, "expected [epoch:]version[-release]"))?;

        let epoch = match caps.name("epoch") {
            Some(m) => m
                .as_str()
                .parse::<u64>()
                .map_err(|e| malformed(raw, &format!("invalid epoch: {e}")))?,
            None => 0,
        };

        let release = match caps.name("release") {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .map_err(|e| malformed(raw, &format!("invalid release: {e}")))?,
            None => 0,
        };

        Ok(Self {
            epoch,
            version: caps["version"].to_string(),
            release,
        })
    }

    /// Whether this record carries an explicit release
    pub fn has_release(&self) -> bool {
        self.release > 0
    }
}

fn malformed(raw: &str, reason: &str) -> VersionError {
    VersionError::MalformedVersion {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Compare two version records
///
/// Total order: epoch, then version segments, then release.
pub fn compare(a: &VersionRecord, b: &VersionRecord) -> Ordering {
    a.epoch
        .cmp(&b.epoch)
        .then_with(|| compare_version_strings(&a.version, &b.version))
        .then_with(|| a.release.cmp(&b.release))
}

/// A package is stale when its local record is behind the reference
pub fn is_stale(local: &VersionRecord, reference: &VersionRecord) -> bool {
    compare(local, reference) == Ordering::Less
}

/// Compare two raw version strings like pacman's `vercmp`
///
/// # Errors
///
/// Returns `VersionError::MalformedVersion` if either side fails to parse.
pub fn vercmp(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(compare(&VersionRecord::parse(a)?, &VersionRecord::parse(b)?))
}

/// Segment-wise comparison of the version part
///
/// Trailing separators are ignored (`1.0.` equals `1.0`); pacman ranks
/// them above the bare version, which breaks transitivity.
pub fn compare_version_strings(a: &str, b: &str) -> Ordering {
    let mut one = trim_trailing_separators(a.as_bytes());
    let mut two = trim_trailing_separators(b.as_bytes());
    if one == two {
        return Ordering::Equal;
    }

    while !one.is_empty() && !two.is_empty() {
        let one_sep = leading_separators(one);
        let two_sep = leading_separators(two);
        one = &one[one_sep..];
        two = &two[two_sep..];

        if one.is_empty() || two.is_empty() {
            break;
        }

        if one_sep != two_sep {
            return one_sep.cmp(&two_sep);
        }

        let numeric = one[0].is_ascii_digit();
        let one_len = segment_len(one, numeric);
        let two_len = segment_len(two, numeric);

        // Segment types differ: numbers are newer than letters
        if two_len == 0 {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let (seg_one, seg_two) = (&one[..one_len], &two[..two_len]);
        let ord = if numeric {
            compare_numeric(seg_one, seg_two)
        } else {
            seg_one.cmp(seg_two)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        one = &one[one_len..];
        two = &two[two_len..];
    }

    if one.is_empty() && two.is_empty() {
        return Ordering::Equal;
    }

    // A remaining alphabetic run never beats an empty string
    if (one.is_empty() && !two[0].is_ascii_alphabetic())
        || (!one.is_empty() && one[0].is_ascii_alphabetic())
    {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn trim_trailing_separators(s: &[u8]) -> &[u8] {
    let end = s
        .iter()
        .rposition(u8::is_ascii_alphanumeric)
        .map_or(0, |i| i + 1);
    &s[..end]
}

fn leading_separators(s: &[u8]) -> usize {
    s.iter().take_while(|c| !c.is_ascii_alphanumeric()).count()
}

fn segment_len(s: &[u8], numeric: bool) -> usize {
    s.iter()
        .take_while(|c| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        })
        .count()
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_zeros(a);
    let b = strip_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_zeros(s: &[u8]) -> &[u8] {
    let zeros = s.iter().take_while(|c| **c == b'0').count();
    &s[zeros..]
}

/// Key that is equal exactly when two version strings compare equal
fn canonical_segments(version: &str) -> Vec<(usize, bool, &[u8])> {
    let mut rest = trim_trailing_separators(version.as_bytes());
    let mut segments = Vec::new();
    loop {
        let sep = leading_separators(rest);
        rest = &rest[sep..];
        if rest.is_empty() {
            return segments;
        }
        let numeric = rest[0].is_ascii_digit();
        let len = segment_len(rest, numeric);
        let seg = if numeric {
            strip_zeros(&rest[..len])
        } else {
            &rest[..len]
        };
        segments.push((sep, numeric, seg));
        rest = &rest[len..];
    }
}

impl PartialEq for VersionRecord {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for VersionRecord {}

impl PartialOrd for VersionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl Hash for VersionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        canonical_segments(&self.version).hash(state);
        self.release.hash(state);
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if self.has_release() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl FromStr for VersionRecord {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRecord {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRecord> for String {
    fn from(record: VersionRecord) -> Self {
        record.to_string()
    }
}
