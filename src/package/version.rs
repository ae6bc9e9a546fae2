//! Package versions and the natural ordering used to pick the newest one.

use std::cmp::Ordering;
use std::fmt;

/// A concrete package version: dot-separated numeric components with an
/// optional pre-release label (`1.2.3`, `4.0.1-beta.2`).
///
/// Versions are kept in NuGet's normalized form so that a version declared
/// in a manifest and the version parsed back out of the archive file name
/// produce the same canonical string:
///
/// - fewer than three components are padded with zeros (`1.0` -> `1.0.0`)
/// - a zero fourth component is dropped (`1.0.0.0` -> `1.0.0`)
/// - leading zeros disappear (`1.02.0` -> `1.2.0`)
/// - build metadata (`+sha.abc`) is ignored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageVersion {
    components: Vec<u64>,
    label: Option<String>,
}

impl PackageVersion {
    /// Parse a version string, returning `None` unless it is one concrete
    /// version.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.split_once('+').map_or(s, |(version, _metadata)| version);

        let (core, label) = match s.split_once('-') {
            Some((core, label)) => {
                let valid = !label.is_empty()
                    && label
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
                if !valid {
                    return None;
                }
                (core, Some(label.to_string()))
            }
            None => (s, None),
        };

        let mut components = Vec::new();
        for part in core.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            components.push(part.parse::<u64>().ok()?);
        }

        while components.len() < 3 {
            components.push(0);
        }
        if components.len() == 4 && components[3] == 0 {
            components.pop();
        }

        Some(Self { components, label })
    }

    /// Numeric components, already normalized
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Pre-release label, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        if let Some(label) = &self.label {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

/// Compare two version-like names (`1.10.0`, `2.0.0-beta`, `v3`) so that
/// numerically larger components sort as newer regardless of their width.
///
/// Strings are split into segments at every non-alphanumeric character.
/// Segments are compared pairwise:
///
/// - two numeric segments compare as unbounded integers
/// - two text segments compare case-insensitively
/// - a numeric segment sorts before a text segment
///
/// If one sequence is a prefix of the other the shorter one sorts first.
/// Strings that are still tied (`1.01` vs `1.1`, `A` vs `a`) fall back to
/// ordinal order, which keeps this a strict total order usable as a sort key.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = segments(a);
    let mut right = segments(b);

    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => match compare_segments(l, r) {
                Ordering::Equal => continue,
                other => return other,
            },
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return a.cmp(b),
        }
    }
}

/// A borrowed name ordered by [`compare_versions`].
///
/// Handy with `max_by_key` over borrowed names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionKey<'a>(pub &'a str);

impl Ord for VersionKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(self.0, other.0)
    }
}

impl PartialOrd for VersionKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn segments(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|segment| !segment.is_empty())
}

fn is_numeric(segment: &str) -> bool {
    segment.bytes().all(|b| b.is_ascii_digit())
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

// Digit strings of any length, so oversized components cannot overflow.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
