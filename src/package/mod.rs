//! Package identities, versions and the name filter.
//!
//! - [`PackageIdentity`]: name + version of one archive, parsed from
//!   `<name>.<version>.nupkg` file names
//! - [`PackageVersion`]: normalized concrete version
//! - [`compare_versions`]: natural ordering used to find the newest version
//!   directory in a cache
//! - [`PackageFilter`]: the package namespace a run is interested in

mod identity;
mod version;

pub use identity::{ARCHIVE_EXTENSION, PackageIdentity};
pub use version::{PackageVersion, VersionKey, compare_versions};

/// Case-insensitive package name prefix.
///
/// An empty prefix matches every package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    prefix: String,
}

impl PackageFilter {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.as_ref().trim().to_lowercase(),
        }
    }

    /// A filter that accepts everything
    pub fn any() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, name: &str) -> bool {
        self.prefix.is_empty() || name.to_lowercase().starts_with(&self.prefix)
    }
}
