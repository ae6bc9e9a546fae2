use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use super::version::PackageVersion;

/// File extension of package archives
pub const ARCHIVE_EXTENSION: &str = "nupkg";

/// Name + version of one package archive.
///
/// The canonical form `name.version` is both the deduplication key and the
/// archive file stem. Equality and hashing ignore case, matching how NuGet
/// treats package ids.
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    name: String,
    version: PackageVersion,
    canonical: String,
    key: String,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: PackageVersion) -> Self {
        let name = name.into();
        let canonical = format!("{name}.{version}");
        let key = canonical.to_lowercase();
        Self {
            name,
            version,
            canonical,
            key,
        }
    }

    /// Parse an archive file name of the form `<name>.<version>.nupkg`.
    ///
    /// The version must have at least three numeric groups and may carry a
    /// `-label`. Returns `None` for anything else.
    pub fn from_archive_name(file_name: &str) -> Option<Self> {
        static ARCHIVE_NAME_RE: OnceLock<Regex> = OnceLock::new();

        let re = ARCHIVE_NAME_RE.get_or_init(|| {
            Regex::new(r"(?i)^(.+?)\.([0-9]+(?:\.[0-9]+){2,}(?:-[0-9a-z][0-9a-z.-]*)?)\.nupkg$")
                .expect("archive name regex should compile")
        });
        let captures = re.captures(file_name)?;
        let version = PackageVersion::parse(&captures[2])?;

        Some(Self::new(&captures[1], version))
    }

    /// Parse the file name component of `path`.
    pub fn from_archive_path(path: &Path) -> Option<Self> {
        Self::from_archive_name(path.file_name()?.to_str()?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// `name.version` with the declared casing
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Lower-cased canonical form, used for set membership
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `name.version.nupkg`
    pub fn archive_file_name(&self) -> String {
        format!("{}.{ARCHIVE_EXTENSION}", self.canonical)
    }

    /// Where this archive may live inside a cache root.
    ///
    /// The declared casing comes first. The NuGet global-packages folder
    /// stores everything lower-cased, so that layout is tried second.
    pub fn cache_candidates(&self, cache_root: &Path) -> Vec<PathBuf> {
        let version = self.version.to_string();
        let declared = cache_root
            .join(&self.name)
            .join(&version)
            .join(self.archive_file_name());
        let lowered = cache_root
            .join(self.name.to_lowercase())
            .join(version.to_lowercase())
            .join(format!("{}.{ARCHIVE_EXTENSION}", self.key));

        if declared == lowered {
            vec![declared]
        } else {
            vec![declared, lowered]
        }
    }

    /// The best-known spelling of this package.
    ///
    /// An identity parsed from a file name whose id is all lower case came
    /// from the global-packages layout, which drops the real casing, so the
    /// spelling of `declared` is used instead when both name the same
    /// package.
    pub fn respelled(&self, declared: &PackageIdentity) -> PackageIdentity {
        if self == declared && self.name == self.name.to_lowercase() {
            declared.clone()
        } else {
            self.clone()
        }
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
