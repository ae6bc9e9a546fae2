#![allow(dead_code)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::{env, fs};

use assert_fs::TempDir;
use assert_fs::prelude::*;
use nupkg_sync::error::{Result, SyncError};
use nupkg_sync::materialize::{DESCRIPTOR_EXTENSION, EntryExtractor};

/// Global mutex to ensure only one test manipulates HOME/NUGET_PACKAGES at a
/// time.
static HOME_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// RAII guard that redirects HOME to a temporary directory and clears
/// NUGET_PACKAGES.
///
/// While the guard is alive, the default cache root resolves inside the
/// sandbox, so tests cannot touch the developer's real NuGet cache.
pub struct TempHomeGuard {
    _lock: MutexGuard<'static, ()>,
    temp_home: TempDir,
    prev_home: Option<OsString>,
    prev_nuget_packages: Option<OsString>,
    #[cfg(windows)]
    prev_userprofile: Option<OsString>,
}

impl TempHomeGuard {
    /// Create a new guard with a fresh temporary home directory.
    pub fn new() -> Self {
        let lock = HOME_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_home = TempDir::new().expect("failed to create temporary HOME");

        let prev_home = env::var_os("HOME");
        let prev_nuget_packages = env::var_os("NUGET_PACKAGES");
        #[cfg(windows)]
        let prev_userprofile = env::var_os("USERPROFILE");

        // SAFETY: we hold HOME_MUTEX, ensuring no other thread mutates the
        // environment while we redirect HOME for the test.
        unsafe {
            env::set_var("HOME", temp_home.path());
            env::remove_var("NUGET_PACKAGES");
            #[cfg(windows)]
            env::set_var("USERPROFILE", temp_home.path());
        }

        Self {
            _lock: lock,
            temp_home,
            prev_home,
            prev_nuget_packages,
            #[cfg(windows)]
            prev_userprofile,
        }
    }

    /// Path to the temporary HOME directory.
    pub fn home(&self) -> &Path {
        self.temp_home.path()
    }

    /// The NuGet global-packages folder under the temporary HOME.
    pub fn nuget_packages(&self) -> PathBuf {
        self.temp_home.path().join(".nuget").join("packages")
    }

    /// Point NUGET_PACKAGES at `dir` for the rest of the guard's lifetime.
    pub fn set_nuget_packages(&self, dir: &Path) {
        // SAFETY: guarded by HOME_MUTEX.
        unsafe {
            env::set_var("NUGET_PACKAGES", dir);
        }
    }
}

impl Drop for TempHomeGuard {
    fn drop(&mut self) {
        // SAFETY: guarded by HOME_MUTEX; we restore the environment to its
        // previous state before releasing the lock.
        unsafe {
            restore("HOME", self.prev_home.as_ref());
            restore("NUGET_PACKAGES", self.prev_nuget_packages.as_ref());
            #[cfg(windows)]
            restore("USERPROFILE", self.prev_userprofile.as_ref());
        }
    }
}

unsafe fn restore(key: &str, previous: Option<&OsString>) {
    // SAFETY: callers hold HOME_MUTEX.
    unsafe {
        match previous {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}

/// A source tree, a destination and a cache root inside one temp directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        dir.child("cache").create_dir_all().unwrap();
        dir.child("src").create_dir_all().unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    /// Default destination of a sync of [`Workspace::source`]
    pub fn destination(&self) -> PathBuf {
        self.source().join("Nuget")
    }

    pub fn child(&self, path: impl AsRef<Path>) -> assert_fs::fixture::ChildPath {
        self.dir.child(path)
    }

    /// Add `name.version.nupkg` to the main cache root. The archive body is a
    /// `.nuspec` document declaring `deps`.
    pub fn package(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> &Self {
        self.package_in(&self.cache(), name, version, deps)
    }

    /// Same as [`Workspace::package`] for an arbitrary cache root.
    pub fn package_in(
        &self,
        root: &Path,
        name: &str,
        version: &str,
        deps: &[(&str, &str)],
    ) -> &Self {
        let archive = root
            .join(name)
            .join(version)
            .join(format!("{name}.{version}.nupkg"));
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(archive, nuspec(name, version, deps)).unwrap();
        self
    }

    /// Write `<dir>/<name>.csproj` under the source tree.
    pub fn project(&self, dir: &str, name: &str, refs: &[(&str, &str)]) -> &Self {
        let items: String = refs
            .iter()
            .map(|(id, version)| {
                format!("    <PackageReference Include=\"{id}\" Version=\"{version}\" />\n")
            })
            .collect();
        self.child(format!("src/{dir}/{name}.csproj"))
            .write_str(&format!(
                "<Project Sdk=\"Microsoft.NET.Sdk\">\n  <ItemGroup>\n{items}  </ItemGroup>\n</Project>\n"
            ))
            .unwrap();
        self
    }

    /// Put an archive straight into the destination.
    pub fn destination_archive(&self, file_name: &str) -> &Self {
        self.child(format!("src/Nuget/{file_name}"))
            .write_str("stale")
            .unwrap();
        self
    }

    /// Sorted file names in the destination
    pub fn destination_files(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.destination()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

pub fn nuspec(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let deps: String = deps
        .iter()
        .map(|(id, v)| format!("        <dependency id=\"{id}\" version=\"{v}\" />\n"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{name}</id>
    <version>{version}</version>
    <dependencies>
      <group targetFramework=".NETStandard2.0">
{deps}      </group>
    </dependencies>
  </metadata>
</package>
"#
    )
}

/// In-process stand-in for 7-Zip: the archive's bytes are its descriptor and
/// the payload is empty. Counts descriptor extractions per archive.
#[derive(Clone, Default)]
pub struct FixtureExtractor {
    extractions: Arc<AtomicUsize>,
    per_archive: Arc<Mutex<Vec<String>>>,
}

impl FixtureExtractor {
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Archive file names in extraction order
    pub fn archives(&self) -> Vec<String> {
        self.per_archive.lock().unwrap().clone()
    }
}

impl EntryExtractor for FixtureExtractor {
    fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()> {
        let content = if entry.ends_with(DESCRIPTOR_EXTENSION) {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            self.per_archive.lock().unwrap().push(
                archive
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .to_string(),
            );
            fs::read(archive).map_err(|source| SyncError::IoError {
                path: archive.to_path_buf(),
                source,
            })?
        } else {
            Vec::new()
        };
        let target = target_dir.join(entry);
        fs::write(&target, content).map_err(|source| SyncError::IoError {
            path: target.clone(),
            source,
        })
    }
}
