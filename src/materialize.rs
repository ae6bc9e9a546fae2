//! Extracting a package's payload and descriptor into a scratch directory.
//!
//! [`with_extracted_entries`] is a scoped resource: it creates a scratch
//! directory, extracts the two entries into it, hands both paths to a
//! continuation and removes the directory once the continuation returns,
//! whether it succeeded, failed or unwound.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::trace;

use crate::error::{Result, SyncError};
use crate::package::PackageIdentity;

/// Extension of the binary payload entry
pub const PAYLOAD_EXTENSION: &str = "dll";
/// Extension of the package descriptor entry
pub const DESCRIPTOR_EXTENSION: &str = "nuspec";

/// Pulls a single named entry out of an archive.
///
/// Implementations must be usable from several worker threads at once.
pub trait EntryExtractor: Send + Sync {
    /// Extract `entry` (searched anywhere inside the archive) from `archive`
    /// into `target_dir`, flattening its path.
    fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()>;
}

/// Runs an external archiver once per entry.
///
/// The argument template may reference `{archive}`, `{target}` and `{entry}`.
/// The default mirrors 7-Zip's `7za e <archive> -o<target> <entry> -r -ssc- -y`,
/// matching entry names without regard to case.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    /// 7-Zip compatible invocation of `program`
    pub fn seven_zip(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: ["e", "{archive}", "-o{target}", "{entry}", "-r", "-ssc-", "-y"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Arbitrary program and argument template
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, archive: &Path, target_dir: &Path, entry: &str) -> Vec<OsString> {
        let archive = archive.to_string_lossy();
        let target = target_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                OsString::from(
                    arg.replace("{archive}", &archive)
                        .replace("{target}", &target)
                        .replace("{entry}", entry),
                )
            })
            .collect()
    }
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::seven_zip("7za")
    }
}

impl EntryExtractor for CommandExtractor {
    fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()> {
        let args = self.render_args(archive, target_dir, entry);
        trace!(program = %self.program, ?args, "Running extractor");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| SyncError::ExtractorLaunch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SyncError::ExtractionFailed {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Paths of the entries extracted from one archive
#[derive(Debug, Clone)]
pub struct ExtractedEntries {
    pub identity: PackageIdentity,
    pub payload: PathBuf,
    pub descriptor: PathBuf,
}

/// Extract `<name>.dll` and `<name>.nuspec` from `archive` and run
/// `continuation` on them.
///
/// The scratch directory is named after the package's full identity plus a
/// random suffix inside `scratch_root`, so concurrent extractions never
/// share a directory. It is removed after `continuation` returns; if the
/// continuation failed its error takes precedence over a cleanup failure.
///
/// # Errors
///
/// - [`SyncError::MalformedArchiveName`] if the file name is not
///   `<name>.<version>.nupkg`
/// - any error from the extractor, the continuation or the cleanup
pub fn with_extracted_entries<T>(
    archive: &Path,
    scratch_root: &Path,
    extractor: &dyn EntryExtractor,
    continuation: impl FnOnce(&ExtractedEntries) -> Result<T>,
) -> Result<T> {
    let identity = archive_identity(archive)?;
    scoped_extraction(archive, identity, scratch_root, extractor, continuation)
}

/// Same as [`with_extracted_entries`] for an archive resolved from
/// `declared`.
///
/// Entry names follow the archive's spelling of the id, or the declared one
/// when the archive name is all lower case (see
/// [`PackageIdentity::respelled`]).
pub fn with_declared_entries<T>(
    archive: &Path,
    declared: &PackageIdentity,
    scratch_root: &Path,
    extractor: &dyn EntryExtractor,
    continuation: impl FnOnce(&ExtractedEntries) -> Result<T>,
) -> Result<T> {
    let identity = archive_identity(archive)?.respelled(declared);
    scoped_extraction(archive, identity, scratch_root, extractor, continuation)
}

fn archive_identity(archive: &Path) -> Result<PackageIdentity> {
    PackageIdentity::from_archive_path(archive)
        .ok_or_else(|| SyncError::MalformedArchiveName(archive.to_path_buf()))
}

fn scoped_extraction<T>(
    archive: &Path,
    identity: PackageIdentity,
    scratch_root: &Path,
    extractor: &dyn EntryExtractor,
    continuation: impl FnOnce(&ExtractedEntries) -> Result<T>,
) -> Result<T> {
    let scratch = tempfile::Builder::new()
        .prefix(&format!("{}-", identity.canonical()))
        .tempdir_in(scratch_root)
        .map_err(|source| SyncError::io(scratch_root, source))?;
    let scratch_path = scratch.path().to_path_buf();

    let outcome = extract_and_continue(archive, &scratch_path, extractor, identity, continuation);

    let cleanup = scratch
        .close()
        .map_err(|source| SyncError::io(&scratch_path, source));
    trace!(path = %scratch_path.display(), "Removed scratch directory");

    let value = outcome?;
    cleanup?;
    Ok(value)
}

fn extract_and_continue<T>(
    archive: &Path,
    scratch: &Path,
    extractor: &dyn EntryExtractor,
    identity: PackageIdentity,
    continuation: impl FnOnce(&ExtractedEntries) -> Result<T>,
) -> Result<T> {
    let payload_name = format!("{}.{PAYLOAD_EXTENSION}", identity.name());
    let descriptor_name = format!("{}.{DESCRIPTOR_EXTENSION}", identity.name());

    extractor.extract(archive, scratch, &payload_name)?;
    extractor.extract(archive, scratch, &descriptor_name)?;

    let entries = ExtractedEntries {
        payload: extracted_path(scratch, &payload_name),
        descriptor: extracted_path(scratch, &descriptor_name),
        identity,
    };

    continuation(&entries)
}

// Extractors matching names case-insensitively write the entry with the
// casing stored in the archive.
fn extracted_path(scratch: &Path, entry: &str) -> PathBuf {
    let exact = scratch.join(entry);
    if exact.exists() {
        return exact;
    }

    fs::read_dir(scratch)
        .ok()
        .and_then(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .find(|found| {
                    found
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.eq_ignore_ascii_case(entry))
                })
                .map(|found| found.path())
        })
        .unwrap_or(exact)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;

    /// Writes the archive's bytes as the descriptor and an empty payload.
    #[derive(Default)]
    struct CopyingExtractor {
        calls: Mutex<Vec<String>>,
    }

    impl EntryExtractor for CopyingExtractor {
        fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()> {
            self.calls.lock().unwrap().push(entry.to_string());
            let content = if entry.ends_with(DESCRIPTOR_EXTENSION) {
                fs::read(archive).map_err(|e| SyncError::io(archive, e))?
            } else {
                Vec::new()
            };
            let target = target_dir.join(entry);
            fs::write(&target, content).map_err(|e| SyncError::io(&target, e))
        }
    }

    struct FailingExtractor;

    impl EntryExtractor for FailingExtractor {
        fn extract(&self, archive: &Path, _target_dir: &Path, entry: &str) -> Result<()> {
            Err(SyncError::ExtractionFailed {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
                status: "exit status: 2".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn scratch_entries(root: &Path) -> usize {
        fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn test_entries_are_available_to_continuation() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.Bar.1.0.0.nupkg");
        fs::write(&archive, "<package/>").unwrap();
        let scratch_root = temp.path().join("scratch");
        fs::create_dir(&scratch_root).unwrap();

        let extractor = CopyingExtractor::default();
        let descriptor_text = with_extracted_entries(&archive, &scratch_root, &extractor, |entries| {
            assert!(entries.payload.ends_with("Foo.Bar.dll"));
            assert!(entries.descriptor.ends_with("Foo.Bar.nuspec"));
            assert!(entries.payload.exists());
            let dir_name = entries
                .descriptor
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap()
                .to_string();
            assert!(dir_name.starts_with("Foo.Bar.1.0.0-"));
            Ok(fs::read_to_string(&entries.descriptor).unwrap())
        })
        .unwrap();

        assert_eq!(descriptor_text, "<package/>");
        assert_eq!(
            *extractor.calls.lock().unwrap(),
            vec!["Foo.Bar.dll".to_string(), "Foo.Bar.nuspec".to_string()]
        );
        assert_eq!(scratch_entries(&scratch_root), 0);
    }

    #[test]
    fn test_scratch_removed_when_continuation_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.1.0.0.nupkg");
        fs::write(&archive, "<package/>").unwrap();

        let result: Result<()> =
            with_extracted_entries(&archive, temp.path(), &CopyingExtractor::default(), |_| {
                Err(SyncError::ConfigError("continuation failed".to_string()))
            });

        assert!(matches!(result, Err(SyncError::ConfigError(_))));
        // Only the archive itself is left
        assert_eq!(scratch_entries(temp.path()), 1);
    }

    #[test]
    fn test_extraction_failure_propagates_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.1.0.0.nupkg");
        fs::write(&archive, "").unwrap();

        let mut called = false;
        let result = with_extracted_entries(&archive, temp.path(), &FailingExtractor, |_| {
            called = true;
            Ok(())
        });

        assert!(matches!(result, Err(SyncError::ExtractionFailed { .. })));
        assert!(!called);
        assert_eq!(scratch_entries(temp.path()), 1);
    }

    #[test]
    fn test_malformed_archive_name() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("not-a-package.zip");

        let result = with_extracted_entries(&archive, temp.path(), &FailingExtractor, |_| Ok(()));
        assert!(matches!(result, Err(SyncError::MalformedArchiveName(_))));
    }

    #[test]
    fn test_same_version_different_packages_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let foo = temp.path().join("Foo.1.0.0.nupkg");
        let bar = temp.path().join("Bar.1.0.0.nupkg");
        fs::write(&foo, "foo").unwrap();
        fs::write(&bar, "bar").unwrap();
        let scratch_root = temp.path().join("scratch");
        fs::create_dir(&scratch_root).unwrap();
        let extractor = CopyingExtractor::default();

        with_extracted_entries(&foo, &scratch_root, &extractor, |outer| {
            with_extracted_entries(&bar, &scratch_root, &extractor, |inner| {
                assert_ne!(outer.descriptor.parent(), inner.descriptor.parent());
                assert_eq!(fs::read_to_string(&outer.descriptor).unwrap(), "foo");
                assert_eq!(fs::read_to_string(&inner.descriptor).unwrap(), "bar");
                Ok(())
            })
        })
        .unwrap();

        assert_eq!(scratch_entries(&scratch_root), 0);
    }

    /// Behaves like 7-Zip without `-ssc-`: only an exact-case request for
    /// one of `stored` produces a file, anything else succeeds silently.
    struct CaseSensitiveExtractor {
        stored: Vec<&'static str>,
    }

    impl EntryExtractor for CaseSensitiveExtractor {
        fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()> {
            if self.stored.contains(&entry) {
                let target = target_dir.join(entry);
                fs::copy(archive, &target).map_err(|e| SyncError::io(&target, e))?;
            }
            Ok(())
        }
    }

    /// Matches any casing but writes the casing stored in the archive.
    struct StoredCaseExtractor {
        stored: &'static str,
    }

    impl EntryExtractor for StoredCaseExtractor {
        fn extract(&self, archive: &Path, target_dir: &Path, entry: &str) -> Result<()> {
            let (stem, extension) = entry.rsplit_once('.').unwrap();
            if stem.eq_ignore_ascii_case(self.stored) {
                let target = target_dir.join(format!("{}.{extension}", self.stored));
                fs::copy(archive, &target).map_err(|e| SyncError::io(&target, e))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_declared_casing_names_entries_of_lowercase_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("newtonsoft.json.13.0.1.nupkg");
        fs::write(&archive, "<package/>").unwrap();
        let extractor = CaseSensitiveExtractor {
            stored: vec!["Newtonsoft.Json.dll", "Newtonsoft.Json.nuspec"],
        };
        let declared =
            PackageIdentity::new("Newtonsoft.Json", crate::package::PackageVersion::parse("13.0.1").unwrap());

        let text = with_declared_entries(&archive, &declared, temp.path(), &extractor, |entries| {
            fs::read_to_string(&entries.descriptor).map_err(|e| SyncError::io(&entries.descriptor, e))
        })
        .unwrap();
        assert_eq!(text, "<package/>");

        // Without the declared spelling the lower-cased entry is never found
        let result = with_extracted_entries(&archive, temp.path(), &extractor, |entries| {
            fs::read_to_string(&entries.descriptor).map_err(|e| SyncError::io(&entries.descriptor, e))
        });
        assert!(matches!(result, Err(SyncError::IoError { .. })));
    }

    #[test]
    fn test_entries_written_in_stored_casing_are_found() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("foo.1.0.0.nupkg");
        fs::write(&archive, "<package/>").unwrap();
        let extractor = StoredCaseExtractor { stored: "Foo" };

        with_extracted_entries(&archive, temp.path(), &extractor, |entries| {
            assert!(entries.descriptor.ends_with("Foo.nuspec"));
            assert!(entries.payload.ends_with("Foo.dll"));
            assert_eq!(fs::read_to_string(&entries.descriptor).unwrap(), "<package/>");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_render_args() {
        let extractor = CommandExtractor::default();
        let args = extractor.render_args(Path::new("/c/Foo.1.0.0.nupkg"), Path::new("/tmp/x"), "Foo.nuspec");
        assert_eq!(
            args,
            vec!["e", "/c/Foo.1.0.0.nupkg", "-o/tmp/x", "Foo.nuspec", "-r", "-ssc-", "-y"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_runs_program() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("Foo.1.0.0.nupkg");
        fs::write(&archive, "content").unwrap();

        let extractor = CommandExtractor::new("cp", ["{archive}", "{target}/{entry}"]);
        extractor.extract(&archive, temp.path(), "Foo.nuspec").unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("Foo.nuspec")).unwrap(),
            "content"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_nonzero_exit() {
        let temp = TempDir::new().unwrap();
        let extractor = CommandExtractor::new("false", Vec::<String>::new());
        let result = extractor.extract(&temp.path().join("Foo.1.0.0.nupkg"), temp.path(), "Foo.dll");
        assert!(matches!(result, Err(SyncError::ExtractionFailed { .. })));
    }

    #[test]
    fn test_command_extractor_launch_failure() {
        let temp = TempDir::new().unwrap();
        let extractor = CommandExtractor::seven_zip("nupkg-sync-no-such-extractor");
        let result = extractor.extract(&temp.path().join("Foo.1.0.0.nupkg"), temp.path(), "Foo.dll");
        assert!(matches!(result, Err(SyncError::ExtractorLaunch { .. })));
    }
}
