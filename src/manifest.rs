//! Dependency declarations from project files and package descriptors.
//!
//! Two XML shapes are understood:
//!
//! - project manifests (`*.csproj`): `<PackageReference Include=".."
//!   Version=".."/>`, with the version optionally given as a nested
//!   `<Version>` element
//! - package descriptors (`*.nuspec`): `<dependency id=".." version=".."/>`
//!   in any namespace
//!
//! Only packages accepted by the [`PackageFilter`] are returned. Declarations
//! that do not pin one concrete version are skipped with a warning since
//! there is no range resolution.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::package::{PackageFilter, PackageIdentity, PackageVersion};

/// Which kind of document is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// A project file listing `PackageReference` items
    Project,
    /// A package's own `.nuspec` descriptor
    Descriptor,
}

impl ManifestKind {
    fn element(self) -> &'static [u8] {
        match self {
            ManifestKind::Project => b"PackageReference",
            ManifestKind::Descriptor => b"dependency",
        }
    }

    fn name_attribute(self) -> &'static [u8] {
        match self {
            ManifestKind::Project => b"Include",
            ManifestKind::Descriptor => b"id",
        }
    }

    fn version_attribute(self) -> &'static [u8] {
        match self {
            ManifestKind::Project => b"Version",
            ManifestKind::Descriptor => b"version",
        }
    }
}

#[derive(Debug, Default)]
struct Declaration {
    name: Option<String>,
    version: Option<String>,
}

/// Read the dependency declarations of `path`.
///
/// # Errors
///
/// - [`SyncError::IoError`] if the file cannot be opened
/// - [`SyncError::ManifestParse`] if it is not well-formed XML
pub fn extract_dependencies(
    path: &Path,
    kind: ManifestKind,
    filter: &PackageFilter,
) -> Result<Vec<PackageIdentity>> {
    let file = File::open(path).map_err(|source| SyncError::io(path, source))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.trim_text(true);

    let parse_error = |message: String| SyncError::ManifestParse {
        path: path.to_path_buf(),
        message,
    };

    let mut declarations = Vec::new();
    let mut pending: Option<Declaration> = None;
    let mut in_version_element = false;
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            parse_error(format!("{e} at byte {}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                if e.local_name().as_ref() == kind.element() {
                    pending = Some(read_declaration(&e, kind).map_err(parse_error)?);
                } else if pending.is_some()
                    && kind == ManifestKind::Project
                    && e.local_name().as_ref() == b"Version"
                {
                    in_version_element = true;
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                if e.local_name().as_ref() == kind.element() {
                    declarations.push(read_declaration(&e, kind).map_err(parse_error)?);
                }
            }
            Event::Text(text) if in_version_element => {
                let value = text
                    .unescape()
                    .map_err(|e| parse_error(e.to_string()))?;
                if let Some(declaration) = pending.as_mut() {
                    declaration.version = Some(value.into_owned());
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"Version" {
                    in_version_element = false;
                } else if e.local_name().as_ref() == kind.element()
                    && let Some(declaration) = pending.take()
                {
                    declarations.push(declaration);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(parse_error("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(parse_error("unexpected end of document".to_string()));
    }

    Ok(declarations
        .into_iter()
        .filter_map(|declaration| to_identity(path, declaration, filter))
        .collect())
}

fn read_declaration(
    element: &BytesStart<'_>,
    kind: ManifestKind,
) -> std::result::Result<Declaration, String> {
    let mut declaration = Declaration::default();

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = attribute.key.local_name();
        if key.as_ref() == kind.name_attribute() {
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            declaration.name = Some(value.trim().to_string());
        } else if key.as_ref() == kind.version_attribute() {
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            declaration.version = Some(value.trim().to_string());
        }
    }

    Ok(declaration)
}

fn to_identity(
    path: &Path,
    declaration: Declaration,
    filter: &PackageFilter,
) -> Option<PackageIdentity> {
    let name = declaration.name.filter(|name| !name.is_empty())?;
    if !filter.matches(&name) {
        return None;
    }

    let Some(raw_version) = declaration.version else {
        debug!(package = %name, manifest = %path.display(), "Declaration has no version");
        return None;
    };

    match PackageVersion::parse(exact_pin(&raw_version)) {
        Some(version) => Some(PackageIdentity::new(name, version)),
        None => {
            warn!(
                package = %name,
                version = %raw_version,
                manifest = %path.display(),
                "Skipping dependency without a concrete version"
            );
            None
        }
    }
}

/// `[1.2.3]` pins exactly one version; any other range is left untouched so
/// it fails to parse.
fn exact_pin(version: &str) -> &str {
    version
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .filter(|v| !v.contains(','))
        .unwrap_or(version)
}
