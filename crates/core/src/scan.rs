use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::CatalogError;
use crate::model::ExclusionMode;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryListing {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

/// Substring denylist applied to every discovered file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: Vec<String>,
    mode: ExclusionMode,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I, mode: ExclusionMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn mode(&self) -> ExclusionMode {
        self.mode
    }

    pub fn retains(&self, path: &str) -> bool {
        match self.mode {
            ExclusionMode::AnyMatch => !self
                .names
                .iter()
                .any(|name| path.contains(name.as_str())),
            ExclusionMode::Legacy => self
                .names
                .iter()
                .any(|name| !path.contains(name.as_str())),
        }
    }
}

/// Walks `root` recursively, following symlinks, and lists every file.
///
/// Paths are rendered with `/` separators relative to [`listing_base`], so
/// scanning `/data/fix` yields `fix/fix_aer/...`. Exclusions match against
/// that rendering. Siblings are visited in file-name order. Any unreadable entry aborts the
/// scan; a partial listing is never returned.
pub fn scan_directory(
    root: &Path,
    exclusions: Option<&ExclusionSet>,
) -> Result<DirectoryListing, CatalogError> {
    let started = Instant::now();
    let metadata = fs::metadata(root).map_err(|err| CatalogError::from_io(root, err))?;
    if !metadata.is_dir() {
        return Err(CatalogError::Io {
            path: root.to_path_buf(),
            source: io::Error::other("scan root is not a directory"),
        });
    }

    let mut listing = DirectoryListing::default();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(dangling) = dangling_link(root, &err) {
                    warn!("listing dangling symlink {}", dangling);
                    listing.files.push(dangling);
                    continue;
                }
                return Err(walk_error(root, err));
            }
        };

        let rendered = render_relative(root, entry.path());
        if entry.file_type().is_dir() {
            listing.directories.push(rendered);
        } else {
            listing.files.push(rendered);
        }
    }

    info!(
        "visited {} director(ies) under {}",
        listing.directories.len(),
        root.display()
    );
    debug!("directories: {:?}", listing.directories);

    if let Some(exclusions) = exclusions {
        let before = listing.files.len();
        listing.files.retain(|path| exclusions.retains(path));
        info!(
            "exclusion filter ({:?}) dropped {} of {} file(s)",
            exclusions.mode(),
            before - listing.files.len(),
            before
        );
    }

    info!(
        "scanned {} file(s) under {} in {} ms",
        listing.files.len(),
        root.display(),
        started.elapsed().as_millis()
    );
    Ok(listing)
}

/// Directory that listed paths are relative to: the root's parent, so every
/// path keeps the root's own name as its first segment.
pub fn listing_base(root: &Path) -> PathBuf {
    match (root.file_name(), root.parent()) {
        (Some(_), Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        (Some(_), _) => PathBuf::from("."),
        (None, _) => root.to_path_buf(),
    }
}

fn render_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut segments = Vec::new();
    if let Some(name) = root.file_name() {
        segments.push(name.to_string_lossy().into_owned());
    }
    segments.extend(
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

fn dangling_link(root: &Path, err: &walkdir::Error) -> Option<String> {
    let path = err.path()?;
    let missing = err
        .io_error()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound);
    let is_link = fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    (missing && is_link).then(|| render_relative(root, path))
}

fn walk_error(root: &Path, err: walkdir::Error) -> CatalogError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());

    if let Some(ancestor) = err.loop_ancestor() {
        return CatalogError::Io {
            source: io::Error::other(format!(
                "symlink loop back to {}",
                ancestor.display()
            )),
            path,
        };
    }

    match err.into_io_error() {
        Some(io_err) => CatalogError::from_io(&path, io_err),
        None => CatalogError::Io {
            path,
            source: io::Error::other("directory walk failed"),
        },
    }
}
