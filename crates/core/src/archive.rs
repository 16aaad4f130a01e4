use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::CatalogError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_LOCAL_MAGIC: [u8; 4] = *b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: [u8; 4] = *b"PK\x05\x06";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveListing {
    pub format: ArchiveFormat,
    /// Every member name, sorted.
    pub members: Vec<String>,
    /// The directory members among `members`, sorted.
    pub directories: Vec<String>,
    /// Members written to the working directory, in archive order.
    pub extracted: Vec<String>,
}

impl ArchiveListing {
    /// Sorted names of the extracted members that are not directories.
    pub fn extracted_files(&self) -> Vec<String> {
        let mut files = self
            .extracted
            .iter()
            .filter(|name| self.directories.binary_search(name).is_err())
            .cloned()
            .collect::<Vec<_>>();
        files.sort();
        files
    }
}

struct ArchiveMember {
    name: String,
    is_dir: bool,
}

trait ArchiveBackend {
    fn format(&self) -> ArchiveFormat;

    fn list_members(&self) -> Result<Vec<ArchiveMember>, CatalogError>;

    fn extract(
        &self,
        work_dir: &Path,
        excluded: &HashSet<&str>,
    ) -> Result<Vec<String>, CatalogError>;
}

struct TarBackend {
    path: PathBuf,
    gzip: bool,
}

impl TarBackend {
    fn open(&self) -> Result<tar::Archive<Box<dyn Read>>, CatalogError> {
        let file = File::open(&self.path).map_err(|err| CatalogError::from_io(&self.path, err))?;
        let reader: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(tar::Archive::new(reader))
    }

    fn entry_member<R: Read>(
        &self,
        entry: &tar::Entry<'_, R>,
    ) -> Result<ArchiveMember, CatalogError> {
        let path = entry
            .path()
            .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;
        let is_dir = entry.header().entry_type().is_dir();
        Ok(ArchiveMember {
            name: member_name(&path.to_string_lossy(), is_dir),
            is_dir,
        })
    }
}

impl ArchiveBackend for TarBackend {
    fn format(&self) -> ArchiveFormat {
        if self.gzip {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Tar
        }
    }

    fn list_members(&self) -> Result<Vec<ArchiveMember>, CatalogError> {
        let mut archive = self.open()?;
        let entries = archive
            .entries()
            .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;

        let mut members = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;
            members.push(self.entry_member(&entry)?);
        }
        Ok(members)
    }

    fn extract(
        &self,
        work_dir: &Path,
        excluded: &HashSet<&str>,
    ) -> Result<Vec<String>, CatalogError> {
        let mut archive = self.open()?;
        let entries = archive
            .entries()
            .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;

        let mut extracted = Vec::new();
        for entry in entries {
            let mut entry =
                entry.map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;
            let name = self.entry_member(&entry)?.name;
            if excluded.contains(name.as_str()) {
                debug!("skipping excluded member {}", name);
                continue;
            }

            let unpacked = entry
                .unpack_in(work_dir)
                .map_err(|err| CatalogError::Io {
                    path: work_dir.join(&name),
                    source: err,
                })?;
            if !unpacked {
                return Err(CatalogError::corrupt(
                    &self.path,
                    format!("member '{name}' escapes the extraction directory"),
                ));
            }
            debug!("extracted {}", name);
            extracted.push(name);
        }
        Ok(extracted)
    }
}

struct ZipBackend {
    path: PathBuf,
}

impl ZipBackend {
    fn open(&self) -> Result<ZipArchive<BufReader<File>>, CatalogError> {
        let file = File::open(&self.path).map_err(|err| CatalogError::from_io(&self.path, err))?;
        ZipArchive::new(BufReader::new(file))
            .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))
    }
}

impl ArchiveBackend for ZipBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn list_members(&self) -> Result<Vec<ArchiveMember>, CatalogError> {
        let mut archive = self.open()?;
        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;
            members.push(ArchiveMember {
                name: member_name(file.name(), file.is_dir()),
                is_dir: file.is_dir(),
            });
        }
        Ok(members)
    }

    fn extract(
        &self,
        work_dir: &Path,
        excluded: &HashSet<&str>,
    ) -> Result<Vec<String>, CatalogError> {
        let mut archive = self.open()?;
        let mut extracted = Vec::new();
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|err| CatalogError::corrupt(&self.path, err.to_string()))?;
            let name = member_name(file.name(), file.is_dir());
            if excluded.contains(name.as_str()) {
                debug!("skipping excluded member {}", name);
                continue;
            }

            let target = file
                .enclosed_name()
                .map(|relative| work_dir.join(relative))
                .ok_or_else(|| {
                    CatalogError::corrupt(
                        &self.path,
                        format!("member '{name}' escapes the extraction directory"),
                    )
                })?;

            if file.is_dir() {
                fs::create_dir_all(&target).map_err(|err| write_error(&target, err))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|err| write_error(parent, err))?;
                }
                let mut out = File::create(&target).map_err(|err| write_error(&target, err))?;
                io::copy(&mut file, &mut out).map_err(|err| write_error(&target, err))?;
            }
            debug!("extracted {}", name);
            extracted.push(name);
        }
        Ok(extracted)
    }
}

/// Lists every member of `archive` and extracts the ones whose names are not
/// exactly equal to an entry of `exclusions` into `work_dir`.
///
/// Excluding a directory member does not exclude the files beneath it.
/// Extraction stops at the first failure.
pub fn scan_archive<S>(
    archive: &Path,
    exclusions: &[S],
    work_dir: &Path,
) -> Result<ArchiveListing, CatalogError>
where
    S: AsRef<str>,
{
    let started = Instant::now();
    let backend = open_backend(archive)?;

    let listed = backend.list_members()?;
    let mut directories = listed
        .iter()
        .filter(|member| member.is_dir)
        .map(|member| member.name.clone())
        .collect::<Vec<_>>();
    directories.sort();
    let mut members = listed
        .into_iter()
        .map(|member| member.name)
        .collect::<Vec<_>>();
    members.sort();
    info!(
        "obtained {} member(s) from {} ({:?})",
        members.len(),
        archive.display(),
        backend.format()
    );

    fs::create_dir_all(work_dir).map_err(|err| write_error(work_dir, err))?;
    let excluded = exclusions
        .iter()
        .map(AsRef::as_ref)
        .collect::<HashSet<&str>>();
    let extracted = backend.extract(work_dir, &excluded)?;
    info!(
        "extracted {} of {} member(s) to {} in {} ms",
        extracted.len(),
        members.len(),
        work_dir.display(),
        started.elapsed().as_millis()
    );

    Ok(ArchiveListing {
        format: backend.format(),
        members,
        directories,
        extracted,
    })
}

pub fn detect_format(archive: &Path) -> Result<ArchiveFormat, CatalogError> {
    let mut file = File::open(archive).map_err(|err| CatalogError::from_io(archive, err))?;
    let mut magic = [0_u8; 4];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CatalogError::from_io(archive, err)),
        }
    }

    if read == 0 {
        return Err(CatalogError::corrupt(archive, "empty file"));
    }
    if read >= 2 && magic[..2] == GZIP_MAGIC {
        return Ok(ArchiveFormat::TarGz);
    }
    if read == 4 && (magic == ZIP_LOCAL_MAGIC || magic == ZIP_EMPTY_MAGIC) {
        return Ok(ArchiveFormat::Zip);
    }
    Ok(ArchiveFormat::Tar)
}

fn open_backend(archive: &Path) -> Result<Box<dyn ArchiveBackend>, CatalogError> {
    let path = archive.to_path_buf();
    let backend: Box<dyn ArchiveBackend> = match detect_format(archive)? {
        ArchiveFormat::Tar => Box::new(TarBackend { path, gzip: false }),
        ArchiveFormat::TarGz => Box::new(TarBackend { path, gzip: true }),
        ArchiveFormat::Zip => Box::new(ZipBackend { path }),
    };
    Ok(backend)
}

fn member_name(raw: &str, is_dir: bool) -> String {
    if is_dir {
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            raw.to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        raw.to_string()
    }
}

fn write_error(path: &Path, err: io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.to_path_buf(),
        source: err,
    }
}
