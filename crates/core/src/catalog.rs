use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive::scan_archive;
use crate::categorize::{categorize_paths, uncategorized_paths};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::model::{
    Catalog, CatalogReport, DatasetFamily, FamilyFailure, FamilySource, REPORT_VERSION,
};
use crate::scan::{scan_directory, ExclusionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// Scans one family's source and files the discovered paths by marker.
pub fn build_catalog(family: &DatasetFamily) -> Result<Catalog, CatalogError> {
    let started = Instant::now();
    info!(
        "building {} catalog from {}",
        family.kind,
        family.source.location().display()
    );

    let (files, directories, archive_members, extracted) = match &family.source {
        FamilySource::Directory { root } => {
            let exclusions = family
                .exclusions
                .as_ref()
                .map(|names| ExclusionSet::new(names.iter().cloned(), family.exclusion_mode));
            let listing = scan_directory(root, exclusions.as_ref())?;
            (listing.files, listing.directories, Vec::new(), Vec::new())
        }
        FamilySource::Archive { path, work_dir } => {
            let exclusions = family.exclusions.clone().unwrap_or_default();
            let listing = scan_archive(path, &exclusions, work_dir)?;
            let files = listing.extracted_files();
            (files, Vec::new(), listing.members, listing.extracted)
        }
    };

    let categories = categorize_paths(&files, &family.markers);
    let uncategorized = uncategorized_paths(&files, &family.markers).len() as u64;
    info!(
        "{}: {} file(s) filed into {} categor(ies), {} uncategorized",
        family.kind,
        files.len(),
        categories.len(),
        uncategorized
    );

    Ok(Catalog {
        catalog_id: Uuid::new_v4().to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        family: family.kind,
        source: family.source.clone(),
        exclusion_mode: family.exclusion_mode,
        files,
        directories,
        archive_members,
        extracted,
        categories,
        uncategorized,
        elapsed_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
    })
}

/// Builds every configured family in order.
///
/// Under `FailurePolicy::Abort` the first failure is returned; under
/// `FailurePolicy::Continue` it is recorded in the report and the next
/// family runs.
pub fn build_report(
    config: &CatalogConfig,
    policy: FailurePolicy,
) -> Result<CatalogReport, CatalogError> {
    let mut catalogs = Vec::new();
    let mut failures = Vec::new();

    for (index, family_config) in config.families.iter().enumerate() {
        let outcome = family_config
            .resolve()
            .and_then(|family| build_catalog(&family));
        match outcome {
            Ok(catalog) => catalogs.push(catalog),
            Err(err) if policy == FailurePolicy::Continue => {
                let message = describe(&err);
                warn!(
                    "family {}/{} ({}) failed: {}",
                    index + 1,
                    config.families.len(),
                    family_config.tag,
                    message
                );
                failures.push(FamilyFailure {
                    tag: family_config.tag.clone(),
                    kind: err.kind_label().to_string(),
                    message,
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(CatalogReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        catalogs,
        failures,
    })
}

// Error message followed by its causes, e.g. "I/O error at x: disk full".
fn describe(err: &CatalogError) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    message
}

pub fn write_report(report: &CatalogReport, output_path: impl AsRef<Path>) -> Result<()> {
    let path = output_path.as_ref();
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize catalog report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write catalog report to {}", path.display()))?;
    Ok(())
}

pub fn load_report(path: impl AsRef<Path>) -> Result<CatalogReport> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog report {}", path.display()))?;
    let report: CatalogReport = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::{build_catalog, build_report, describe, load_report, write_report, FailurePolicy};
    use crate::categorize::self_named_markers;
    use crate::config::{CatalogConfig, FamilyConfig};
    use crate::error::CatalogError;
    use crate::model::{DatasetFamily, ExclusionMode, FamilyKind, FamilySource};

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, b"data").expect("write file");
    }

    fn family_config(tag: &str, root: &Path) -> FamilyConfig {
        FamilyConfig {
            tag: tag.to_string(),
            source: FamilySource::Directory {
                root: root.to_path_buf(),
            },
            exclusions: None,
            exclusion_mode: ExclusionMode::AnyMatch,
            markers: None,
        }
    }

    #[test]
    fn directory_catalog_files_paths_by_marker() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "fix/fix_aer/a.nc");
        touch(dir.path(), "fix/fix_orog/b.nc");
        touch(dir.path(), "fix/other/c.nc");
        touch(dir.path(), "fix/fix_orog/schin/d.nc");

        let family = DatasetFamily {
            kind: FamilyKind::Fixed,
            source: FamilySource::Directory {
                root: dir.path().join("fix"),
            },
            exclusions: Some(vec!["schin".to_string()]),
            exclusion_mode: ExclusionMode::AnyMatch,
            markers: self_named_markers(["fix_aer", "fix_orog"]),
        };

        let catalog = build_catalog(&family).expect("catalog builds");
        assert_eq!(catalog.files.len(), 3);
        assert_eq!(catalog.uncategorized, 1);
        assert_eq!(catalog.categories.len(), 2);
        assert_eq!(
            catalog.categories.get("fix_orog").expect("fix_orog"),
            ["fix/fix_orog/b.nc"]
        );
        assert!(dir.path().join(&catalog.files[0]).is_file());
    }

    #[test]
    fn archive_catalog_only_files_extracted_members() {
        let dir = TempDir::new().expect("tempdir");
        let archive = dir.path().join("fix.tar");
        let mut builder = tar::Builder::new(fs::File::create(&archive).expect("create tar"));
        for name in ["fix/fix_aer/a.nc", "fix/fix_aer/skip.nc"] {
            let mut header = tar::Header::new_gnu();
            header.set_size(4);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, b"data".as_slice())
                .expect("append member");
        }
        builder.finish().expect("finish tar");

        let family = DatasetFamily {
            kind: FamilyKind::Fixed,
            source: FamilySource::Archive {
                path: archive,
                work_dir: dir.path().join("work"),
            },
            exclusions: Some(vec!["fix/fix_aer/skip.nc".to_string()]),
            exclusion_mode: ExclusionMode::AnyMatch,
            markers: self_named_markers(["fix_aer"]),
        };

        let catalog = build_catalog(&family).expect("catalog builds");
        assert_eq!(
            catalog.archive_members,
            ["fix/fix_aer/a.nc", "fix/fix_aer/skip.nc"]
        );
        assert_eq!(catalog.files, ["fix/fix_aer/a.nc"]);
        assert_eq!(
            catalog.categories.get("fix_aer").expect("fix_aer"),
            ["fix/fix_aer/a.nc"]
        );
        assert!(catalog
            .categories
            .iter()
            .all(|(_, paths)| paths.iter().all(|path| !path.contains("skip.nc"))));
    }

    #[test]
    fn abort_policy_returns_first_failure() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "NaturalEarth/shapefiles/coast.shp");
        let config = CatalogConfig {
            families: vec![
                family_config("radar_data", dir.path()),
                family_config("ne_data", &dir.path().join("NaturalEarth")),
            ],
        };

        let err = build_report(&config, FailurePolicy::Abort).expect_err("aborts");
        assert!(matches!(err, CatalogError::UnknownCategory { .. }));
    }

    #[test]
    fn continue_policy_records_failures_and_keeps_going() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "NaturalEarth/shapefiles/coast.shp");
        let config = CatalogConfig {
            families: vec![
                family_config("fix_data", &dir.path().join("missing")),
                family_config("ne_data", &dir.path().join("NaturalEarth")),
            ],
        };

        let report = build_report(&config, FailurePolicy::Continue).expect("report builds");
        assert_eq!(report.catalogs.len(), 1);
        assert_eq!(report.catalogs[0].family, FamilyKind::NaturalEarth);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].tag, "fix_data");
        assert_eq!(report.failures[0].kind, "not_found");
    }

    #[test]
    fn failure_message_includes_io_cause_once() {
        let err = CatalogError::Io {
            path: "/scratch/fix".into(),
            source: std::io::Error::other("stale file handle"),
        };
        assert_eq!(describe(&err), "I/O error at /scratch/fix: stale file handle");
    }

    #[test]
    fn report_survives_write_and_load() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "NaturalEarth/raster_files/NE1.tif");
        let config = CatalogConfig {
            families: vec![family_config("ne_data", &dir.path().join("NaturalEarth"))],
        };
        let report = build_report(&config, FailurePolicy::Abort).expect("report builds");

        let output = dir.path().join("catalog.json");
        write_report(&report, &output).expect("report written");
        let loaded = load_report(&output).expect("report loads");
        assert_eq!(loaded, report);
    }
}
