use std::fs::{self, File};
use std::path::Path;

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use hpc_catalog_core::{
    build_report, load_config, render_markdown_summary, FailurePolicy, FamilyKind,
};
use tempfile::TempDir;

fn touch(root: &Path, relative: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, relative.as_bytes())?;
    Ok(())
}

fn write_model_tarball(path: &Path) -> Result<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in [
        ("input_model_data/FV3GFS/gfs.t00z.atmanl.nc", b"gfs".as_slice()),
        ("input_model_data/HRRR/hrrr.wrfprsf00.grib2", b"hrrr".as_slice()),
        ("input_model_data/README", b"readme".as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

#[test]
fn builds_directory_and_archive_families_from_config() -> Result<()> {
    let dir = TempDir::new()?;
    touch(dir.path(), "fix/fix_aer/merra2.aerclim.m01.nc")?;
    touch(dir.path(), "fix/fix_am/global_glacier.2x2.grb")?;
    touch(dir.path(), "fix/fix_am/scratch_user/notes.txt")?;
    touch(dir.path(), "fix/fix_lut/optics_BC.v1_3.dat")?;
    let tarball = dir.path().join("input_model_data.tar.gz");
    write_model_tarball(&tarball)?;

    let config_path = dir.path().join("families.json");
    let config = serde_json::json!({
        "families": [
            {
                "tag": "fix_data",
                "source": {"type": "directory", "root": dir.path().join("fix")},
                "exclusions": ["scratch_user"]
            },
            {
                "tag": "input_model_data",
                "source": {
                    "type": "archive",
                    "path": tarball,
                    "work_dir": dir.path().join("work")
                }
            }
        ]
    });
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    let config = load_config(&config_path)?;
    let report = build_report(&config, FailurePolicy::Abort)?;
    assert!(report.failures.is_empty());
    assert_eq!(report.catalogs.len(), 2);

    let fixed = &report.catalogs[0];
    assert_eq!(fixed.family, FamilyKind::Fixed);
    assert_eq!(
        fixed.files,
        [
            "fix/fix_aer/merra2.aerclim.m01.nc",
            "fix/fix_am/global_glacier.2x2.grb",
            "fix/fix_lut/optics_BC.v1_3.dat",
        ]
    );
    for path in &fixed.files {
        assert!(fixed.source.path_base().join(path).is_file());
    }
    assert_eq!(
        fixed.categories.categories().collect::<Vec<_>>(),
        ["fix_aer", "fix_am", "fix_lut"]
    );

    let models = &report.catalogs[1];
    assert_eq!(models.family, FamilyKind::ModelAnalysis);
    assert_eq!(
        models.archive_members,
        [
            "input_model_data/FV3GFS/gfs.t00z.atmanl.nc",
            "input_model_data/HRRR/hrrr.wrfprsf00.grib2",
            "input_model_data/README",
        ]
    );
    assert_eq!(
        models.categories.get("FV3GFS"),
        Some(["input_model_data/FV3GFS/gfs.t00z.atmanl.nc".to_string()].as_slice())
    );
    assert_eq!(models.uncategorized, 1);
    for path in &models.files {
        assert!(models.source.path_base().join(path).is_file());
    }

    let markdown = render_markdown_summary(&report);
    assert!(markdown.contains("## `input_model_data`"));
    Ok(())
}
