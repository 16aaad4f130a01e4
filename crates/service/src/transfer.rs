use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use hpc_catalog_core::{strip_relative_root, CategoryMapping};
use tracing::info;

use crate::bucket::BucketProfile;
use crate::store::ObjectStore;

/// Transfers cataloged files into one bucket and maintains its keys.
pub struct Uploader<S> {
    store: S,
    bucket: BucketProfile,
    work_dir: PathBuf,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S, bucket: BucketProfile, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            bucket,
            work_dir: work_dir.into(),
        }
    }

    pub fn bucket(&self) -> &BucketProfile {
        &self.bucket
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Uploads `work_dir/<relative_path>` under the key `relative_path`.
    pub fn upload_file(&self, relative_path: &str) -> Result<String> {
        let started = Instant::now();
        let key = strip_relative_root(relative_path);
        let local = self.work_dir.join(key);
        self.store
            .put(&self.bucket.bucket, key, &local)
            .with_context(|| {
                format!(
                    "failed to upload {} to {}",
                    local.display(),
                    self.bucket.bucket
                )
            })?;
        let minutes = started.elapsed().as_secs_f64() / 60.0;
        info!(
            "uploaded {} to s3://{}/{} in {:.3} min",
            local.display(),
            self.bucket.bucket,
            key,
            minutes
        );
        Ok(key.to_string())
    }

    pub fn upload_catalog(&self, categories: &CategoryMapping) -> Result<usize> {
        let mut uploaded = 0;
        for (category, paths) in categories.iter() {
            info!("uploading {} file(s) filed under {}", paths.len(), category);
            for path in paths {
                self.upload_file(path)?;
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }

    pub fn purge(&self, key: &str) -> Result<()> {
        self.store
            .delete(&self.bucket.bucket, key)
            .with_context(|| format!("failed to delete {} from {}", key, self.bucket.bucket))?;
        info!("deleted s3://{}/{}", self.bucket.bucket, key);
        Ok(())
    }

    pub fn purge_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let keys = self
            .store
            .list_keys_with_prefix(&self.bucket.bucket, prefix)
            .with_context(|| {
                format!(
                    "failed to list {} keys under '{}'",
                    self.bucket.bucket, prefix
                )
            })?;
        for key in &keys {
            self.purge(key)?;
        }
        info!(
            "deleted {} object(s) prefixed '{}' from {}",
            keys.len(),
            prefix,
            self.bucket.bucket
        );
        Ok(keys)
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.store
            .list_keys(&self.bucket.bucket)
            .with_context(|| format!("failed to list keys of {}", self.bucket.bucket))
    }

    /// Writes every key of the bucket, one per line, to `<bucket>_objects.csv`.
    pub fn write_key_listing(&self, output_dir: &Path) -> Result<PathBuf> {
        let keys = self.list_keys()?;
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let path = output_dir.join(format!("{}_objects.csv", self.bucket.bucket));
        let mut body = String::new();
        for key in &keys {
            body.push_str(key);
            body.push('\n');
        }
        fs::write(&path, body)
            .with_context(|| format!("failed to write key listing {}", path.display()))?;
        info!("listed {} key(s) of {} in {}", keys.len(), self.bucket.bucket, path.display());
        Ok(path)
    }

    pub fn rename(&self, source_key: &str, new_key: &str) -> Result<()> {
        self.store
            .copy(&self.bucket.bucket, source_key, new_key)
            .with_context(|| format!("failed to copy {} to {}", source_key, new_key))?;
        self.store
            .delete(&self.bucket.bucket, source_key)
            .with_context(|| format!("failed to delete renamed object {}", source_key))?;
        info!("renamed {} to {} in {}", source_key, new_key, self.bucket.bucket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use hpc_catalog_core::{
        build_catalog, self_named_markers, CategoryMapping, DatasetFamily, ExclusionMode,
        FamilyKind, FamilySource,
    };
    use tempfile::TempDir;

    use super::Uploader;
    use crate::bucket::BucketProfile;
    use crate::store::{MemoryObjectStore, ObjectStore};

    const BUCKET: &str = "noaa-ufs-land-da-pds";

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, relative.as_bytes()).expect("write file");
    }

    fn uploader(work_dir: &Path) -> Uploader<MemoryObjectStore> {
        Uploader::new(
            MemoryObjectStore::with_buckets([BUCKET]),
            BucketProfile::from_label("land-da").expect("land-da"),
            work_dir,
        )
    }

    #[test]
    fn upload_file_strips_leading_dot_slash_from_key() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "fix/fix_aer/a.nc");
        let uploader = uploader(dir.path());

        let key = uploader.upload_file("./fix/fix_aer/a.nc").expect("upload");
        assert_eq!(key, "fix/fix_aer/a.nc");
        assert_eq!(
            uploader.store().object(BUCKET, "fix/fix_aer/a.nc").as_deref(),
            Some(b"fix/fix_aer/a.nc".as_slice())
        );
    }

    #[test]
    fn upload_catalog_uploads_every_categorized_path() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "input_model_data/HRRR/h.grib2");
        touch(dir.path(), "input_model_data/RAP/r.grib2");
        let mut categories = CategoryMapping::new();
        categories.push("HRRR", "input_model_data/HRRR/h.grib2".to_string());
        categories.push("RAP", "input_model_data/RAP/r.grib2".to_string());
        let uploader = uploader(dir.path());

        assert_eq!(uploader.upload_catalog(&categories).expect("upload"), 2);
        assert_eq!(
            uploader.list_keys().expect("keys"),
            ["input_model_data/HRRR/h.grib2", "input_model_data/RAP/r.grib2"]
        );
    }

    #[test]
    fn directory_catalog_from_absolute_root_uploads_relative_keys() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "develop/fix/fix_aer/a.nc");
        touch(dir.path(), "develop/fix/fix_orog/b.nc");
        let root = dir.path().join("develop/fix");
        assert!(root.is_absolute());
        let family = DatasetFamily {
            kind: FamilyKind::Fixed,
            source: FamilySource::Directory { root },
            exclusions: None,
            exclusion_mode: ExclusionMode::AnyMatch,
            markers: self_named_markers(["fix_aer", "fix_orog"]),
        };

        let catalog = build_catalog(&family).expect("catalog builds");
        let uploader = uploader(&catalog.source.path_base());
        assert_eq!(uploader.upload_catalog(&catalog.categories).expect("upload"), 2);
        assert_eq!(
            uploader.list_keys().expect("keys"),
            ["fix/fix_aer/a.nc", "fix/fix_orog/b.nc"]
        );
    }

    #[test]
    fn archive_catalog_skips_excluded_members_on_upload() {
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
        let uploader = uploader(&catalog.source.path_base());
        assert_eq!(uploader.upload_catalog(&catalog.categories).expect("upload"), 1);
        assert_eq!(uploader.list_keys().expect("keys"), ["fix/fix_aer/a.nc"]);
    }

    #[test]
    fn missing_local_file_fails_upload() {
        let dir = TempDir::new().expect("tempdir");
        let uploader = uploader(dir.path());
        let categories = CategoryMapping::from(BTreeMap::from([(
            "NAM".to_string(),
            vec!["input_model_data/NAM/missing.grib2".to_string()],
        )]));
        assert!(uploader.upload_catalog(&categories).is_err());
    }

    #[test]
    fn purge_by_prefix_removes_only_matching_keys() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "fix/fix_am/a.grb");
        touch(dir.path(), "fix/fix_am/b.grb");
        touch(dir.path(), "fix/fix_lut/c.dat");
        let uploader = uploader(dir.path());
        for path in ["fix/fix_am/a.grb", "fix/fix_am/b.grb", "fix/fix_lut/c.dat"] {
            uploader.upload_file(path).expect("upload");
        }

        let deleted = uploader.purge_by_prefix("fix/fix_am/").expect("purge");
        assert_eq!(deleted, ["fix/fix_am/a.grb", "fix/fix_am/b.grb"]);
        assert_eq!(uploader.list_keys().expect("keys"), ["fix/fix_lut/c.dat"]);

        uploader.purge("fix/fix_lut/c.dat").expect("purge key");
        assert!(uploader.list_keys().expect("keys").is_empty());
        assert!(uploader.purge("fix/fix_lut/c.dat").is_err());
    }

    #[test]
    fn rename_moves_object_to_new_key() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "NaturalEarth/shapefiles/coast.shp");
        let uploader = uploader(dir.path());
        uploader
            .upload_file("NaturalEarth/shapefiles/coast.shp")
            .expect("upload");

        uploader
            .rename(
                "NaturalEarth/shapefiles/coast.shp",
                "NaturalEarth/shapefiles/ne_coast.shp",
            )
            .expect("rename");
        assert_eq!(
            uploader.store().list_keys(BUCKET).expect("keys"),
            ["NaturalEarth/shapefiles/ne_coast.shp"]
        );
    }

    #[test]
    fn key_listing_is_written_per_bucket() {
        let dir = TempDir::new().expect("tempdir");
        touch(dir.path(), "fix/fix_orog/o.nc");
        touch(dir.path(), "fix/fix_aer/a.nc");
        let uploader = uploader(dir.path());
        uploader.upload_file("fix/fix_orog/o.nc").expect("upload");
        uploader.upload_file("fix/fix_aer/a.nc").expect("upload");

        let path = uploader
            .write_key_listing(&dir.path().join("results"))
            .expect("listing");
        assert!(path.ends_with("noaa-ufs-land-da-pds_objects.csv"));
        let body = fs::read_to_string(path).expect("read listing");
        assert_eq!(body, "fix/fix_aer/a.nc\nfix/fix_orog/o.nc\n");
    }
}
