use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket {bucket} does not exist")]
    NoSuchBucket { bucket: String },
    #[error("object s3://{bucket}/{key} does not exist")]
    NoSuchKey { bucket: String, key: String },
    #[error("unknown bucket label '{label}' (expected rt, srw or land-da)")]
    UnknownBucketLabel { label: String },
    #[error("invalid object key '{key}'")]
    InvalidKey { key: String },
    #[error("object store request failed: {message}")]
    Backend { message: String },
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Flat key/value object storage addressed by bucket and key.
pub trait ObjectStore {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError>;
    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError>;
    fn list_keys_with_prefix(&self, bucket: &str, prefix: &str)
        -> Result<Vec<String>, StoreError>;

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        self.list_keys_with_prefix(bucket, "")
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        (**self).put(bucket, key, local_path)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(bucket, key)
    }

    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        (**self).copy(bucket, source_key, dest_key)
    }

    fn list_keys_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        (**self).list_keys_with_prefix(bucket, prefix)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        (**self).put(bucket, key, local_path)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(bucket, key)
    }

    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        (**self).copy(bucket, source_key, dest_key)
    }

    fn list_keys_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        (**self).list_keys_with_prefix(bucket, prefix)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let path = Path::new(key);
    let normal = path
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if key.is_empty() || key.ends_with('/') || !normal {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Buckets are directories under `root`; keys are file paths inside them.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let path = self.root.join(bucket);
        fs::create_dir_all(&path).map_err(|err| StoreError::io(&path, err))
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let path = self.root.join(bucket);
        if bucket.is_empty() || !path.is_dir() {
            return Err(StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(path)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn existing_object(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(path)
    }

    fn write_object(&self, source: &Path, dest: &Path) -> Result<(), StoreError> {
        let mut reader = File::open(source).map_err(|err| StoreError::io(source, err))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        let mut writer = File::create(dest).map_err(|err| StoreError::io(dest, err))?;
        io::copy(&mut reader, &mut writer).map_err(|err| StoreError::io(dest, err))?;
        Ok(())
    }

    // Removes directories left empty by a delete, stopping at the bucket.
    fn prune_empty_parents(&self, bucket_dir: &Path, object: &Path) {
        let mut current = object.parent();
        while let Some(dir) = current {
            if dir == bucket_dir || fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let dest = self.object_path(bucket, key)?;
        self.write_object(local_path, &dest)?;
        debug!("stored {} as {}/{}", local_path.display(), bucket, key);
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.existing_object(bucket, key)?;
        fs::remove_file(&path).map_err(|err| StoreError::io(&path, err))?;
        self.prune_empty_parents(&self.bucket_dir(bucket)?, &path);
        Ok(())
    }

    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        let source = self.existing_object(bucket, source_key)?;
        let dest = self.object_path(bucket, dest_key)?;
        self.write_object(&source, &dest)
    }

    fn list_keys_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        for entry in WalkDir::new(&bucket_dir).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| bucket_dir.clone());
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                StoreError::Io { path, source }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

type Buckets = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// In-process buckets, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<Buckets>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = names
            .into_iter()
            .map(|name| (name.into(), BTreeMap::new()))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let buckets = self.lock();
        buckets.get(bucket)?.get(key).cloned()
    }

    // Every operation leaves the map consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn no_such_bucket(bucket: &str) -> StoreError {
    StoreError::NoSuchBucket {
        bucket: bucket.to_string(),
    }
}

fn no_such_key(bucket: &str, key: &str) -> StoreError {
    StoreError::NoSuchKey {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        validate_key(key)?;
        let body = fs::read(local_path).map_err(|err| StoreError::io(local_path, err))?;
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| no_such_key(bucket, key))
    }

    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        validate_key(dest_key)?;
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        let body = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| no_such_key(bucket, source_key))?;
        objects.insert(dest_key.to_string(), body);
        Ok(())
    }

    fn list_keys_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let buckets = self.lock();
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
