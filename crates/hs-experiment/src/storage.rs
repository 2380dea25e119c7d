//! Object storage keyed by bucket and object key.

use hs_types::RemoteServiceError;
use rand::Rng;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const BUCKET_SUFFIX_LEN: usize = 10;
const BUCKET_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Bucket/object storage used for datasets, bundles and training logs.
pub trait ObjectStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), RemoteServiceError>;

    fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteServiceError>;

    fn upload(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), RemoteServiceError>;

    fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, RemoteServiceError>;

    /// Keys in `bucket` starting with `prefix`, sorted.
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, RemoteServiceError>;
}

/// Create a bucket named `<prefix><10 random lowercase alphanumerics>`.
pub fn create_unique_bucket(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<String, RemoteServiceError> {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (0..BUCKET_SUFFIX_LEN)
            .map(|_| BUCKET_SUFFIX_CHARSET[rng.gen_range(0..BUCKET_SUFFIX_CHARSET.len())] as char)
            .collect();
        let bucket = format!("{prefix}{suffix}");
        if !store.bucket_exists(&bucket)? {
            store.create_bucket(&bucket)?;
            return Ok(bucket);
        }
        debug!(bucket = %bucket, "bucket name taken, drawing another");
    }
}

/// Directory-backed store: buckets are directories under `root`, keys are
/// relative paths inside them.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the platform data directory.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join("hypersweep").join("objects")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, operation: &str, bucket: &str) -> Result<PathBuf, RemoteServiceError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(RemoteServiceError::new(
                operation,
                format!("invalid bucket name `{bucket}`"),
            ));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(
        &self,
        operation: &str,
        bucket: &str,
        key: &str,
    ) -> Result<PathBuf, RemoteServiceError> {
        let bucket_path = self.bucket_path(operation, bucket)?;
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(RemoteServiceError::new(
                operation,
                format!("invalid object key `{key}`"),
            ));
        }
        if !bucket_path.is_dir() {
            return Err(RemoteServiceError::new(
                operation,
                format!("bucket `{bucket}` does not exist"),
            ));
        }
        Ok(bucket_path.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn create_bucket(&self, bucket: &str) -> Result<(), RemoteServiceError> {
        let path = self.bucket_path("create_bucket", bucket)?;
        fs::create_dir_all(&path).map_err(|e| RemoteServiceError::new("create_bucket", e.to_string()))?;
        info!(bucket = bucket, "bucket created");
        Ok(())
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteServiceError> {
        Ok(self.bucket_path("bucket_exists", bucket)?.is_dir())
    }

    fn upload(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), RemoteServiceError> {
        let path = self.object_path("upload", bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteServiceError::new("upload", e.to_string()))?;
        }
        fs::write(&path, data).map_err(|e| RemoteServiceError::new("upload", e.to_string()))?;
        debug!(bucket = bucket, key = key, bytes = data.len(), "object uploaded");
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, RemoteServiceError> {
        let path = self.object_path("download", bucket, key)?;
        fs::read(&path).map_err(|e| RemoteServiceError::new("download", format!("{bucket}/{key}: {e}")))
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, RemoteServiceError> {
        let bucket_path = self.bucket_path("list_objects", bucket)?;
        if !bucket_path.is_dir() {
            return Err(RemoteServiceError::new(
                "list_objects",
                format!("bucket `{bucket}` does not exist"),
            ));
        }

        let mut keys = Vec::new();
        collect_keys(&bucket_path, "", &mut keys)
            .map_err(|e| RemoteServiceError::new("list_objects", e.to_string()))?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}
