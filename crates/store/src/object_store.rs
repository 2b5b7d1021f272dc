use async_trait::async_trait;
use diagnostics::*;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use std::path::Path;

use crate::StoreError;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// S3-compatible endpoint, e.g. `https://s3.storage.example`.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Path-style addressing; the usual choice for non-AWS endpoints.
    pub path_style: bool,
}

/// Client for one bucket of an S3-compatible object store.
pub struct ObjectStore {
    bucket: Box<Bucket>,
    bucket_name: String,
}

impl ObjectStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(ObjectStore {
            bucket: Box::new(bucket),
            bucket_name: config.bucket,
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// Whether `key` is present, optionally verifying its stored size.
    ///
    /// An object with the wrong size is deleted and reported absent so the
    /// caller re-uploads it in full.
    pub async fn exists(&self, key: &str, expected_size: Option<u64>) -> Result<bool, StoreError> {
        let head = match self.bucket.head_object(key).await {
            Ok((head, code)) if (200..300).contains(&code) => head,
            Ok((_, 404)) => return Ok(false),
            Ok((_, code)) => return Err(StoreError::UnexpectedStatus { code }),
            Err(S3Error::HttpFailWithBody(404, _)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let Some(expected) = expected_size else {
            return Ok(true);
        };

        match head.content_length {
            Some(actual) if actual == expected as i64 => Ok(true),
            actual => {
                let stored = actual.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string());
                warn!("Object {key} has length {stored}, expected {expected}; deleting for re-upload");
                self.delete(key).await?;
                Ok(false)
            }
        }
    }

    /// Stream a local file into the bucket as `key`.
    pub async fn put_file(&self, path: &Path, key: &str) -> Result<(), StoreError> {
        let display = path.display().to_string();
        info!("Uploading file={display} to object store as key={key}");

        let mut file = tokio::fs::File::open(path).await?;
        let response = self.bucket.put_object_stream(&mut file, key).await?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StoreError::UnexpectedStatus { code });
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        info!("Deleting object key={key}");
        self.bucket.delete_object(key).await?;
        Ok(())
    }

    /// Mint a presigned GET URL for `key`, valid for `ttl_secs`.
    pub async fn presign_get(&self, key: &str, ttl_secs: u32) -> Result<String, StoreError> {
        let url = self.bucket.presign_get(key, ttl_secs, None).await?;
        debug!("Presigned {key} for {ttl_secs} seconds");
        Ok(url)
    }

    /// Read `len` bytes of `key` starting at `offset`.
    pub async fn read_range(
        &self,
        key: &str,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, StoreError> {
        let end = offset + len - 1;
        let response = self.bucket.get_object_range(key, offset, Some(end)).await?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StoreError::UnexpectedStatus { code });
        }
        Ok(response.to_vec())
    }
}

impl From<StoreError> for engine::SyncError {
    fn from(err: StoreError) -> Self {
        engine::SyncError::Transient(err.to_string())
    }
}

#[async_trait]
impl engine::AssetStore for ObjectStore {
    async fn exists(
        &self,
        key: &str,
        expected_size: Option<u64>,
    ) -> Result<bool, engine::SyncError> {
        Ok(ObjectStore::exists(self, key, expected_size).await?)
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), engine::SyncError> {
        Ok(ObjectStore::put_file(self, path, key).await?)
    }
}
