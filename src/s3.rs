use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    primitives::ByteStream,
    Client as S3Client,
};
use tracing::debug;

use crate::config::StorageSettings;
use crate::traits::{ObjectStore, StorageError};

/// Builds an S3 client from the storage settings.
///
/// Explicit access keys win over the default AWS credential chain; a custom
/// endpoint switches to path-style addressing for S3-compatible services.
pub async fn build_client(settings: &StorageSettings) -> Result<S3Client> {
    let region = Region::new(settings.region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region)).or_default_provider();

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(endpoint) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        settings.access_key_id.clone(),
        settings.secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(settings.endpoint_url.is_some())
        .build();

    Ok(S3Client::from_conf(s3_config))
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, local: &Path, object_name: &str) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|source| StorageError::Access {
                path: local.to_path_buf(),
                source,
            })?;
        let content_type = mime_guess::from_path(object_name)
            .first_or_octet_stream()
            .to_string();

        debug!(object = object_name, len = bytes.len(), "Putting object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_name)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Service {
                object: object_name.to_string(),
                reason: aws_sdk_s3::error::DisplayErrorContext(e).to_string(),
            })?;

        Ok(())
    }
}
