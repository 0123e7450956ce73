use super::{ListPage, ObjectStore, StoreError};
use crate::infrastructure::config::R2Config;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;

const PAGE_SIZE: i32 = 1000;

/// Cloudflare R2 through the S3 API
pub struct R2Store {
    client: S3Client,
    bucket: String,
}

impl R2Store {
    pub fn new(config: &R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "r2-static",
        );

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(config.endpoint_url.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        tracing::info!(bucket = %config.bucket, endpoint = %config.endpoint_url, "R2 client initialized");

        Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for R2Store {
    fn name(&self) -> &str {
        "r2"
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(PAGE_SIZE)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, bucket = %self.bucket, prefix = %prefix, "R2 listing failed");
                StoreError::Transport(format!("R2 list_objects_v2 error: {}", e))
            })?;

        let keys = resp
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        Ok(ListPage {
            keys,
            next_token: resp.next_continuation_token().map(str::to_string),
            has_more: resp.is_truncated().unwrap_or(false),
        })
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|service_err| service_err.is_not_found())
                    .unwrap_or(false);
                let raw_404 = e
                    .raw_response()
                    .map(|raw| raw.status().as_u16() == 404)
                    .unwrap_or(false);

                if not_found || raw_404 {
                    Ok(false)
                } else {
                    Err(StoreError::Transport(format!("R2 head_object error: {}", e)))
                }
            }
        }
    }

    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::LocalFile(format!("{}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|raw| raw.status().as_u16());
                match status {
                    Some(status) if (400..500).contains(&status) => StoreError::Rejected {
                        status,
                        message: format!("R2 put_object rejected {}", key),
                    },
                    _ => StoreError::Transport(format!("R2 put_object error: {}", e)),
                }
            })?;

        tracing::debug!(key = %key, bucket = %self.bucket, "R2 upload complete");
        Ok(())
    }
}
