use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use chrono::DateTime;
use tracing::debug;

use super::{BucketLister, BucketObject, BucketRef, ObjectPage};
use crate::error::{Result, SyncError};

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Base URL objects are publicly served from.
    pub public_url: String,
}

/// S3-compatible listing (AWS, B2's S3 endpoint, MinIO, R2).
pub struct S3Lister {
    client: S3Client,
    public_url: String,
}

impl S3Lister {
    pub async fn connect(settings: &S3Settings) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                &settings.access_key,
                &settings.secret_key,
                None,
                None,
                "songs-sync",
            ))
            .load()
            .await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(ref endpoint) = settings.endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(s3_config.build()),
            public_url: settings.public_url.clone(),
        }
    }
}

/// `{public_url}/{object}`, escaping each path segment of the key.
pub fn public_object_url(public_url: &str, object_name: &str) -> String {
    let path: Vec<_> = object_name.split('/').map(urlencoding::encode).collect();
    format!("{}/{}", public_url.trim_end_matches('/'), path.join("/"))
}

#[async_trait]
impl BucketLister for S3Lister {
    fn backend_name(&self) -> &str {
        "s3"
    }

    async fn resolve_bucket(&self, name: Option<&str>) -> Result<BucketRef> {
        if let Some(name) = name {
            return match self.client.head_bucket().bucket(name).send().await {
                Ok(_) => Ok(BucketRef {
                    id: name.to_string(),
                    name: name.to_string(),
                }),
                Err(e) => match e.as_service_error() {
                    Some(service) if service.is_not_found() => {
                        Err(SyncError::BucketNotFound(name.to_string()))
                    }
                    _ => Err(SyncError::Auth(e.to_string())),
                },
            };
        }

        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        let first = output
            .buckets()
            .iter()
            .find_map(|b| b.name())
            .ok_or(SyncError::NoBuckets)?;

        Ok(BucketRef {
            id: first.to_string(),
            name: first.to_string(),
        })
    }

    async fn list_page(
        &self,
        bucket: &BucketRef,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&bucket.name)
            .max_keys(page_size.min(i32::MAX as u32) as i32);

        if let Some(token) = cursor {
            request = request.continuation_token(token);
        }

        debug!(bucket = %bucket.name, cursor = ?cursor, "list_objects_v2");
        let output = request
            .send()
            .await
            .map_err(|e| SyncError::Listing(e.to_string()))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|item| {
                let key = item.key()?;
                if key.ends_with('/') {
                    return None;
                }
                Some(BucketObject {
                    name: key.to_string(),
                    size: item.size().unwrap_or(0).max(0) as u64,
                    uploaded_at: item
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            })
            .collect();

        let next_cursor = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_cursor,
        })
    }

    fn object_url(&self, _bucket: &BucketRef, object_name: &str) -> String {
        public_object_url(&self.public_url, object_name)
    }
}
