use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use super::{BucketLister, BucketObject, BucketRef, ObjectPage};
use crate::error::{Result, SyncError};

// ---------------------------------------------------------------------------
// B2 API types
// ---------------------------------------------------------------------------

const B2_AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2Authorization {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Deserialize)]
struct B2BucketList {
    buckets: Vec<B2Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2Bucket {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2FileList {
    files: Vec<B2File>,
    next_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct B2File {
    file_name: String,
    #[serde(default)]
    content_length: u64,
    upload_timestamp: Option<i64>,
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct B2ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl B2FileList {
    fn into_page(self) -> ObjectPage {
        let objects = self
            .files
            .into_iter()
            .filter(|f| f.action.as_deref().map_or(true, |a| a == "upload"))
            .map(|f| BucketObject {
                name: f.file_name,
                size: f.content_length,
                uploaded_at: f.upload_timestamp.and_then(DateTime::from_timestamp_millis),
            })
            .collect();

        ObjectPage {
            objects,
            next_cursor: self.next_file_name,
        }
    }
}

/// `{download_url}/file/{bucket}/{object}` with the object name escaped.
pub fn download_url(base: &str, bucket_name: &str, object_name: &str) -> String {
    format!(
        "{}/file/{}/{}",
        base.trim_end_matches('/'),
        bucket_name,
        urlencoding::encode(object_name)
    )
}

fn describe_failure(status: u16, body: &str) -> String {
    match serde_json::from_str::<B2ErrorBody>(body) {
        Ok(B2ErrorBody {
            code: Some(code),
            message,
        }) => format!("HTTP {} {}: {}", status, code, message.unwrap_or_default()),
        _ => format!("HTTP {}", status),
    }
}

// ---------------------------------------------------------------------------
// Lister
// ---------------------------------------------------------------------------

/// Backblaze B2 native API client holding an authorized session.
pub struct B2Lister {
    client: Client,
    session: B2Authorization,
}

impl B2Lister {
    /// Authorize the account. Any failure here is fatal.
    pub async fn connect(client: Client, key_id: &str, app_key: &str) -> Result<Self> {
        let resp = client
            .get(B2_AUTHORIZE_URL)
            .basic_auth(key_id, Some(app_key))
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("Request failed: {}", e)))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| SyncError::Auth(format!("Read body failed: {}", e)))?;
        if status != 200 {
            return Err(SyncError::Auth(describe_failure(status, &body)));
        }

        let session: B2Authorization = serde_json::from_str(&body)
            .map_err(|e| SyncError::Auth(format!("Parse error: {}", e)))?;
        info!(api_url = %session.api_url, account = %session.account_id, "Authorized with B2");

        Ok(Self { client, session })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: JsonValue,
    ) -> std::result::Result<T, (u16, String)> {
        let url = format!("{}/b2api/v2/{}", self.session.api_url, endpoint);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.session.authorization_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| (0, format!("Request failed: {}", e)))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| (status, format!("Read body failed: {}", e)))?;
        if status != 200 {
            return Err((status, describe_failure(status, &text)));
        }

        serde_json::from_str(&text).map_err(|e| (status, format!("Parse error: {}", e)))
    }
}

#[async_trait]
impl BucketLister for B2Lister {
    fn backend_name(&self) -> &str {
        "b2"
    }

    async fn resolve_bucket(&self, name: Option<&str>) -> Result<BucketRef> {
        let mut body = json!({ "accountId": self.session.account_id });
        if let Some(name) = name {
            body["bucketName"] = JsonValue::from(name);
        }

        let list: B2BucketList = self.call("b2_list_buckets", body).await.map_err(
            |(status, msg)| match status {
                401 | 403 => SyncError::Auth(msg),
                _ => SyncError::Listing(msg),
            },
        )?;

        let found = match name {
            Some(name) => list
                .buckets
                .into_iter()
                .find(|b| b.bucket_name == name)
                .ok_or_else(|| SyncError::BucketNotFound(name.to_string()))?,
            None => list.buckets.into_iter().next().ok_or(SyncError::NoBuckets)?,
        };

        Ok(BucketRef {
            id: found.bucket_id,
            name: found.bucket_name,
        })
    }

    async fn list_page(
        &self,
        bucket: &BucketRef,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ObjectPage> {
        let mut body = json!({
            "bucketId": bucket.id,
            "maxFileCount": page_size,
        });
        if let Some(start) = cursor {
            body["startFileName"] = JsonValue::from(start);
        }

        debug!(bucket = %bucket.name, cursor = ?cursor, "b2_list_file_names");
        let list: B2FileList = self
            .call("b2_list_file_names", body)
            .await
            .map_err(|(_, msg)| SyncError::Listing(msg))?;

        Ok(list.into_page())
    }

    fn object_url(&self, bucket: &BucketRef, object_name: &str) -> String {
        download_url(&self.session.download_url, &bucket.name, object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_converts_to_page() {
        let raw = r#"{
            "files": [
                {"fileName": "a.mp3", "contentLength": 1234, "uploadTimestamp": 1700000000000, "action": "upload"},
                {"fileName": "dir/", "contentLength": 0, "uploadTimestamp": 0, "action": "folder"},
                {"fileName": "b.mp3", "contentLength": 99}
            ],
            "nextFileName": "c.mp3"
        }"#;
        let list: B2FileList = serde_json::from_str(raw).unwrap();
        let page = list.into_page();

        assert_eq!(page.next_cursor.as_deref(), Some("c.mp3"));
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].name, "a.mp3");
        assert_eq!(page.objects[0].size, 1234);
        assert_eq!(
            page.objects[0].uploaded_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert!(page.objects[1].uploaded_at.is_none());
    }

    #[test]
    fn last_page_has_no_cursor() {
        let list: B2FileList =
            serde_json::from_str(r#"{"files": [], "nextFileName": null}"#).unwrap();
        assert!(list.into_page().next_cursor.is_none());
    }

    #[test]
    fn download_url_escapes_object_name() {
        assert_eq!(
            download_url("https://f003.backblazeb2.com/", "music", "Artist - Song (Live).mp3"),
            "https://f003.backblazeb2.com/file/music/Artist%20-%20Song%20%28Live%29.mp3"
        );
    }

    #[test]
    fn failure_description_uses_b2_error_body() {
        let body = r#"{"status": 401, "code": "bad_auth_token", "message": "Invalid token"}"#;
        assert_eq!(describe_failure(401, body), "HTTP 401 bad_auth_token: Invalid token");
        assert_eq!(describe_failure(500, "<html>"), "HTTP 500");
    }
}
