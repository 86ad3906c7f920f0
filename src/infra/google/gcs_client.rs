// Cloud Storage through the JSON API.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::service_account::GoogleAuth;
use crate::core::migration::{
    gcs_uri, MigrationError, ObjectDownload, ObjectStore, StoredObject,
};

const API_BASE: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    /// The API sends sizes as decimal strings.
    size: Option<String>,
    content_type: Option<String>,
    updated: Option<DateTime<Utc>>,
}

impl From<ObjectResource> for StoredObject {
    fn from(object: ObjectResource) -> Self {
        Self {
            size: object
                .size
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            name: object.name,
            content_type: object.content_type,
            updated: object.updated,
        }
    }
}

pub struct GcsClient {
    client: Client,
    auth: Arc<GoogleAuth>,
    bucket: String,
}

impl GcsClient {
    pub fn new(client: Client, auth: Arc<GoogleAuth>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            auth,
            bucket: bucket.into(),
        }
    }

    async fn bearer(&self) -> Result<String, MigrationError> {
        self.auth
            .access_token()
            .await
            .map(|token| format!("Bearer {}", token))
            .map_err(|e| MigrationError::StorageError(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, MigrationError> {
        let size = data.len();
        let response = self
            .client
            .post(format!("{}/b/{}/o", UPLOAD_BASE, self.bucket))
            .query(&[("uploadType", "media"), ("name", key)])
            .header("Authorization", self.bearer().await?)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| MigrationError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MigrationError::Upload(format!("{}: {}", status, text)));
        }

        info!(bucket = %self.bucket, key, bytes = size, "Uploaded object");
        Ok(gcs_uri(&self.bucket, key))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>, MigrationError> {
        let url = format!("{}/b/{}/o", API_BASE, self.bucket);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(prefix) = prefix {
                query.push(("prefix", prefix));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .client
                .get(&url)
                .query(&query)
                .header("Authorization", self.bearer().await?)
                .send()
                .await
                .map_err(|e| MigrationError::ObjectRead(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(MigrationError::ObjectRead(format!("{}: {}", status, text)));
            }

            let page: ObjectList = response
                .json()
                .await
                .map_err(|e| MigrationError::ObjectRead(e.to_string()))?;
            objects.extend(page.items.into_iter().map(StoredObject::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(bucket = %self.bucket, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn open(&self, key: &str) -> Result<ObjectDownload, MigrationError> {
        let response = self
            .client
            .get(object_url(&self.bucket, key))
            .query(&[("alt", "media")])
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .map_err(|e| MigrationError::ObjectRead(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(MigrationError::ObjectNotFound(key.to_string())),
            status => {
                let text = response.text().await.unwrap_or_default();
                return Err(MigrationError::ObjectRead(format!("{}: {}", status, text)));
            }
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = response
            .bytes_stream()
            .map_err(|e| MigrationError::ObjectRead(e.to_string()));

        Ok(ObjectDownload {
            content_type,
            content_length,
            body: Box::pin(body),
        })
    }
}

/// Object names go into the path percent-encoded, slashes included.
fn object_url(bucket: &str, key: &str) -> String {
    format!("{}/b/{}/o/{}", API_BASE, bucket, urlencoding::encode(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_key() {
        assert_eq!(
            object_url("content", "listening_tarea1/a b.mp3"),
            "https://storage.googleapis.com/storage/v1/b/content/o/listening_tarea1%2Fa%20b.mp3"
        );
    }

    #[test]
    fn test_object_list_page_is_parsed() {
        let page: ObjectList = serde_json::from_str(
            r#"{
                "kind": "storage#objects",
                "nextPageToken": "CgRhYmM=",
                "items": [
                    {
                        "name": "listening_tarea1/abc.mp3",
                        "size": "48213",
                        "contentType": "audio/mpeg",
                        "updated": "2024-05-01T10:00:00.000Z"
                    },
                    { "name": "listening_tarea1/" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("CgRhYmM="));
        let objects: Vec<StoredObject> = page.items.into_iter().map(StoredObject::from).collect();
        assert_eq!(objects[0].size, 48213);
        assert_eq!(objects[0].content_type.as_deref(), Some("audio/mpeg"));
        assert!(objects[0].updated.is_some());
        assert_eq!(objects[1].size, 0);
    }

    #[test]
    fn test_empty_bucket_listing() {
        let page: ObjectList = serde_json::from_str(r#"{"kind": "storage#objects"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
