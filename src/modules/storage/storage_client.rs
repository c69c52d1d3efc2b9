//! Supabase Storage API client
//!
//! Speaks only the bucket and object endpoints the connection forwards to.
//! Object paths arrive already normalized (no leading `/`).

use bytes::Bytes;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use validator::Validate;

use crate::core::error::{ConnectorError, Result};
use crate::modules::storage::dtos::{
    Bucket, BucketOptions, FileObject, ListOptions, SignedUploadUrl, SignedUrl, UploadResponse,
};
use crate::modules::transport::{encode_path, HttpRequest, Requester, Service};
use crate::shared::constants::{DEFAULT_UPLOAD_CACHE_CONTROL, STORAGE_PATH};
use crate::shared::payload::NormalizedPayload;

#[derive(Debug, Deserialize)]
struct RawUploadResponse {
    #[serde(rename = "Key", default)]
    key: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSignedUrl {
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "signedURL", alias = "signedUrl", default)]
    signed_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSignedUploadUrl {
    url: String,
}

/// Client for the project's `/storage/v1` endpoint
#[derive(Clone)]
pub struct StorageClient {
    requester: Requester,
}

impl StorageClient {
    pub fn new(requester: Requester) -> Self {
        Self { requester }
    }

    fn storage_url(&self) -> String {
        format!("{}{}", self.requester.base_url(), STORAGE_PATH)
    }

    /// Make a server-relative URL (`/object/sign/...`) absolute; absolute URLs pass through
    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!("{}/{}", self.storage_url(), url.trim_start_matches('/'))
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let request = HttpRequest::new(Method::GET, Service::Storage, "/bucket");
        self.requester.send(request).await?.json()
    }

    pub async fn get_bucket(&self, bucket_id: &str) -> Result<Bucket> {
        let request = HttpRequest::new(
            Method::GET,
            Service::Storage,
            format!("/bucket/{}", urlencoding::encode(bucket_id)),
        );
        self.requester.send(request).await?.json()
    }

    pub async fn create_bucket(&self, bucket_id: &str, options: &BucketOptions) -> Result<Value> {
        options.validate()?;
        let request = HttpRequest::new(Method::POST, Service::Storage, "/bucket")
            .json(bucket_body(bucket_id, options));
        let body = self.requester.send(request).await?.json_value()?;
        info!("Created bucket '{}' (public={})", bucket_id, options.public);
        Ok(body)
    }

    pub async fn update_bucket(&self, bucket_id: &str, options: &BucketOptions) -> Result<Value> {
        options.validate()?;
        let request = HttpRequest::new(
            Method::PUT,
            Service::Storage,
            format!("/bucket/{}", urlencoding::encode(bucket_id)),
        )
        .json(bucket_body(bucket_id, options));
        let body = self.requester.send(request).await?.json_value()?;
        info!("Updated bucket '{}'", bucket_id);
        Ok(body)
    }

    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<Value> {
        let request = HttpRequest::new(
            Method::DELETE,
            Service::Storage,
            format!("/bucket/{}", urlencoding::encode(bucket_id)),
        );
        let body = self.requester.send(request).await?.json_value()?;
        info!("Deleted bucket '{}'", bucket_id);
        Ok(body)
    }

    /// Remove every object in the bucket, keeping the bucket
    pub async fn empty_bucket(&self, bucket_id: &str) -> Result<Value> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            format!("/bucket/{}/empty", urlencoding::encode(bucket_id)),
        );
        let body = self.requester.send(request).await?.json_value()?;
        info!("Emptied bucket '{}'", bucket_id);
        Ok(body)
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Upload `payload` to `bucket_id/path`; `overwrite` replaces an existing object
    pub async fn upload(
        &self,
        bucket_id: &str,
        path: &str,
        payload: &NormalizedPayload,
        overwrite: bool,
    ) -> Result<UploadResponse> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            object_path(bucket_id, path),
        )
        .header("cache-control", format!("max-age={}", DEFAULT_UPLOAD_CACHE_CONTROL))
        .header("x-upsert", overwrite.to_string())
        .bytes(payload.data.clone(), payload.content_type.clone());

        let raw: RawUploadResponse = self.requester.send(request).await?.json()?;
        info!(
            "Uploaded {} bytes to {}/{} ({})",
            payload.data.len(),
            bucket_id,
            path,
            payload.content_type
        );

        Ok(UploadResponse {
            path: path.to_string(),
            key: raw.key,
            id: raw.id,
        })
    }

    pub async fn download(&self, bucket_id: &str, path: &str) -> Result<Bytes> {
        let request = HttpRequest::new(
            Method::GET,
            Service::Storage,
            object_path(bucket_id, path),
        );
        let response = self.requester.send(request).await?;
        debug!(
            "Downloaded {} bytes from {}/{}",
            response.body.len(),
            bucket_id,
            path
        );
        Ok(response.body)
    }

    /// Move (and optionally rename) an object within a bucket
    pub async fn move_object(&self, bucket_id: &str, from_path: &str, to_path: &str) -> Result<Value> {
        let request = HttpRequest::new(Method::POST, Service::Storage, "/object/move").json(json!({
            "bucketId": bucket_id,
            "sourceKey": from_path,
            "destinationKey": to_path,
        }));
        let body = self.requester.send(request).await?.json_value()?;
        info!("Moved {}/{} to {}", bucket_id, from_path, to_path);
        Ok(body)
    }

    /// Delete objects; returns the objects that were removed
    pub async fn remove(&self, bucket_id: &str, paths: &[String]) -> Result<Vec<FileObject>> {
        let request = HttpRequest::new(
            Method::DELETE,
            Service::Storage,
            format!("/object/{}", urlencoding::encode(bucket_id)),
        )
        .json(json!({ "prefixes": paths }));
        let removed: Vec<FileObject> = self.requester.send(request).await?.json()?;
        info!("Removed {} object(s) from {}", removed.len(), bucket_id);
        Ok(removed)
    }

    pub async fn list(&self, bucket_id: &str, options: &ListOptions) -> Result<Vec<FileObject>> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            format!("/object/list/{}", urlencoding::encode(bucket_id)),
        )
        .json(json!({
            "prefix": options.path.as_deref().unwrap_or(""),
            "limit": options.limit,
            "offset": options.offset,
            "sortBy": {
                "column": options.sort_by,
                "order": options.order,
            },
        }));
        self.requester.send(request).await?.json()
    }

    // =========================================================================
    // URLs
    // =========================================================================

    /// Signed download URL valid for `expires_in` seconds
    pub async fn create_signed_url(
        &self,
        bucket_id: &str,
        path: &str,
        expires_in: u64,
    ) -> Result<SignedUrl> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            format!("/object/sign/{}/{}", urlencoding::encode(bucket_id), encode_path(path)),
        )
        .json(json!({ "expiresIn": expires_in }));
        let raw: RawSignedUrl = self.requester.send(request).await?.json()?;

        Ok(SignedUrl {
            path: Some(path.to_string()),
            signed_url: raw.signed_url.map(|url| self.absolute_url(&url)),
            error: raw.error,
        })
    }

    pub async fn create_signed_urls(
        &self,
        bucket_id: &str,
        paths: &[String],
        expires_in: u64,
    ) -> Result<Vec<SignedUrl>> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            format!("/object/sign/{}", urlencoding::encode(bucket_id)),
        )
        .json(json!({ "expiresIn": expires_in, "paths": paths }));
        let raw: Vec<RawSignedUrl> = self.requester.send(request).await?.json()?;

        Ok(raw
            .into_iter()
            .map(|item| SignedUrl {
                path: item.path,
                signed_url: item
                    .signed_url
                    .filter(|url| !url.is_empty())
                    .map(|url| self.absolute_url(&url)),
                error: item.error,
            })
            .collect())
    }

    pub async fn create_signed_upload_url(&self, bucket_id: &str, path: &str) -> Result<SignedUploadUrl> {
        let request = HttpRequest::new(
            Method::POST,
            Service::Storage,
            format!(
                "/object/upload/sign/{}/{}",
                urlencoding::encode(bucket_id),
                encode_path(path)
            ),
        );
        let raw: RawSignedUploadUrl = self.requester.send(request).await?.json()?;

        let signed_url = self.absolute_url(&raw.url);
        let parsed = Url::parse(&signed_url).map_err(|e| {
            ConnectorError::Storage(format!("Invalid signed upload URL '{}': {}", signed_url, e))
        })?;
        let token = parsed
            .query_pairs()
            .find(|(name, _)| name == "token")
            .map(|(_, value)| value.into_owned())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConnectorError::Storage("No token sent by the API".to_string()))?;

        Ok(SignedUploadUrl {
            signed_url,
            token,
            path: path.to_string(),
        })
    }

    /// Upload with a token from [`StorageClient::create_signed_upload_url`]
    pub async fn upload_to_signed_url(
        &self,
        bucket_id: &str,
        path: &str,
        token: &str,
        payload: &NormalizedPayload,
    ) -> Result<UploadResponse> {
        let file_name = crate::shared::validation::file_name_of(path);
        let request = HttpRequest::new(
            Method::PUT,
            Service::Storage,
            format!(
                "/object/upload/sign/{}/{}",
                urlencoding::encode(bucket_id),
                encode_path(path)
            ),
        )
        .query("token", token)
        .header("x-upsert", "false")
        .multipart(
            "file",
            file_name,
            payload.data.clone(),
            payload.content_type.clone(),
        );

        let raw: RawUploadResponse = self.requester.send(request).await?.json()?;
        info!("Uploaded {} bytes to signed URL for {}/{}", payload.data.len(), bucket_id, path);

        Ok(UploadResponse {
            path: path.to_string(),
            key: raw.key,
            id: raw.id,
        })
    }

    /// URL of an object in a public bucket; computed locally
    pub fn get_public_url(&self, bucket_id: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.storage_url(),
            urlencoding::encode(bucket_id),
            encode_path(path)
        )
    }
}

fn object_path(bucket_id: &str, path: &str) -> String {
    format!("/object/{}/{}", urlencoding::encode(bucket_id), encode_path(path))
}

fn bucket_body(bucket_id: &str, options: &BucketOptions) -> Value {
    json!({
        "id": bucket_id,
        "name": options.name.as_deref().unwrap_or(bucket_id),
        "public": options.public,
        "file_size_limit": options.file_size_limit,
        "allowed_mime_types": options.allowed_mime_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::modules::transport::{HttpResponse, RequestBody};
    use crate::shared::test_helpers::{ScriptedTransport, TEST_BASE_URL};
    use reqwest::StatusCode;

    fn storage_with(transport: std::sync::Arc<ScriptedTransport>) -> StorageClient {
        StorageClient::new(Requester::new(transport))
    }

    #[tokio::test]
    async fn test_create_bucket_defaults_name_to_id() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK).with_json(&json!({"name": "avatars"})))
        });
        let storage = storage_with(transport.clone());

        let body = storage
            .create_bucket("avatars", &BucketOptions::default().public(true))
            .await
            .unwrap();
        assert_eq!(body["name"], "avatars");

        let requests = transport.requests();
        let sent = &requests[0];
        assert_eq!(sent.path, "/bucket");
        match &sent.body {
            RequestBody::Json(value) => {
                assert_eq!(value["name"], "avatars");
                assert_eq!(value["public"], true);
                assert_eq!(value["file_size_limit"], Value::Null);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_sends_bytes_and_headers() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK)
                .with_json(&json!({"Key": "docs/notes/a b.txt", "Id": "abc"})))
        });
        let storage = storage_with(transport.clone());
        let payload = NormalizedPayload::new(Bytes::from_static(b"hello"), "text/plain");

        let response = storage
            .upload("docs", "notes/a b.txt", &payload, true)
            .await
            .unwrap();
        assert_eq!(response.key.as_deref(), Some("docs/notes/a b.txt"));
        assert_eq!(response.path, "notes/a b.txt");

        let requests = transport.requests();
        let sent = &requests[0];
        assert_eq!(sent.path, "/object/docs/notes/a%20b.txt");
        assert_eq!(sent.header_value("x-upsert"), Some("true"));
        match &sent.body {
            RequestBody::Bytes { data, content_type } => {
                assert_eq!(&data[..], b"hello");
                assert_eq!(content_type, "text/plain");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signed_urls_are_absolute() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK).with_json(&json!([
                {"path": "a.png", "signedURL": "/object/sign/img/a.png?token=t1", "error": null},
                {"path": "missing.png", "signedURL": null, "error": "Either the object does not exist or you do not have access to it"}
            ])))
        });
        let storage = storage_with(transport);

        let urls = storage
            .create_signed_urls("img", &["a.png".to_string(), "missing.png".to_string()], 60)
            .await
            .unwrap();
        assert_eq!(
            urls[0].signed_url.as_deref(),
            Some("https://demo.supabase.co/storage/v1/object/sign/img/a.png?token=t1")
        );
        assert!(urls[1].signed_url.is_none());
        assert!(urls[1].error.is_some());
    }

    #[tokio::test]
    async fn test_absolute_signed_url_kept() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK).with_json(&json!({
                "signedURL": "https://cdn.example.com/storage/v1/object/sign/img/a.png?token=t"
            })))
        });
        let storage = storage_with(transport);

        let signed = storage.create_signed_url("img", "a.png", 60).await.unwrap();
        assert_eq!(
            signed.signed_url.as_deref(),
            Some("https://cdn.example.com/storage/v1/object/sign/img/a.png?token=t")
        );
    }

    #[tokio::test]
    async fn test_signed_upload_url_extracts_token() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK)
                .with_json(&json!({"url": "/object/upload/sign/img/a.png?token=abc.def"})))
        });
        let storage = storage_with(transport);

        let signed = storage.create_signed_upload_url("img", "a.png").await.unwrap();
        assert_eq!(signed.token, "abc.def");
        assert_eq!(signed.path, "a.png");
        assert!(signed.signed_url.starts_with(TEST_BASE_URL));
    }

    #[tokio::test]
    async fn test_signed_upload_url_without_token_fails() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK)
                .with_json(&json!({"url": "/object/upload/sign/img/a.png"})))
        });
        let storage = storage_with(transport);

        let err = storage.create_signed_upload_url("img", "a.png").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_upload_to_signed_url_is_multipart_put() {
        let transport = ScriptedTransport::new(|_| {
            Ok(HttpResponse::new(StatusCode::OK).with_json(&json!({"Key": "img/dir/a.png"})))
        });
        let storage = storage_with(transport.clone());
        let payload = NormalizedPayload::new(Bytes::from_static(b"png"), "image/png");

        storage
            .upload_to_signed_url("img", "dir/a.png", "tok", &payload)
            .await
            .unwrap();

        let requests = transport.requests();
        let sent = &requests[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.query, vec![("token".to_string(), "tok".to_string())]);
        match &sent.body {
            RequestBody::Multipart { field, file_name, .. } => {
                assert_eq!(field, "file");
                assert_eq!(file_name, "a.png");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_request_body() {
        let transport =
            ScriptedTransport::new(|_| Ok(HttpResponse::new(StatusCode::OK).with_json(&json!([]))));
        let storage = storage_with(transport.clone());

        let options = ListOptions {
            path: Some("photos".to_string()),
            ..Default::default()
        };
        storage.list("img", &options).await.unwrap();

        match &transport.requests()[0].body {
            RequestBody::Json(value) => {
                assert_eq!(value["prefix"], "photos");
                assert_eq!(value["limit"], 100);
                assert_eq!(value["sortBy"]["column"], "name");
                assert_eq!(value["sortBy"]["order"], "asc");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_public_url() {
        let transport =
            ScriptedTransport::new(|_| Ok(HttpResponse::new(StatusCode::OK)));
        let storage = storage_with(transport);
        assert_eq!(
            storage.get_public_url("public-bucket", "dir/a.png"),
            "https://demo.supabase.co/storage/v1/object/public/public-bucket/dir/a.png"
        );
    }
}
