use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::shared::constants::DEFAULT_LIST_LIMIT;

/// Storage bucket as returned by `/bucket`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub file_size_limit: Option<u64>,
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Properties for creating or updating a bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct BucketOptions {
    /// Display name; the bucket id is used when absent
    #[validate(length(min = 1, message = "bucket name must not be empty"))]
    pub name: Option<String>,
    pub public: bool,
    /// Maximum object size in bytes, `None` for no limit
    #[validate(range(min = 1, message = "file_size_limit must be positive"))]
    pub file_size_limit: Option<u64>,
    /// Accepted MIME types, `None` for any
    pub allowed_mime_types: Option<Vec<String>>,
}

impl BucketOptions {
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = Some(limit);
        self
    }

    pub fn allowed_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_mime_types = Some(types.into_iter().map(Into::into).collect());
        self
    }
}

/// Entry of an object listing. Folders come back with no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl FileObject {
    pub fn is_folder(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Name,
    UpdatedAt,
    CreatedAt,
    LastAccessedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Options for listing the objects of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Folder to list; the bucket root when `None`
    pub path: Option<String>,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: SortColumn,
    pub order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            path: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            sort_by: SortColumn::default(),
            order: SortOrder::default(),
        }
    }
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Object path inside the bucket
    pub path: String,
    /// `bucket/path` key reported by the server
    pub key: Option<String>,
    pub id: Option<String>,
}

/// One signed download URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub path: Option<String>,
    pub signed_url: Option<String>,
    pub error: Option<String>,
}

/// Signed upload URL and the token embedded in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUploadUrl {
    pub signed_url: String,
    pub token: String,
    pub path: String,
}

/// Downloaded object: file name (last path segment), guessed MIME type and contents
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub file_name: String,
    pub mime: String,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bucket_deserializes_supabase_shape() {
        let bucket: Bucket = serde_json::from_value(json!({
            "id": "avatars",
            "name": "avatars",
            "owner": "",
            "public": true,
            "file_size_limit": null,
            "allowed_mime_types": ["image/png"],
            "created_at": "2023-04-01T10:00:00.000Z",
            "updated_at": "2023-04-01T10:00:00.000Z"
        }))
        .unwrap();
        assert!(bucket.public);
        assert_eq!(bucket.allowed_mime_types, Some(vec!["image/png".to_string()]));
        assert!(bucket.created_at.is_some());
    }

    #[test]
    fn test_folder_detection() {
        let folder: FileObject = serde_json::from_value(json!({
            "name": "images",
            "id": null,
            "updated_at": null,
            "created_at": null,
            "last_accessed_at": null,
            "metadata": null
        }))
        .unwrap();
        assert!(folder.is_folder());
    }

    #[test]
    fn test_bucket_options_validation() {
        assert!(BucketOptions::default().validate().is_ok());
        let bad = BucketOptions {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(BucketOptions::default().file_size_limit(0).validate().is_err());
    }
}
