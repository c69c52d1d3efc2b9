//! Storage module for file management
//!
//! Bucket administration, object upload/download and signed or public URLs
//! against Supabase Storage.

mod dtos;
mod storage_client;

pub use dtos::{
    Bucket, BucketOptions, DownloadedFile, FileObject, ListOptions, SignedUploadUrl, SignedUrl,
    SortColumn, SortOrder, UploadResponse,
};
pub use storage_client::StorageClient;
