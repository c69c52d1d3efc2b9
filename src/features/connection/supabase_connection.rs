use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::credentials::Credentials;
use crate::core::error::{ConnectorError, Result};
use crate::features::connection::options::ConnectOptions;
use crate::modules::auth::{AuthResponse, Session, SignInRequest, User};
use crate::modules::client::SupabaseClient;
use crate::modules::postgrest::{CountMethod, QueryBuilder, QueryResponse};
use crate::modules::storage::{
    Bucket, BucketOptions, DownloadedFile, FileObject, ListOptions, SignedUploadUrl, SignedUrl,
    UploadResponse,
};
use crate::shared::cache::{CacheKey, CallCache, Ttl};
use crate::shared::payload::{guess_content_type, normalize_async, NormalizedPayload, UploadSource};
use crate::shared::validation::{file_name_of, normalize_path, require_non_empty};

/// Connection to one Supabase project.
///
/// Read operations take a [`Ttl`] and are served from the connection's
/// [`CallCache`] while fresh. Mutations always reach the server.
pub struct SupabaseConnection {
    client: SupabaseClient,
    credentials: Credentials,
    cache: Arc<CallCache>,
}

impl SupabaseConnection {
    pub(crate) fn new(client: SupabaseClient, credentials: Credentials, cache: Arc<CallCache>) -> Self {
        Self {
            client,
            credentials,
            cache,
        }
    }

    /// Connect with credentials from the secret store or the environment
    pub fn connect() -> Result<Self> {
        ConnectOptions::new().connect()
    }

    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cache(&self) -> &Arc<CallCache> {
        &self.cache
    }

    /// Project host plus the signed-in user (`anon` without a session).
    /// Row-level security makes results depend on both.
    async fn cache_scope(&self, operation: &str) -> String {
        let caller = self
            .client
            .auth()
            .get_session()
            .await
            .map(|session| session.user.id)
            .unwrap_or_else(|| "anon".to_string());
        format!("{}::{}::{}", self.credentials.host(), caller, operation)
    }

    async fn cache_key<A: Serialize + ?Sized>(&self, operation: &str, args: &A) -> Option<CacheKey> {
        CacheKey::from_args(self.cache_scope(operation).await, args)
    }

    /// Drop every memoized result
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Cleared call cache for {}", self.credentials.host());
    }

    // =========================================================================
    // Database
    // =========================================================================

    pub fn table(&self, name: &str) -> QueryBuilder {
        self.client.table(name)
    }

    /// Select builder; chain filters before [`SupabaseConnection::execute_query`]
    pub fn query(&self, table: &str, columns: &str, count: Option<CountMethod>) -> QueryBuilder {
        let builder = self.client.table(table).select(columns);
        match count {
            Some(method) => builder.count(method),
            None => builder,
        }
    }

    /// Run a query. Selects are memoized under `ttl`; writes are never cached.
    pub async fn execute_query(&self, builder: &QueryBuilder, ttl: impl Into<Ttl>) -> Result<QueryResponse> {
        if !builder.is_read() {
            return self.client.postgrest().execute(builder).await;
        }

        let key = CacheKey::new(
            self.cache_scope("execute_query").await,
            builder.cache_key(),
        );
        self.cache
            .get_or_fetch(Some(key), ttl.into(), || self.client.postgrest().execute(builder))
            .await
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    pub async fn create_bucket(&self, id: &str, options: &BucketOptions) -> Result<Value> {
        require_non_empty(id, "bucket id")?;
        self.client.storage().create_bucket(id, options).await
    }

    pub async fn get_bucket(&self, id: &str, ttl: impl Into<Ttl>) -> Result<Bucket> {
        require_non_empty(id, "bucket id")?;
        self.cache
            .get_or_fetch(self.cache_key("get_bucket", &id).await, ttl.into(), || {
                self.client.storage().get_bucket(id)
            })
            .await
    }

    pub async fn list_buckets(&self, ttl: impl Into<Ttl>) -> Result<Vec<Bucket>> {
        self.cache
            .get_or_fetch(self.cache_key("list_buckets", &()).await, ttl.into(), || {
                self.client.storage().list_buckets()
            })
            .await
    }

    pub async fn update_bucket(&self, id: &str, options: &BucketOptions) -> Result<Value> {
        require_non_empty(id, "bucket id")?;
        self.client.storage().update_bucket(id, options).await
    }

    pub async fn delete_bucket(&self, id: &str) -> Result<Value> {
        require_non_empty(id, "bucket id")?;
        self.client.storage().delete_bucket(id).await
    }

    pub async fn empty_bucket(&self, id: &str) -> Result<Value> {
        require_non_empty(id, "bucket id")?;
        self.client.storage().empty_bucket(id).await
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Upload `source` to `bucket`.
    ///
    /// `destination` defaults to the source's own file name. Files opened for
    /// the upload are released once the request completes, whatever its outcome.
    pub async fn upload(
        &self,
        bucket: &str,
        source: impl Into<UploadSource>,
        destination: Option<&str>,
        overwrite: bool,
    ) -> Result<UploadResponse> {
        let source = source.into();
        let destination = destination
            .map(str::to_string)
            .or_else(|| source.name_hint())
            .ok_or_else(|| {
                ConnectorError::Validation(
                    "A destination path is required when the upload source has no file name"
                        .to_string(),
                )
            })?;
        let path = normalize_path(&destination)?;
        let payload = normalize_async(source, &path).await?;

        self.upload_payload(bucket, &path, payload, overwrite).await
    }

    /// Upload an already normalized payload, running its cleanup afterwards
    pub async fn upload_payload(
        &self,
        bucket: &str,
        path: &str,
        payload: NormalizedPayload,
        overwrite: bool,
    ) -> Result<UploadResponse> {
        let result = async {
            require_non_empty(bucket, "bucket id")?;
            let path = normalize_path(path)?;
            self.client
                .storage()
                .upload(bucket, &path, &payload, overwrite)
                .await
        }
        .await;
        payload.finish();
        result
    }

    /// Download an object with its file name and guessed MIME type
    pub async fn download(&self, bucket: &str, path: &str, ttl: impl Into<Ttl>) -> Result<DownloadedFile> {
        let path = normalize_path(path)?;
        let key = self.cache_key("download", &(bucket, path.as_str())).await;
        let storage = self.client.storage();
        let path = path.as_str();

        self.cache
            .get_or_fetch(key, ttl.into(), move || async move {
                storage
                    .download(bucket, path)
                    .await
                    .map(|data| {
                        let file_name = file_name_of(path).to_string();
                        let mime = guess_content_type(&file_name);
                        debug!("Downloaded {} as {}", path, mime);
                        DownloadedFile {
                            file_name,
                            mime,
                            data,
                        }
                    })
            })
            .await
    }

    pub async fn move_object(&self, bucket: &str, from_path: &str, to_path: &str) -> Result<Value> {
        let from_path = normalize_path(from_path)?;
        let to_path = normalize_path(to_path)?;
        self.client
            .storage()
            .move_object(bucket, &from_path, &to_path)
            .await
    }

    pub async fn remove(&self, bucket: &str, paths: &[&str]) -> Result<Vec<FileObject>> {
        let paths = paths
            .iter()
            .map(|path| normalize_path(path))
            .collect::<Result<Vec<_>>>()?;
        self.client.storage().remove(bucket, &paths).await
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        options: &ListOptions,
        ttl: impl Into<Ttl>,
    ) -> Result<Vec<FileObject>> {
        self.cache
            .get_or_fetch(
                self.cache_key("list_objects", &(bucket, options)).await,
                ttl.into(),
                || self.client.storage().list(bucket, options),
            )
            .await
    }

    // =========================================================================
    // Signed and public URLs
    // =========================================================================

    pub async fn create_signed_url(&self, bucket: &str, path: &str, expires_in: u64) -> Result<SignedUrl> {
        let path = normalize_path(path)?;
        self.client
            .storage()
            .create_signed_url(bucket, &path, expires_in)
            .await
    }

    pub async fn create_signed_urls(
        &self,
        bucket: &str,
        paths: &[&str],
        expires_in: u64,
        ttl: impl Into<Ttl>,
    ) -> Result<Vec<SignedUrl>> {
        let paths = paths
            .iter()
            .map(|path| normalize_path(path))
            .collect::<Result<Vec<_>>>()?;
        let key = self
            .cache_key("create_signed_urls", &(bucket, &paths, expires_in))
            .await;

        self.cache
            .get_or_fetch(key, ttl.into(), || {
                self.client
                    .storage()
                    .create_signed_urls(bucket, &paths, expires_in)
            })
            .await
    }

    pub async fn create_signed_upload_url(&self, bucket: &str, path: &str) -> Result<SignedUploadUrl> {
        let path = normalize_path(path)?;
        self.client
            .storage()
            .create_signed_upload_url(bucket, &path)
            .await
    }

    pub async fn upload_to_signed_url(
        &self,
        bucket: &str,
        path: &str,
        token: &str,
        source: impl Into<UploadSource>,
    ) -> Result<UploadResponse> {
        let path = normalize_path(path)?;
        require_non_empty(token, "upload token")?;
        let payload = normalize_async(source.into(), &path).await?;

        let result = self
            .client
            .storage()
            .upload_to_signed_url(bucket, &path, token, &payload)
            .await;
        payload.finish();
        result
    }

    pub fn get_public_url(&self, bucket: &str, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        Ok(self.client.storage().get_public_url(bucket, &path))
    }

    // =========================================================================
    // Auth
    // =========================================================================

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.client
            .auth()
            .sign_up(&SignInRequest::new(email, password))
            .await
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.client
            .auth()
            .sign_in_with_password(&SignInRequest::new(email, password))
            .await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.client.auth().sign_out().await
    }

    pub async fn get_session(&self) -> Option<Session> {
        self.client.auth().get_session().await
    }

    pub async fn get_user(&self) -> Result<Option<User>> {
        self.client.auth().get_user().await
    }
}
