//! Cached connector for Supabase projects.
//!
//! [`SupabaseConnection`] resolves the project URL and access key, forwards
//! database, storage and auth calls to [`SupabaseClient`], and memoizes reads
//! in a [`CallCache`] under a caller-chosen [`Ttl`].

pub mod core;
pub mod features;
pub mod modules;
pub mod shared;

pub use crate::core::config::ConnectorConfig;
pub use crate::core::credentials::{Credentials, SecretStore};
pub use crate::core::error::{ConnectorError, ErrorKind, Result};
pub use crate::features::connection::{ConnectOptions, SupabaseConnection};
pub use crate::modules::client::SupabaseClient;
pub use crate::modules::postgrest::{CountMethod, QueryBuilder, QueryResponse};
pub use crate::shared::cache::{CallCache, Ttl};
pub use crate::shared::payload::{UploadSource, UploadedFile};
