//! PostgREST (database) access
//!
//! A minimal request builder plus the client that executes it.

mod postgrest_client;
mod query_builder;

pub use postgrest_client::{PostgrestClient, QueryResponse};
pub use query_builder::{CountMethod, Operation, QueryBuilder};
