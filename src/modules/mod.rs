//! Modules layer - clients for the Supabase services
//!
//! Every client sends through the shared [`transport::Requester`], so a
//! signed-in session applies to database and storage calls alike.

pub mod auth;
pub mod client;
pub mod postgrest;
pub mod storage;
pub mod transport;
