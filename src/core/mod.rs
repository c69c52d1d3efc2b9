//! Core layer - configuration, credentials and the error type

pub mod config;
pub mod credentials;
pub mod error;
