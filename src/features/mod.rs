//! Features layer - the connection facade callers use

pub mod connection;
