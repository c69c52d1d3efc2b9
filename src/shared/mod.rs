//! Shared utilities used across modules and features

pub mod cache;
pub mod constants;
pub mod payload;
pub mod validation;

#[cfg(test)]
pub mod test_helpers;
