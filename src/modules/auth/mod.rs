//! Email/password authentication against Supabase Auth

mod auth_client;
mod dtos;

pub use auth_client::AuthClient;
pub use dtos::{AuthResponse, Session, SignInRequest, User};
