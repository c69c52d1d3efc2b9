//! Connection facade over one Supabase project

mod options;
mod supabase_connection;

pub use options::ConnectOptions;
pub use supabase_connection::SupabaseConnection;
