/// Secret / environment variable holding the project URL
pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";

/// Secret / environment variable holding the access key
pub const SUPABASE_KEY_VAR: &str = "SUPABASE_KEY";

/// Content type used when nothing better can be guessed
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// SERVICE PATHS
// =============================================================================

pub const REST_PATH: &str = "/rest/v1";
pub const STORAGE_PATH: &str = "/storage/v1";
pub const AUTH_PATH: &str = "/auth/v1";

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default page size for object listings
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Cache-Control max-age (seconds) sent with uploads
pub const DEFAULT_UPLOAD_CACHE_CONTROL: u32 = 3600;
