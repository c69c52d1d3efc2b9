use crate::core::error::{ConnectorError, Result};

/// Normalize a storage object path: strip every leading `/`.
///
/// Rejects paths that are empty once stripped, i.e. the bucket root.
/// - Valid: "a/b.txt", "/a/b.txt", "//nested/dir/"
/// - Invalid: "", "/", "///"
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ConnectorError::Validation(format!(
            "Invalid storage path '{}': path must name an object, not the bucket root",
            path
        )));
    }
    Ok(trimmed.to_string())
}

/// Reject blank identifiers such as table names and bucket ids
pub fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConnectorError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Last segment of an object path, used as the local file name
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_normalize_path_strips_leading_separators() {
        assert_eq!(normalize_path("/a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_path("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_path("///a/b.txt").unwrap(), "a/b.txt");
        // only leading separators are touched
        assert_eq!(normalize_path("/dir/").unwrap(), "dir/");
    }

    #[test]
    fn test_normalize_path_rejects_root() {
        for input in ["", "/", "////"] {
            let err = normalize_path(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "input {:?}", input);
        }
    }

    #[test]
    fn test_normalize_path_is_idempotent() {
        for input in ["/a/b.txt", "a", "//x//y", "folder/image.png"] {
            let once = normalize_path(input).unwrap();
            let twice = normalize_path(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("countries", "table name").is_ok());
        assert!(require_non_empty("  ", "table name").is_err());
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("folder/sub/image.png"), "image.png");
        assert_eq!(file_name_of("image.png"), "image.png");
    }
}
