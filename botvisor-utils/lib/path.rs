//! Path normalization helpers.
//!
//! Entry paths are stored and used in forward-slash form regardless of the platform that wrote
//! them, so a registry written on Windows stays valid on Unix and the other way around.

use std::path::{Path, PathBuf};

use typed_path::Utf8UnixPathBuf;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Replaces every backslash with a forward slash.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Converts a string into a forward-slash path.
pub fn to_unix_path(path: &str) -> Utf8UnixPathBuf {
    Utf8UnixPathBuf::from(normalize_separators(path))
}

/// Converts a host path into a forward-slash path.
pub fn host_to_unix_path(path: &Path) -> Utf8UnixPathBuf {
    to_unix_path(&path.to_string_lossy())
}

/// Converts a forward-slash path back into a host path.
///
/// Forward slashes are accepted as separators on every supported platform, so this is a plain
/// reinterpretation.
pub fn unix_to_host_path(path: &Utf8UnixPathBuf) -> PathBuf {
    PathBuf::from(path.as_str())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_separators(r"bots\alpha\index.js"), "bots/alpha/index.js");
        assert_eq!(normalize_separators("bots/alpha/index.js"), "bots/alpha/index.js");
        assert_eq!(normalize_separators(r"C:\bots/mixed\index.js"), "C:/bots/mixed/index.js");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_separators(r"bots\\beta\index.js");
        let twice = normalize_separators(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unix_path_parent_and_file_name() {
        let path = to_unix_path(r"bots\alpha\index.js");
        assert_eq!(path.as_str(), "bots/alpha/index.js");
        assert_eq!(path.parent().map(|p| p.as_str()), Some("bots/alpha"));
        assert_eq!(path.file_name(), Some("index.js"));
    }
}
