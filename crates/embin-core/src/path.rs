//! Lexical path normalization shared by the builder, the reader and the overlay.
//!
//! Archive paths are always `/`-separated and rooted at the archive root.
//! Normalization never touches the real file system.

use std::path::{is_separator, Path};

/// Splits a path into its normalized segments.
///
/// Empty segments and `.` are dropped, `..` removes the previous segment and
/// never climbs above the root. Both `/` and the platform separator are
/// accepted.
pub fn segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(|c: char| c == '/' || is_separator(c)) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts
}

/// Normalizes a path into its canonical rooted archive form (`/a/b`).
pub fn normalize(path: &str) -> String {
    let parts = segments(path);
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Lossy string view of a host path.
pub(crate) fn host_str(path: &Path) -> std::borrow::Cow<'_, str> {
    path.to_string_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        assert_eq!(segments("/a/b/c.txt"), vec!["a", "b", "c.txt"]);
        assert_eq!(segments("a//b/./c"), vec!["a", "b", "c"]);
        assert_eq!(segments("/a/../b"), vec!["b"]);
        assert_eq!(segments("/../../x"), vec!["x"]);
        assert!(segments("/").is_empty());
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b/"), "/a/b");
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize(""), "/");
    }
}
