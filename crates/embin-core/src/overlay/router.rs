//! Mount-prefix routing.

use crate::path::{host_str, segments};
use std::env;
use std::path::{Path, PathBuf};

/// Where an operation on a host path is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Outside the mount; hand the path to the host unchanged
    Passthrough,
    /// Inside the mount; the archive path with the prefix stripped
    Embedded(String),
}

/// Decides, per path, whether an operation targets the embedded tree.
///
/// Matching is lexical and segment-wise: with the mount at `/app`,
/// `/app/x` and `/app` are embedded while `/application` is not.
/// Relative paths are resolved against the working directory first.
#[derive(Debug, Clone)]
pub struct Router {
    prefix: Vec<String>,
}

impl Router {
    /// Creates a router for the mount point `prefix`
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        let prefix = absolute(prefix.as_ref());
        Self {
            prefix: segments(&host_str(&prefix)).into_iter().map(String::from).collect(),
        }
    }

    /// The normalized mount point
    pub fn prefix(&self) -> PathBuf {
        self.host_path("/")
    }

    /// Routes `path`
    pub fn route(&self, path: &Path) -> Route {
        let path = absolute(path);
        let path = host_str(&path);
        let parts = segments(&path);
        if parts.len() < self.prefix.len() || parts.iter().zip(&self.prefix).any(|(a, b)| a != b) {
            return Route::Passthrough;
        }
        Route::Embedded(format!("/{}", parts[self.prefix.len()..].join("/")))
    }

    /// Maps an archive path back to the host path it is mounted at
    pub fn host_path(&self, embedded: &str) -> PathBuf {
        let mut out = String::new();
        for part in self.prefix.iter().map(String::as_str).chain(segments(embedded)) {
            out.push('/');
            out.push_str(part);
        }
        if out.is_empty() {
            out.push('/');
        }
        PathBuf::from(out)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prefix_strip() {
        let router = Router::new("/embedded");
        assert_eq!(
            router.route(Path::new("/embedded/a/d.txt")),
            Route::Embedded("/a/d.txt".to_string())
        );
        assert_eq!(router.route(Path::new("/embedded")), Route::Embedded("/".to_string()));
        assert_eq!(
            router.route(Path::new("/embedded/./a/../b")),
            Route::Embedded("/b".to_string())
        );
    }

    #[test]
    fn test_passthrough() {
        let router = Router::new("/embedded");
        assert_eq!(router.route(Path::new("/elsewhere/x")), Route::Passthrough);
        assert_eq!(router.route(Path::new("/embeddedx/a")), Route::Passthrough);
        assert_eq!(router.route(Path::new("/")), Route::Passthrough);
    }

    #[test]
    fn test_relative_paths_use_cwd() {
        let cwd = env::current_dir().unwrap();
        let router = Router::new(cwd.join("mnt"));
        assert_eq!(
            router.route(Path::new("mnt/file.js")),
            Route::Embedded("/file.js".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_host_path() {
        let router = Router::new("/app/");
        assert_eq!(router.prefix(), PathBuf::from("/app"));
        assert_eq!(router.host_path("/lib/x.js"), PathBuf::from("/app/lib/x.js"));
        assert_eq!(Router::new("/").host_path("/"), PathBuf::from("/"));
    }
}
