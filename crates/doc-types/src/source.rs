use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// A reference to an input document: either a local path or a remote URL.
///
/// Equality and hashing are defined over the *normalized* form so that two
/// textually different but semantically identical handles (`./a.pdf` vs
/// `/abs/a.pdf`, trailing slash differences in a URL) compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceHandle {
    Path(PathBuf),
    Url(Url),
}

impl SourceHandle {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        SourceHandle::Path(path.as_ref().to_path_buf())
    }

    pub fn from_url(url: Url) -> Self {
        SourceHandle::Url(url)
    }

    /// Parse either a filesystem path or a URL from a single user-supplied string.
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => SourceHandle::Url(url),
            _ => SourceHandle::Path(PathBuf::from(raw)),
        }
    }

    /// A canonical string representation used as the Fingerprint Store and
    /// Registry secondary-index key. Stable across process restarts.
    pub fn normalized(&self) -> String {
        match self {
            SourceHandle::Path(p) => {
                let abs = std::path::absolute(p).unwrap_or_else(|_| p.clone());
                format!("path:{}", abs.to_string_lossy())
            }
            SourceHandle::Url(u) => {
                let mut u = u.clone();
                u.set_fragment(None);
                let s = u.as_str().trim_end_matches('/');
                format!("url:{s}")
            }
        }
    }
}

impl PartialEq for SourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for SourceHandle {}

impl std::hash::Hash for SourceHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state)
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_normalization_ignores_relative_vs_absolute() {
        let a = SourceHandle::parse("./sheet.pdf");
        let b = SourceHandle::from_path(std::path::absolute("./sheet.pdf").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn url_normalization_ignores_trailing_slash_and_fragment() {
        let a = SourceHandle::parse("https://ex.test/a/b/");
        let b = SourceHandle::parse("https://ex.test/a/b#section");
        assert_eq!(a, b);
    }
}
