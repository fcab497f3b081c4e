//! Resolution cache key naming.

use std::fmt;

/// Keys under which resolved values are cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One page of content, stored as `page_<key>`.
    Page(String),
    /// The merged site settings.
    SiteSettings,
}

impl CacheKey {
    pub fn page(page_key: impl Into<String>) -> Self {
        Self::Page(page_key.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Page(page_key) => write!(f, "page_{page_key}"),
            CacheKey::SiteSettings => f.write_str("site_settings"),
        }
    }
}
