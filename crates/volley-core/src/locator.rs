//! Request locators.
//!
//! A [`Locator`] is the URL a task is sent to. The core never inspects it; it is
//! handed to the transfer engine as-is. Raw strings pass through unchanged, while
//! [`LocatorBuilder`] composes and percent-encodes a URL from its parts.

use std::collections::BTreeMap;
use std::fmt;

/// The target URL of a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator {
    url: String,
}

impl Locator {
    /// Start building a locator for the given host.
    ///
    /// The scheme defaults to `http`.
    pub fn builder(host: impl Into<String>) -> LocatorBuilder {
        LocatorBuilder::new(host)
    }

    /// The URL as a string.
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl From<&str> for Locator {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl From<String> for Locator {
    fn from(url: String) -> Self {
        Self { url }
    }
}

impl From<&String> for Locator {
    fn from(url: &String) -> Self {
        Self { url: url.clone() }
    }
}

impl From<url::Url> for Locator {
    fn from(url: url::Url) -> Self {
        Self { url: url.into() }
    }
}

/// Builder composing `scheme://host/path?key=value&...`.
///
/// Query parameters are kept sorted by key.
#[derive(Clone, Debug)]
pub struct LocatorBuilder {
    scheme: String,
    host: String,
    path: String,
    query: BTreeMap<String, String>,
}

impl LocatorBuilder {
    fn new(host: impl Into<String>) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            path: String::new(),
            query: BTreeMap::new(),
        }
    }

    /// Set the scheme (`http`, `https`, ...).
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add a query parameter, replacing any previous value for `key`.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Compose the URL, percent-encoding the path and query.
    pub fn build(self) -> Result<Locator, url::ParseError> {
        let mut url = url::Url::parse(&format!("{}://{}", self.scheme, self.host))?;
        if !self.path.is_empty() {
            url.set_path(&self.path);
        }
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(Locator::from(url))
    }
}
