//! The flat key/value mapping relayed between frames.
//!
//! A [`ParameterSet`] is built from a location's query string with the
//! same rules browsers apply to `URLSearchParams`: a leading `?` is
//! ignored, `+` decodes to a space, percent escapes are decoded, and when
//! a key repeats the last value wins.
//!
//! Absence of data is the empty set, never a missing value. Updates
//! always replace a set wholesale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Query parameters of a page, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a location search string such as `?a=1&b=2`.
    pub fn from_search(search: &str) -> Self {
        let query = search.strip_prefix('?').unwrap_or(search);
        let map = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self(map)
    }

    /// Parse the query component of an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `raw` is not an absolute URL.
    pub fn from_url(raw: &str) -> Result<Self, url::ParseError> {
        let parsed = url::Url::parse(raw)?;
        Ok(parsed.query().map(Self::from_search).unwrap_or_default())
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Insert or overwrite one parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no parameter is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize as a JSON object string; the empty set is `{}`.
    pub fn to_json(&self) -> String {
        // A map of strings always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
