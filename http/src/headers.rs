use std::collections::btree_map::{self, BTreeMap};
use std::fmt::{self, Debug, Formatter};

/**
Response header storage.

Header names are stored lower-cased and looked up case-insensitively.
Inserting a name that is already present overwrites the earlier value
(last-wins), matching how the engine treats duplicate response headers.
*/
#[derive(Default, Clone, Eq, PartialEq)]
pub struct Headers {
    map: BTreeMap<String, String>,
}

impl Debug for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

impl Headers {
    /// Builds an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, lower-casing the name and replacing any existing
    /// value for it.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.map.get(&name.to_ascii_lowercase()).map(String::as_str)
        } else {
            self.map.get(name).map(String::as_str)
        }
    }

    /// Returns true if the named header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns true if the named header is present and its value starts
    /// with `prefix`, compared case-insensitively. This is the comparison
    /// the engine uses for `Transfer-Encoding: chunked` and
    /// `Connection: keep-alive`.
    pub fn value_starts_with(&self, name: &str, prefix: &str) -> bool {
        self.get(name).is_some_and(|value| {
            value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no headers have been inserted.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(lowercase name, value)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.map.iter()
    }

    /// Removes all headers.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}
