//! Case-insensitive header map that preserves the casing of the last write.

use std::fmt;

/// A single header field. Comparisons and lookups are ASCII case-insensitive on `name`;
/// the casing supplied at construction is preserved for serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered collection of HTTP header fields.
///
/// Lookups (`get`) are case-insensitive. `insert` overwrites every existing field with a
/// matching name (single-valued semantics); `append` adds a field alongside any existing
/// ones with the same name. `merge` implements the right-wins union used when a middleware
/// stage's header set is combined onto the in-flight response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderMap {
    headers: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self { headers: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            headers: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every field with this name and sets a single new one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(&name));
        self.headers.push(Header::new(name, value));
    }

    /// Adds a field without removing any existing field of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    /// Right-wins union: every field in `other` overwrites same-named fields in `self`.
    pub fn merge(&mut self, other: &HeaderMap) {
        for header in &other.headers {
            self.insert(header.name.clone(), header.value.clone());
        }
    }

    /// Inserts a default value only if the name is not already present.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.insert(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// Parses the `Content-Length` header, if present and well-formed.
    pub(crate) fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup() {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn insert_overwrites_single_valued() {
        let mut h = HeaderMap::new();
        h.insert("X-Count", "1");
        h.insert("x-count", "2");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("X-Count"), Some("2"));
    }

    #[test]
    fn append_keeps_multiple_values() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn merge_is_right_wins() {
        let mut base = HeaderMap::new();
        base.insert("X-A", "base");
        base.insert("X-B", "keep");

        let mut overlay = HeaderMap::new();
        overlay.insert("X-A", "overlay");

        base.merge(&overlay);
        assert_eq!(base.get("X-A"), Some("overlay"));
        assert_eq!(base.get("X-B"), Some("keep"));
    }

    #[test]
    fn insert_if_absent_is_noop_when_present() {
        let mut h = HeaderMap::new();
        h.insert("Date", "first");
        h.insert_if_absent("Date", "second");
        assert_eq!(h.get("Date"), Some("first"));
    }
}
