use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use uuid::Uuid;

/// A batch of write intents, applied together by
/// [`MutableConfiguration::store`](super::MutableConfiguration::store).
///
/// For each key the last intent wins: a `put` cancels an earlier `remove` of
/// the same key and vice versa.
///
/// ```
/// use tiercfg::ChangeRequest;
///
/// let mut request = ChangeRequest::new();
/// request.put("db.port", "6432").remove("db.legacy");
/// request.remove("db.port");
///
/// assert!(request.puts().is_empty());
/// assert_eq!(request.removes().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    id: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default)]
    puts: BTreeMap<String, String>,
    #[serde(default)]
    removes: BTreeSet<String>,
}

impl ChangeRequest {
    /// Empty request with a fresh random id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc(),
            puts: BTreeMap::new(),
            removes: BTreeSet::new(),
        }
    }

    /// Empty request sharing this request's id and timestamp, used when a
    /// policy splits one request across several sources
    pub fn derive_empty(&self) -> Self {
        Self {
            id: self.id.clone(),
            created_at: self.created_at,
            puts: BTreeMap::new(),
            removes: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn puts(&self) -> &BTreeMap<String, String> {
        &self.puts
    }

    pub fn removes(&self) -> &BTreeSet<String> {
        &self.removes
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.removes.remove(&key);
        self.puts.insert(key, value.into());
        self
    }

    pub fn put_all<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.puts.remove(&key);
        self.removes.insert(key);
        self
    }

    pub fn remove_all<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.remove(key);
        }
        self
    }

    /// Every key this request touches, ordered
    pub fn keys(&self) -> BTreeSet<&str> {
        self.puts
            .keys()
            .chain(self.removes.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn touches(&self, key: &str) -> bool {
        self.puts.contains_key(key) || self.removes.contains(key)
    }

    /// Number of puts plus removes
    pub fn len(&self) -> usize {
        self.puts.len() + self.removes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.removes.is_empty()
    }
}

impl Default for ChangeRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids() {
        let a = ChangeRequest::new();
        let b = ChangeRequest::new();
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
        assert!(a.is_empty());
    }

    #[test]
    fn test_last_intent_wins() {
        let mut request = ChangeRequest::new();
        request.remove("k").put("k", "v");
        assert_eq!(request.puts().get("k").map(String::as_str), Some("v"));
        assert!(request.removes().is_empty());
        assert!(request.touches("k"));
        assert_eq!(request.len(), 1);
    }

    #[test]
    fn test_bulk_operations() {
        let mut request = ChangeRequest::new();
        request
            .put_all([("a", "1"), ("b", "2")])
            .remove_all(["c", "b"]);
        assert_eq!(request.keys().into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(request.puts().len(), 1);
    }

    #[test]
    fn test_derive_empty_keeps_identity() {
        let mut request = ChangeRequest::new();
        request.put("a", "1");
        let part = request.derive_empty();
        assert_eq!(part.id(), request.id());
        assert_eq!(part.created_at(), request.created_at());
        assert!(part.is_empty());
    }

    #[test]
    fn test_serialized_form() {
        let mut request = ChangeRequest::new();
        request.put("a", "1").remove("b");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], request.id());
        assert_eq!(json["puts"]["a"], "1");
        assert_eq!(json["removes"][0], "b");
        // rfc3339 timestamp
        assert!(json["created_at"].as_str().unwrap().contains('T'));

        let back: ChangeRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }
}
