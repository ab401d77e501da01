use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Environment passed to compute and listener subprocesses.
///
/// Stored as an ordered list; when the same key appears twice the later entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(Vec<KeyValue>);

impl Env {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the effective value for a key (last entry wins).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append an entry, overriding any earlier one with the same key.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Builder-style [`Env::push`].
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(key, value);
        self
    }

    /// Concatenate two environments; entries from `other` override `self`.
    pub fn merged(&self, other: &Env) -> Env {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Env(out)
    }

    /// Collapse overridden entries, keeping the effective value of every key
    /// at the position of its first appearance.
    pub fn effective(&self) -> Vec<(&str, &str)> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.0.len());
        let mut out = Vec::with_capacity(self.0.len());
        for kv in &self.0 {
            if seen.contains(&kv.key()) {
                continue;
            }
            seen.push(kv.key());
            if let Some(v) = self.get(kv.key()) {
                out.push((kv.key(), v));
            }
        }
        out
    }
}

impl FromIterator<KeyValue> for Env {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
