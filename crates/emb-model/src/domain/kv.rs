use serde::{Deserialize, Serialize};

/// Single environment entry handed to an external process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    /// Create a new entry.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Variable name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Variable value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<(&str, &str)> for KeyValue {
    fn from((key, value): (&str, &str)) -> Self {
        Self::new(key, value)
    }
}
