//! Zabbix API data types.

use std::fmt;

use serde::Deserialize;

/// Session token returned by `user.login`.
///
/// Opaque to the exporter. Its validity is only discovered when a later
/// request fails, so it carries no expiry.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// A dynamically typed item value (`lastvalue`, `prevvalue`).
///
/// Zabbix sends numbers as strings; anything else is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Text(String),
    Other(serde_json::Value),
}

impl ItemValue {
    /// The string payload, if this value is a JSON string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ItemValue::Text(s) => Some(s),
            ItemValue::Other(_) => None,
        }
    }
}

/// One record of an `item.get` result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    /// Human readable label.
    #[serde(default)]
    pub name: String,
    /// Stable item key, e.g. `zabbix[wcache,values,float]`.
    #[serde(rename = "key_", default)]
    pub key: String,
    /// `"0"` when the item is enabled.
    #[serde(default)]
    pub status: String,
    #[serde(rename = "lastvalue", default)]
    pub last_value: Option<ItemValue>,
    #[serde(rename = "prevvalue", default)]
    pub prev_value: Option<ItemValue>,
}
