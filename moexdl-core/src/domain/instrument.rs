use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tradable share as listed by the exchange.
///
/// Only `SECID` is interpreted. Every other upstream field, `SECNAME`
/// included, is carried verbatim in `extra` so a saved list keeps exactly
/// what the exchange sent, nulls and all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(rename = "SECID")]
    pub secid: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Instrument {
    pub fn new(secid: impl Into<String>, secname: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("SECNAME".into(), Value::String(secname.into()));
        Self {
            secid: secid.into(),
            extra,
        }
    }

    /// Display name, if upstream sent one.
    pub fn secname(&self) -> Option<&str> {
        self.extra.get("SECNAME").and_then(Value::as_str)
    }

    /// Upstream metadata field other than `SECID`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
