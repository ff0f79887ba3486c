use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Session dictionary mapping semantic field names to the broker's short wire keys.
///
/// The broker pushes it as a `referential` message some time after connect;
/// until then no command can be encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Referentials {
    #[default]
    Pending,
    Ready(HashMap<String, String>),
}

impl Referentials {
    pub fn from_map(keys: HashMap<String, String>) -> Self {
        Referentials::Ready(keys)
    }

    /// Decodes the LZ-compressed UTF-16 blob carried by a `referential` message.
    pub fn decode(blob: &str) -> Result<Self> {
        let wide = lz_str::decompress_from_utf16(blob)
            .ok_or_else(|| Error::Decode("referential blob is not valid lz-string data".into()))?;
        let text = String::from_utf16(&wide)
            .map_err(|e| Error::Decode(format!("referential blob is not UTF-16: {e}")))?;
        Self::parse(&text)
    }

    /// Parses the decompressed dictionary text. Non-string values are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: Map<String, Value> = serde_json::from_str(text)?;
        let mut keys = HashMap::with_capacity(raw.len());
        for (name, code) in raw {
            match code {
                Value::String(code) => {
                    keys.insert(name, code);
                }
                other => trace!(%name, value = %other, "skipping non-string referential"),
            }
        }
        debug!(count = keys.len(), "referentials decoded");
        Ok(Referentials::Ready(keys))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Referentials::Ready(keys) if !keys.is_empty())
    }

    pub fn len(&self) -> usize {
        match self {
            Referentials::Pending => 0,
            Referentials::Ready(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites every object key in `request` through the dictionary.
    /// Keys without an entry pass through; values are never touched.
    pub fn translate(&self, request: &Value) -> Result<Value> {
        match self {
            Referentials::Ready(keys) if !keys.is_empty() => Ok(replace_keys(request, keys)),
            _ => Err(Error::NotReady),
        }
    }
}

fn replace_keys(value: &Value, keys: &HashMap<String, String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let key = keys.get(k).cloned().unwrap_or_else(|| k.clone());
                    (key, replace_keys(v, keys))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| replace_keys(v, keys)).collect()),
        other => other.clone(),
    }
}
