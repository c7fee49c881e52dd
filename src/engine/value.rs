use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::{Error, Result};

/// Marker stored against each member of a persisted set.
const MEMBER_MARKER: u8 = 1;

/// The kind of value a key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value. The variant is the key's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Value {
    pub fn key_type(&self) -> KeyType {
        match self {
            Value::String(_) => KeyType::String,
            Value::List(_) => KeyType::List,
            Value::Set(_) => KeyType::Set,
        }
    }

    /// True for a list or set with no elements. Such values are never stored.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Set(members) => members.is_empty(),
        }
    }
}

/// A value together with the auxiliary metadata tags persisted beside it.
///
/// `t` and `card` are derived from the value on every write; any other tags
/// found in a persisted envelope are carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub tags: Map<String, Json>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: Json,
    m: Meta,
}

#[derive(Serialize, Deserialize)]
struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<KeyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    card: Option<u64>,
    #[serde(flatten)]
    extra: Map<String, Json>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            tags: Map::new(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.value.key_type()
    }

    /// Serializes the entry into its envelope form:
    /// `{"v": <value>, "m": {"t": <type>, "card": <n>, ...}}`.
    pub fn encode(&self) -> Result<String> {
        let (v, card) = match &self.value {
            Value::String(s) => (Json::String(s.clone()), None),
            Value::List(items) => (
                Json::Array(items.iter().cloned().map(Json::String).collect()),
                None,
            ),
            Value::Set(members) => {
                let object = members
                    .iter()
                    .map(|m| (m.clone(), Json::from(MEMBER_MARKER)))
                    .collect::<Map<_, _>>();
                (Json::Object(object), Some(members.len() as u64))
            }
        };
        let envelope = Envelope {
            v,
            m: Meta {
                t: Some(self.key_type()),
                card,
                extra: self.tags.clone(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parses an envelope read from `key`.
    ///
    /// Anything that does not decode cleanly, including a type tag that
    /// disagrees with the value's shape or a set whose `card` disagrees with
    /// its member count, is [`Error::Corrupt`].
    pub fn decode(key: &str, raw: &str) -> Result<Self> {
        let corrupt = |reason: String| Error::Corrupt {
            key: key.to_string(),
            reason,
        };

        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
        let t = envelope
            .m
            .t
            .ok_or_else(|| corrupt("missing type tag".to_string()))?;

        let value = match (t, envelope.v) {
            (KeyType::String, v) => Value::String(
                scalar(&v).ok_or_else(|| corrupt("string value is not a scalar".to_string()))?,
            ),
            (KeyType::List, Json::Array(items)) => Value::List(
                items
                    .iter()
                    .map(|item| {
                        scalar(item)
                            .ok_or_else(|| corrupt("list element is not a scalar".to_string()))
                    })
                    .collect::<Result<_>>()?,
            ),
            (KeyType::Set, Json::Object(members)) => {
                let members: BTreeSet<String> = members.into_iter().map(|(m, _)| m).collect();
                if let Some(card) = envelope.m.card {
                    if card != members.len() as u64 {
                        return Err(corrupt(format!(
                            "cardinality {} disagrees with {} members",
                            card,
                            members.len()
                        )));
                    }
                }
                Value::Set(members)
            }
            (t, _) => return Err(corrupt(format!("value shape does not match type {}", t))),
        };

        Ok(Self {
            value,
            tags: envelope.m.extra,
        })
    }
}

fn scalar(v: &Json) -> Option<String> {
    match v {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_set_envelope() {
        let members = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let raw = Entry::new(Value::Set(members)).encode().unwrap();
        let parsed: Json = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed,
            json!({"v": {"a": 1, "b": 1}, "m": {"t": "set", "card": 2}})
        );
    }

    #[test]
    fn test_encode_list_envelope() {
        let items = VecDeque::from(vec!["x".to_string(), "y".to_string()]);
        let raw = Entry::new(Value::List(items)).encode().unwrap();
        let parsed: Json = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!({"v": ["x", "y"], "m": {"t": "list"}}));
    }

    #[test]
    fn test_decode_numeric_string() {
        let entry = Entry::decode("k", r#"{"v": 42, "m": {"t": "string"}}"#).unwrap();
        assert_eq!(entry.value, Value::String("42".to_string()));
    }

    #[test]
    fn test_extra_tags_are_preserved() {
        let raw = r#"{"v": "x", "m": {"t": "string", "origin": "import"}}"#;
        let entry = Entry::decode("k", raw).unwrap();
        assert_eq!(entry.tags.get("origin"), Some(&json!("import")));

        let parsed: Json = serde_json::from_str(&entry.encode().unwrap()).unwrap();
        assert_eq!(parsed["m"]["origin"], json!("import"));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = Entry::decode("bb:0:k", "plain text").unwrap_err();
        assert!(matches!(err, Error::Corrupt { ref key, .. } if key == "bb:0:k"));
    }

    #[test]
    fn test_shape_mismatch_is_corrupt() {
        let raw = r#"{"v": "scalar", "m": {"t": "list"}}"#;
        assert!(matches!(Entry::decode("k", raw), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_cardinality_mismatch_is_corrupt() {
        let raw = r#"{"v": {"a": 1}, "m": {"t": "set", "card": 3}}"#;
        assert!(matches!(Entry::decode("k", raw), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_missing_type_tag_is_corrupt() {
        let raw = r#"{"v": "x", "m": {}}"#;
        assert!(matches!(Entry::decode("k", raw), Err(Error::Corrupt { .. })));
    }
}
