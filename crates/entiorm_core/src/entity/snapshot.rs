use super::ModifiedFields;
use crate::error::{CoreError, CoreResult};
use entiorm_codec::{from_cbor, to_canonical_cbor, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Serialized state of an entity.
///
/// `data` holds raw, identity-shaped values: relationships appear as ids,
/// never as nested entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySnapshot {
    /// Modified set at the time of serialization.
    pub modified: ModifiedFields,
    /// Names of properties that had been validated.
    pub validated: BTreeSet<String>,
    /// Raw property values.
    pub data: BTreeMap<String, Value>,
    /// Persisted identity, if any.
    pub persisted_id: Option<Value>,
}

impl EntitySnapshot {
    /// Converts to a structured value.
    pub fn to_value(&self) -> Value {
        let text_list = |items: Vec<&str>| Value::Array(items.into_iter().map(Value::from).collect());
        Value::from_entries([
            (
                "modified",
                Value::from_entries([
                    ("all", Value::Bool(self.modified.is_all())),
                    ("fields", text_list(self.modified.fields().collect())),
                ]),
            ),
            (
                "validated",
                text_list(self.validated.iter().map(String::as_str).collect()),
            ),
            (
                "data",
                Value::from_entries(self.data.iter().map(|(k, v)| (k.clone(), v.clone()))),
            ),
            ("persisted", self.persisted_id.clone().unwrap_or_default()),
        ])
    }

    /// Rebuilds from [`EntitySnapshot::to_value`] output.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let modified = field(value, "modified")?;
        let all = field(modified, "all")?
            .as_bool()
            .ok_or_else(|| malformed("modified.all must be a bool"))?;
        let fields = texts(field(modified, "fields")?, "modified.fields")?;
        let validated = texts(field(value, "validated")?, "validated")?;

        let mut data = BTreeMap::new();
        for (key, raw) in field(value, "data")?
            .as_map()
            .ok_or_else(|| malformed("data must be a map"))?
        {
            let key = key
                .as_text()
                .ok_or_else(|| malformed("data keys must be text"))?;
            data.insert(key.to_string(), raw.clone());
        }

        Ok(Self {
            modified: ModifiedFields::from_parts(all, fields),
            validated: validated.into_iter().collect(),
            data,
            persisted_id: field(value, "persisted")?.clone().into_option(),
        })
    }

    /// Encodes as canonical CBOR.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value())?)
    }

    /// Decodes from canonical CBOR.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

fn malformed(message: &str) -> CoreError {
    CoreError::invalid_argument(format!("Malformed entity snapshot: {message}."))
}

fn field<'a>(value: &'a Value, key: &str) -> CoreResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| malformed(&format!("missing '{key}'")))
}

fn texts(value: &Value, what: &str) -> CoreResult<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| malformed(&format!("{what} must be a list")))?
        .iter()
        .map(|item| {
            item.as_text()
                .map(str::to_string)
                .ok_or_else(|| malformed(&format!("{what} must hold text")))
        })
        .collect()
}
