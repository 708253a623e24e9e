//! Conversion between complete kernel values and `serde_json` values.
//!
//! Integration layers exchange data with the outside world as JSON. The
//! mapping is:
//!
//! | kernel | JSON |
//! |--------|------|
//! | `Int`, `Float`, `Str`, `Bool`, `Null` | number, string, bool, null |
//! | `Char` | `{"$char": "c"}` |
//! | `Eof` | `{"$eof": true}` |
//! | unlabeled tuple | array |
//! | unlabeled record, string features not starting with `$` | object |
//! | anything else built from records | `{"$label": l, "$fields": [[f, v], ...]}` |
//!
//! `$label` is omitted for unlabeled records. Closures, procedures, tokens
//! and host objects have no representation.

use serde_json::{Map, Number};

use crate::stack::ensure_sufficient_stack;

use super::{Feature, Rec, Value};

const LABEL_KEY: &str = "$label";
const FIELDS_KEY: &str = "$fields";
const CHAR_KEY: &str = "$char";
const EOF_KEY: &str = "$eof";

/// Error converting to or from the JSON representation.
#[derive(Clone, Debug, thiserror::Error)]
pub enum NativeConversionError {
    #[error("value is not complete: {0} is unbound")]
    Incomplete(super::VarId),
    #[error("{0} values have no native representation")]
    Unsupported(&'static str),
    #[error("float {0} is not finite")]
    NonFiniteFloat(f64),
    #[error("malformed native value: {0}")]
    Malformed(String),
}

/// Convert a complete value to JSON.
pub fn to_native(value: &Value) -> Result<serde_json::Value, NativeConversionError> {
    ensure_sufficient_stack(|| {
        let value = value
            .resolve()
            .map_err(|var| NativeConversionError::Incomplete(var.id()))?;
        Ok(match value {
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Float(x) => serde_json::Value::Number(
                Number::from_f64(x).ok_or(NativeConversionError::NonFiniteFloat(x))?,
            ),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Null => serde_json::Value::Null,
            Value::Char(c) => single_key(CHAR_KEY, serde_json::Value::String(c.to_string())),
            Value::Eof => single_key(EOF_KEY, serde_json::Value::Bool(true)),
            Value::Rec(rec) => rec_to_native(&rec)?,
            other => return Err(NativeConversionError::Unsupported(other.type_name())),
        })
    })
}

fn single_key(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    serde_json::Value::Object(map)
}

fn rec_to_native(rec: &Rec) -> Result<serde_json::Value, NativeConversionError> {
    if rec.label().is_none() {
        if rec.is_tuple() {
            return Ok(serde_json::Value::Array(
                rec.values().map(to_native).collect::<Result<_, _>>()?,
            ));
        }
        let plain_keys = rec
            .fields()
            .iter()
            .all(|(feature, _)| feature.as_str().is_some_and(|s| !s.starts_with('$')));
        if plain_keys {
            let mut map = Map::new();
            for (feature, field) in rec.fields() {
                map.insert(feature.to_string(), to_native(field)?);
            }
            return Ok(serde_json::Value::Object(map));
        }
    }

    let mut map = Map::new();
    if let Some(label) = rec.label() {
        map.insert(LABEL_KEY.to_string(), to_native(label)?);
    }
    let mut pairs = Vec::with_capacity(rec.len());
    for (feature, field) in rec.fields() {
        pairs.push(serde_json::Value::Array(vec![
            to_native(&feature.to_value())?,
            to_native(field)?,
        ]));
    }
    map.insert(FIELDS_KEY.to_string(), serde_json::Value::Array(pairs));
    Ok(serde_json::Value::Object(map))
}

/// Convert JSON to a complete value.
pub fn from_native(json: &serde_json::Value) -> Result<Value, NativeConversionError> {
    ensure_sufficient_stack(|| match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| NativeConversionError::Malformed(n.to_string())),
        },
        serde_json::Value::String(s) => Ok(Value::str(s)),
        serde_json::Value::Array(items) => Ok(Value::tuple(
            items.iter().map(from_native).collect::<Result<_, _>>()?,
        )),
        serde_json::Value::Object(map) => object_from_native(map),
    })
}

fn object_from_native(map: &Map<String, serde_json::Value>) -> Result<Value, NativeConversionError> {
    if map.len() == 1 {
        if let Some(serde_json::Value::String(s)) = map.get(CHAR_KEY) {
            let mut chars = s.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(NativeConversionError::Malformed(format!("{CHAR_KEY}: {s:?}"))),
            };
        }
        if map.contains_key(EOF_KEY) {
            return Ok(Value::Eof);
        }
    }

    let Some(pairs) = map.get(FIELDS_KEY) else {
        let fields = map
            .iter()
            .map(|(key, value)| Ok((Feature::str(key), from_native(value)?)))
            .collect::<Result<Vec<_>, NativeConversionError>>()?;
        return Rec::new(None, fields)
            .map(Value::Rec)
            .map_err(|err| NativeConversionError::Malformed(err.to_string()));
    };

    let label = map.get(LABEL_KEY).map(from_native).transpose()?;
    let serde_json::Value::Array(pairs) = pairs else {
        return Err(NativeConversionError::Malformed(format!("{FIELDS_KEY} must be an array")));
    };
    let mut fields = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (feature, value) = match pair {
            serde_json::Value::Array(kv) if kv.len() == 2 => (&kv[0], &kv[1]),
            other => return Err(NativeConversionError::Malformed(other.to_string())),
        };
        let feature = Feature::from_value(&from_native(feature)?)
            .ok_or_else(|| NativeConversionError::Malformed(feature.to_string()))?;
        fields.push((feature, from_native(value)?));
    }
    Rec::new(label, fields)
        .map(Value::Rec)
        .map_err(|err| NativeConversionError::Malformed(err.to_string()))
}
