use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Component name -> value mapping, used for run configs and live strategy configs.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A strategy configuration value.
///
/// Equality and hashing are total: floats compare by a canonical bit pattern
/// (`-0.0 == 0.0`, every NaN equals every other NaN). Numbers compare by value,
/// so `Int(10) == Float(10.0)` and both hash alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Converts a JSON value. `null` anywhere inside the value has no
    /// representation and yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Self::Map),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null), // NaN / infinity have no JSON form
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn canonical_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// The `i64` an integral float stands for, if it has one.
fn integral_value(f: f64) -> Option<i64> {
    // 2^63 itself is out of range; i64::MIN as f64 is exact
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => integral_value(*f) == Some(*i),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConfigValue {}

impl Hash for ConfigValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(i) => hash_int(*i, state),
            Self::Float(f) => match integral_value(*f) {
                Some(i) => hash_int(i, state),
                None => {
                    std::mem::discriminant(self).hash(state);
                    canonical_bits(*f).hash(state);
                }
            },
            Self::Bool(b) => {
                std::mem::discriminant(self).hash(state);
                b.hash(state);
            }
            Self::String(s) => {
                std::mem::discriminant(self).hash(state);
                s.hash(state);
            }
            Self::List(items) => {
                std::mem::discriminant(self).hash(state);
                items.hash(state);
            }
            Self::Map(entries) => {
                std::mem::discriminant(self).hash(state);
                entries.hash(state);
            }
        }
    }
}

fn hash_int<H: Hasher>(i: i64, state: &mut H) {
    std::mem::discriminant(&ConfigValue::Int(0)).hash(state);
    i.hash(state);
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
