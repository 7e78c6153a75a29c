//! Scalar values held at flat-store leaves.
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Bool,
    Int,
    Float,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalarKind::String => "string",
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
        })
    }
}

impl ScalarKind {
    pub fn zero(&self) -> Scalar {
        match self {
            ScalarKind::String => Scalar::String(String::new()),
            ScalarKind::Bool => Scalar::Bool(false),
            ScalarKind::Int => Scalar::Int(0),
            ScalarKind::Float => Scalar::Float(OrderedFloat(0.0)),
        }
    }
}

/// Floats go through `OrderedFloat` so scalars can live in hashed and
/// ordered sets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::String(_) => ScalarKind::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            // NaN / inf have no JSON form
            Scalar::Float(f) => Number::from_f64(f.0).map(Value::Number).unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    /// Untyped read of a JSON leaf. Integral numbers become `Int`.
    pub fn from_json(v: &Value) -> Option<Scalar> {
        match v {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(|f| Scalar::Float(OrderedFloat(f)))),
            _ => None,
        }
    }

    /// Typed read of a JSON leaf. JSON has one number type, so any number is
    /// accepted for `Float`; everything else must match exactly.
    pub fn from_json_as(v: &Value, kind: ScalarKind) -> Option<Scalar> {
        match (kind, v) {
            (ScalarKind::String, Value::String(s)) => Some(Scalar::String(s.clone())),
            (ScalarKind::Bool, Value::Bool(b)) => Some(Scalar::Bool(*b)),
            (ScalarKind::Int, Value::Number(n)) => n.as_i64().map(Scalar::Int),
            (ScalarKind::Float, Value::Number(n)) => n.as_f64().map(|f| Scalar::Float(OrderedFloat(f))),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{}", x.0),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(OrderedFloat(f))
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
