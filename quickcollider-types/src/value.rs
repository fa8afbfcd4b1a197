//! Dynamically-typed argument values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    Double,
    String,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single OSC argument or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    String(String),
}

/// Why a value could not be converted to another type.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    OutOfRange { value: Value, target: ValueType },
    Unparsable { text: String, target: ValueType },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { value, target } => {
                write!(f, "{} does not fit into {}", value, target)
            }
            Self::Unparsable { text, target } => {
                write!(f, "cannot parse {:?} as {}", text, target)
            }
        }
    }
}

impl std::error::Error for ValueError {}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
        }
    }

    /// Numeric view of the value, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form used wherever a path or member name is expected.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Convert to `target`, the way an attribute write coerces its argument.
    ///
    /// Floating point to int truncates toward zero; values outside the `i32`
    /// range (and NaN) are rejected. Strings are parsed after trimming.
    pub fn coerce(&self, target: ValueType) -> Result<Value, ValueError> {
        if self.value_type() == target {
            return Ok(self.clone());
        }
        match (self, target) {
            (_, ValueType::String) => Ok(Value::String(self.to_string())),
            (Value::String(text), _) => parse_as(text, target),
            (_, ValueType::Int) => {
                // Only Float and Double reach here.
                let v = self.as_f64().unwrap_or(f64::NAN);
                if v.is_finite() && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
                    Ok(Value::Int(v.trunc() as i32))
                } else {
                    Err(ValueError::OutOfRange {
                        value: self.clone(),
                        target,
                    })
                }
            }
            (_, ValueType::Float) => Ok(Value::Float(self.as_f64().unwrap_or(f64::NAN) as f32)),
            (_, ValueType::Double) => Ok(Value::Double(self.as_f64().unwrap_or(f64::NAN))),
        }
    }
}

fn parse_as(text: &str, target: ValueType) -> Result<Value, ValueError> {
    let trimmed = text.trim();
    let unparsable = || ValueError::Unparsable {
        text: text.to_string(),
        target,
    };
    match target {
        ValueType::Int => match trimmed.parse::<i32>() {
            Ok(v) => Ok(Value::Int(v)),
            Err(_) => {
                let v = trimmed.parse::<f64>().map_err(|_| unparsable())?;
                Value::Double(v).coerce(ValueType::Int)
            }
        },
        ValueType::Float => trimmed
            .parse::<f32>()
            .map(Value::Float)
            .map_err(|_| unparsable()),
        ValueType::Double => trimmed
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| unparsable()),
        ValueType::String => Ok(Value::String(text.to_string())),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
