//! Dynamic Values
//!
//! Application state is a tree of dynamically-typed values, the same shape as
//! JSON: primitives at the leaves, shared [`Object`] and [`Array`] handles for
//! containers. Containers have reference identity. Cloning a `Value` clones
//! the handle, never the contents, so two clones observe and mutate the same
//! container.

use std::fmt;
use std::rc::Rc;

use super::array::Array;
use super::object::Object;
use super::observer::Observer;

/// A reactive state value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Strict equality with NaN treated as equal to itself.
    ///
    /// This is the rule used to suppress notifications on writes: primitives
    /// compare by value, containers by identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Check whether this value is an object or array.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// Check whether this value is a primitive (not a container).
    pub fn is_primitive(&self) -> bool {
        !self.is_container()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The container's observer, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(object) => object.observer(),
            Value::Array(array) => array.observer(),
            _ => None,
        }
    }

    /// Read a property of an object value. Tracks like [`Object::get`].
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Build a value from JSON, allocating fresh (unobserved) containers.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.into_iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.assign(&key, Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Convert to JSON. Reads go through the tracking accessors, so calling
    /// this inside a watcher subscribes it to the whole tree.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serde_json::Value::Number((*n as i64).into())
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(array) => {
                serde_json::Value::Array(array.to_vec().iter().map(Value::to_json).collect())
            }
            Value::Object(object) => {
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    let value = object.get(&key).unwrap_or_default();
                    map.insert(key, value.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// String conversion used for text content and default array sorting.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(array) => array
                .to_vec()
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(object) => write!(f, "{object:?}"),
            Value::Array(array) => write!(f, "{array:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_value_treats_nan_as_equal() {
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(Value::from(1).same_value(&Value::from(1.0)));
        assert!(!Value::from(1).same_value(&Value::from("1")));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::from_json(json!({ "x": 1 }));
        let b = Value::from_json(json!({ "x": 1 }));

        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let source = json!({ "name": "weft", "tags": ["a", "b"], "nested": { "n": 2.5 } });
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn display_strings_follow_js_conventions() {
        assert_eq!(Value::from(3).to_display_string(), "3");
        assert_eq!(Value::from(0.5).to_display_string(), "0.5");
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(Value::from_json(json!([1, "a"])).to_display_string(), "1,a");
    }
}
