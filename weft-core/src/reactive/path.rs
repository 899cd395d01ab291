//! Dot-delimited path getters (`"user.address.city"`).

use super::value::Value;
use crate::error::{Error, Result};

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}

/// Parse a simple path. Only word characters, `$` and `.` are accepted;
/// anything that looks like an expression is rejected.
pub fn parse_path(path: &str) -> Result<Path> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(Path {
        segments: path.split('.').map(str::to_string).collect(),
    })
}

impl Path {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The path below its first segment.
    pub(crate) fn tail(&self) -> Path {
        Path {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Walk the path from `root`. Reads are tracked. A missing link yields
    /// `Null`.
    pub fn resolve(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            current = match &current {
                Value::Object(object) => object.get(segment).unwrap_or_default(),
                Value::Array(array) if segment == "length" => Value::from(array.len() as f64),
                Value::Array(array) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| array.get(index))
                    .unwrap_or_default(),
                _ => return Value::Null,
            };
        }
        current
    }
}
