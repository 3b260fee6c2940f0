// src/config/params.rs

//! The resolved configuration mapping shared by every task.

use std::collections::BTreeMap;
use std::fmt;

use toml::{Table, Value};

use crate::errors::{FiledagError, Result};

/// Immutable key/value mapping produced by the configuration resolver.
///
/// Keys are plain or namespaced strings (`samtool`, `annotations_interface_geneset`);
/// values are TOML scalars, arrays or nested tables. Nested tables can be
/// addressed with dotted keys (`bwa.threads`). Mutation is crate-private:
/// once the resolver hands a `Params` out it is only ever read, usually
/// through an `Arc<Params>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a parsed document into the mapping; keys already present are
    /// overwritten, nested tables are merged key by key.
    pub(crate) fn merge_table(&mut self, table: Table) {
        for (key, value) in table {
            match self.values.get_mut(&key) {
                Some(existing) => deep_merge(existing, value),
                None => {
                    self.values.insert(key, value);
                }
            }
        }
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a key. An exact top-level key wins; otherwise a dotted key
    /// walks nested tables.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.values.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String form of an optional key; missing keys read as empty.
    pub fn get_str(&self, key: &str) -> String {
        self.display(key).unwrap_or_default()
    }

    /// String form of a key that must be present.
    pub fn require_str(&self, key: &str) -> Result<String> {
        match self.get(key) {
            None => Err(FiledagError::MissingKey(key.to_string())),
            Some(value) => display_value(value).ok_or_else(|| {
                FiledagError::ConfigError(format!(
                    "configuration key '{key}' holds a table, expected a scalar"
                ))
            }),
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }

    /// Text substituted for `{key}` in templates. Tables have no text form.
    pub fn display(&self, key: &str) -> Option<String> {
        self.get(key).and_then(display_value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.values {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

fn deep_merge(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Table(current), Value::Table(new)) => {
            for (key, value) in new {
                match current.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Render a value for substitution into a command line.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(display_value).collect();
            parts.map(|p| p.join(" "))
        }
        Value::Table(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Table {
        toml::from_str::<Table>(src).unwrap()
    }

    #[test]
    fn later_tables_override_and_nested_tables_merge() {
        let mut params = Params::new();
        params.merge_table(table("k = 1\n[bwa]\nthreads = 2\nindex = \"hg38\"\n"));
        params.merge_table(table("k = 3\n[bwa]\nthreads = 8\n"));

        assert_eq!(params.get_int("k"), Some(3));
        assert_eq!(params.get_str("bwa.threads"), "8");
        assert_eq!(params.get_str("bwa.index"), "hg38");
    }

    #[test]
    fn missing_optional_key_reads_as_empty() {
        let params = Params::new();
        assert_eq!(params.get_str("database"), "");
    }

    #[test]
    fn require_str_names_missing_key() {
        let params = Params::new();
        match params.require_str("annotations_dir") {
            Err(FiledagError::MissingKey(key)) => assert_eq!(key, "annotations_dir"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn arrays_render_space_separated() {
        let params: Params = [("flags", Value::from(vec!["-a", "-b"]))].into_iter().collect();
        assert_eq!(params.display("flags").as_deref(), Some("-a -b"));
    }
}
