use std::collections::BTreeMap;

use serde_json::Number;

use crate::processor::Upload;

/// A GraphQL operation: field name to value, e.g. `query` and `variables`.
pub type Operation = BTreeMap<String, Value>;

/// A JSON value in which file placeholders may appear.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Upload(Upload),
}

impl Value {
    pub fn as_upload(&self) -> Option<&Upload> {
        match self {
            Value::Upload(upload) => Some(upload),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(str) => Some(str),
            _ => None,
        }
    }

    /// Looks up a dot separated path such as `variables.files.0`.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::List(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
    }

    /// Replaces the value at a dot separated path.
    ///
    /// Every segment but the last must resolve to an existing object or list. The last
    /// segment may add a key to an object but must hit an existing index of a list.
    /// Returns false when the path can't be resolved, leaving `self` untouched.
    pub(crate) fn set_path(&mut self, path: &str, value: Value) -> bool {
        let (parents, last) = match path.rsplit_once('.') {
            Some((parents, last)) => (Some(parents), last),
            None => (None, path),
        };

        let mut current = self;
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                let next = match current {
                    Value::Object(map) => map.get_mut(segment),
                    Value::List(items) => segment.parse::<usize>().ok().and_then(|index| items.get_mut(index)),
                    _ => None,
                };
                match next {
                    Some(next) => current = next,
                    None => return false,
                }
            }
        }

        match current {
            Value::Object(map) if !last.is_empty() => {
                map.insert(last.to_owned(), value);
                true
            }
            Value::List(items) => match last.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(bool) => Value::Bool(bool),
            serde_json::Value::Number(number) => Value::Number(number),
            serde_json::Value::String(str) => Value::String(str),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(key, value)| (key, Value::from(value))).collect())
            }
        }
    }
}

impl From<Upload> for Value {
    fn from(upload: Upload) -> Self {
        Value::Upload(upload)
    }
}

impl From<&str> for Value {
    fn from(str: &str) -> Self {
        Value::String(str.to_owned())
    }
}

/// Result of processing a multipart request; becomes the request's logical body.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessRequestResult {
    Single(Operation),
    /// Batched operations, in request order
    Batch(Vec<Operation>),
}

impl ProcessRequestResult {
    pub fn operations(&self) -> &[Operation] {
        match self {
            ProcessRequestResult::Single(operation) => std::slice::from_ref(operation),
            ProcessRequestResult::Batch(operations) => operations,
        }
    }

    #[inline]
    pub fn is_batch(&self) -> bool {
        matches!(self, ProcessRequestResult::Batch(_))
    }
}

impl From<Operation> for ProcessRequestResult {
    fn from(operation: Operation) -> Self {
        ProcessRequestResult::Single(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operations() -> Value {
        Value::from(json!({
            "query": "mutation ($file: Upload!, $files: [Upload!]!) { upload(file: $file, files: $files) }",
            "variables": { "file": null, "files": [null, null] }
        }))
    }

    #[test]
    fn converts_json_tree() {
        let value = operations();
        assert!(value.pointer("query").and_then(Value::as_str).is_some());
        assert_eq!(value.pointer("variables.file"), Some(&Value::Null));
        assert_eq!(value.pointer("variables.files.1"), Some(&Value::Null));
        assert_eq!(value.pointer("variables.files.2"), None);
    }

    #[test]
    fn sets_object_and_list_paths() {
        let mut value = operations();

        assert!(value.set_path("variables.file", Value::from("a")));
        assert!(value.set_path("variables.files.1", Value::from("b")));

        assert_eq!(value.pointer("variables.file").and_then(Value::as_str), Some("a"));
        assert_eq!(value.pointer("variables.files.0"), Some(&Value::Null));
        assert_eq!(value.pointer("variables.files.1").and_then(Value::as_str), Some("b"));
    }

    #[test]
    fn sets_batched_paths() {
        let mut value = Value::from(json!([{ "variables": { "file": null } }, { "variables": { "file": null } }]));

        assert!(value.set_path("1.variables.file", Value::from("second")));
        assert_eq!(value.pointer("0.variables.file"), Some(&Value::Null));
        assert_eq!(value.pointer("1.variables.file").and_then(Value::as_str), Some("second"));
    }

    #[test]
    fn rejects_unresolvable_paths() {
        let mut value = operations();
        let before = value.clone();

        assert!(!value.set_path("variables.missing.file", Value::Null));
        assert!(!value.set_path("variables.files.5", Value::Null));
        assert!(!value.set_path("variables.files.x", Value::Null));
        assert!(!value.set_path("query.file", Value::Null));
        assert!(!value.set_path("variables.", Value::Null));

        assert_eq!(value, before);
    }

    #[test]
    fn batch_exposes_all_operations() {
        let single = ProcessRequestResult::from(Operation::new());
        assert_eq!(single.operations().len(), 1);
        assert!(!single.is_batch());

        let batch = ProcessRequestResult::Batch(vec![Operation::new(), Operation::new()]);
        assert_eq!(batch.operations().len(), 2);
        assert!(batch.is_batch());
    }
}
