#![forbid(unsafe_code)]

//! Layout store: the JSON component tree the engine reads inputs from and
//! writes outputs into.
//!
//! The engine only ever addresses components by [`LayoutPath`] obtained from
//! the path registry, and only ever reads or merges a component's `props`.

use serde_json::{Map, Value};

use crate::paths::PathSegment;

/// Who caused a props write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Interaction in the rendered UI.
    User,
    /// Callback output.
    Response,
}

/// Storage for the layout tree.
pub trait LayoutStore {
    /// Props of the component at `path`.
    fn read(&self, path: &[PathSegment]) -> Option<&Map<String, Value>>;

    /// Merge `props` into the component at `path`. Returns false when no
    /// component lives there.
    fn write(&mut self, path: &[PathSegment], props: Map<String, Value>, source: UpdateSource) -> bool;

    /// The whole tree.
    fn root(&self) -> &Value;

    /// Swap in a new tree.
    fn replace(&mut self, layout: Value);

    /// A single prop value.
    fn read_prop(&self, path: &[PathSegment], prop: &str) -> Option<&Value> {
        self.read(path).and_then(|props| props.get(prop))
    }
}

/// Walk `path` from `root`.
#[must_use]
pub fn value_at<'a>(root: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| match segment {
        PathSegment::Key(k) => node.get(k.as_str()),
        PathSegment::Index(i) => node.get(*i),
    })
}

fn value_at_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |node, segment| match segment {
        PathSegment::Key(k) => node.get_mut(k.as_str()),
        PathSegment::Index(i) => node.get_mut(*i),
    })
}

/// In-memory [`LayoutStore`] over a `serde_json::Value`.
#[derive(Debug, Clone, Default)]
pub struct JsonLayout {
    root: Value,
    user_writes: u64,
    response_writes: u64,
}

impl JsonLayout {
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self {
            root,
            user_writes: 0,
            response_writes: 0,
        }
    }

    /// Number of successful writes, by source.
    #[must_use]
    pub fn write_count(&self, source: UpdateSource) -> u64 {
        match source {
            UpdateSource::User => self.user_writes,
            UpdateSource::Response => self.response_writes,
        }
    }
}

impl LayoutStore for JsonLayout {
    fn read(&self, path: &[PathSegment]) -> Option<&Map<String, Value>> {
        value_at(&self.root, path)?.get("props")?.as_object()
    }

    fn write(&mut self, path: &[PathSegment], props: Map<String, Value>, source: UpdateSource) -> bool {
        let Some(Value::Object(target)) =
            value_at_mut(&mut self.root, path).and_then(|node| node.get_mut("props"))
        else {
            return false;
        };
        target.extend(props);
        match source {
            UpdateSource::User => self.user_writes += 1,
            UpdateSource::Response => self.response_writes += 1,
        }
        true
    }

    fn root(&self) -> &Value {
        &self.root
    }

    fn replace(&mut self, layout: Value) {
        self.root = layout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> JsonLayout {
        JsonLayout::new(json!({
            "type": "Div",
            "props": {"id": "root", "children": [
                {"type": "Input", "props": {"id": "a", "value": 1}}
            ]}
        }))
    }

    fn child() -> Vec<PathSegment> {
        vec![
            PathSegment::key("props"),
            PathSegment::key("children"),
            PathSegment::Index(0),
        ]
    }

    #[test]
    fn write_merges_props() {
        let mut layout = tree();
        let mut props = Map::new();
        props.insert("value".into(), json!(2));
        props.insert("label".into(), json!("x"));
        assert!(layout.write(&child(), props, UpdateSource::Response));
        assert_eq!(layout.read_prop(&child(), "value"), Some(&json!(2)));
        assert_eq!(layout.read_prop(&child(), "id"), Some(&json!("a")));
        assert_eq!(layout.write_count(UpdateSource::Response), 1);
        assert_eq!(layout.write_count(UpdateSource::User), 0);
    }

    #[test]
    fn write_to_missing_path_is_rejected() {
        let mut layout = tree();
        let missing = vec![PathSegment::key("props"), PathSegment::key("nope")];
        assert!(!layout.write(&missing, Map::new(), UpdateSource::User));
    }
}
