use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROPERTIES: &str = "properties";
pub const ITEMS: &str = "items";
pub const TYPE: &str = "type";

/// Position of a node inside a schema tree, e.g. `properties.pets.items`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trace(Vec<String>);

impl Trace {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A new trace extended by `segments`; `self` is left untouched.
    pub fn child(&self, segments: &[&str]) -> Self {
        let mut next = self.0.clone();
        next.extend(segments.iter().map(|s| s.to_string()));
        Self(next)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Trace {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-keyword rewrite applied by [`walk`].
///
/// Returning `None` drops the keyword. Otherwise the returned fragment is
/// merged into the node being built; it is usually `{keyword: value}` but may
/// be empty or carry several keys.
pub trait KeywordTransform {
    fn transform(&self, keyword: &str, value: &Value, trace: &Trace) -> Option<Map<String, Value>>;
}

impl<F> KeywordTransform for F
where
    F: Fn(&str, &Value, &Trace) -> Option<Map<String, Value>>,
{
    fn transform(&self, keyword: &str, value: &Value, trace: &Trace) -> Option<Map<String, Value>> {
        self(keyword, value, trace)
    }
}

pub type KeywordHandler =
    Box<dyn Fn(&str, &Value, &Trace) -> Option<Map<String, Value>> + Send + Sync>;

/// Keyword-indexed handler table with a fallback for everything else.
pub struct KeywordDispatch {
    handlers: HashMap<String, KeywordHandler>,
    fallback: KeywordHandler,
}

impl KeywordDispatch {
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn(&str, &Value, &Trace) -> Option<Map<String, Value>> + Send + Sync + 'static,
    {
        Self {
            handlers: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    /// Identity fallback: every keyword passes through unchanged.
    pub fn passthrough() -> Self {
        Self::new(|keyword, value, _| Some(fragment(keyword, value.clone())))
    }

    pub fn on<F>(mut self, keyword: &str, handler: F) -> Self
    where
        F: Fn(&str, &Value, &Trace) -> Option<Map<String, Value>> + Send + Sync + 'static,
    {
        self.handlers.insert(keyword.to_string(), Box::new(handler));
        self
    }
}

impl KeywordTransform for KeywordDispatch {
    fn transform(&self, keyword: &str, value: &Value, trace: &Trace) -> Option<Map<String, Value>> {
        match self.handlers.get(keyword) {
            Some(handler) => handler(keyword, value, trace),
            None => (self.fallback)(keyword, value, trace),
        }
    }
}

/// A single-key fragment `{keyword: value}`.
pub fn fragment(keyword: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(keyword.to_string(), value);
    map
}

/// Read a value as a schema node; a bare string is shorthand for `{type}`.
pub fn as_schema_node(node: &Value) -> Option<Cow<'_, Map<String, Value>>> {
    match node {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::String(name) => Some(Cow::Owned(fragment(TYPE, Value::String(name.clone())))),
        _ => None,
    }
}

/// Rewrite `node` keyword by keyword. Returns `None` when `node` is not a schema.
///
/// Fragments returned by `transform` are left-merged. When the transform keeps
/// `properties` or `items`, the walker recurses into the original child schemas
/// with an extended [`Trace`].
pub fn walk<T>(node: &Value, transform: &T, trace: &Trace) -> Option<Value>
where
    T: KeywordTransform + ?Sized,
{
    let node = as_schema_node(node)?;

    let mut next = Map::new();
    for (keyword, value) in node.iter() {
        let Some(mut part) = transform.transform(keyword, value, trace) else {
            continue;
        };

        if keyword == PROPERTIES && part.contains_key(PROPERTIES) {
            let properties = walk_properties(value, transform, &trace.child(&[PROPERTIES]));
            part.insert(PROPERTIES.to_string(), Value::Object(properties));
        }

        if keyword == ITEMS && part.contains_key(ITEMS) {
            match walk(value, transform, &trace.child(&[ITEMS])) {
                Some(items) => {
                    part.insert(ITEMS.to_string(), items);
                }
                None => {
                    part.remove(ITEMS);
                }
            }
        }

        merge_left(&mut next, part);
    }

    Some(Value::Object(next))
}

fn walk_properties<T>(value: &Value, transform: &T, trace: &Trace) -> Map<String, Value>
where
    T: KeywordTransform + ?Sized,
{
    let mut properties = Map::new();
    let Value::Object(props) = value else {
        return properties;
    };

    for (name, schema) in props {
        if let Some(walked) = walk(schema, transform, &trace.child(&[name])) {
            properties.insert(name.clone(), walked);
        }
    }
    properties
}

/// Deep-merge `source` into `target`, keeping what `target` already has.
///
/// Keys missing from `target` are copied over; when both sides hold a mapping
/// they are merged recursively; any other collision (arrays included) keeps
/// the existing value.
pub fn merge_left(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        match target.get_mut(&key) {
            None => {
                target.insert(key, incoming);
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = incoming {
                    merge_left(existing, incoming);
                }
            }
            Some(_) => {}
        }
    }
}

/// [`merge_left`] over values; non-mapping operands leave `target` unchanged.
pub fn merge_left_value(target: &mut Value, source: &Value) {
    if let (Value::Object(target), Value::Object(source)) = (target, source) {
        merge_left(target, source.clone());
    }
}
