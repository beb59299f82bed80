//! Source-faithful parse tree shared by the YAML and JSON decoders
//!
//! serde_yaml resolves plain scalars such as `3.10`, `0x1F` or `yes` to
//! numbers and booleans before a visitor sees them. A [`Node`] keeps the text
//! as written next to the resolved value: string fields read the text, opaque
//! fields keep the resolved value.
//!
//! Loading is two passes over the YAML input. The first builds a resolved
//! [`Value`]; the second walks the same events with that value as a guide and
//! reads every scalar back as text. Merge keys (`<<: *base`) are resolved on
//! the finished tree, and the typed model is decoded from it through
//! [`NodeDeserializer`].

use crate::error::{self, ComposeError, FORMAT_ERROR_PREFIX};
use serde::de::value::StringDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, IgnoredAny, IntoDeserializer,
    MapAccess, SeqAccess, Visitor,
};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which YAML merges another mapping into the current one
pub const MERGE_KEY: &str = "<<";

// Newtype name that asks a `NodeDeserializer` for the scalar text of its tree.
const RAW_NODE: &str = "$rune_compose::Node";

/// Format-neutral parse node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Explicit null or an empty value
    Null,
    /// String, number or boolean
    Scalar {
        /// Text as written in the source
        text: String,
        /// Value the decoder resolved the text to
        value: Value,
    },
    /// Ordered sequence
    Sequence(Vec<Node>),
    /// Mapping in source order
    Mapping(Vec<(String, Node)>),
}

impl Node {
    /// String scalar
    pub fn string(text: impl Into<String>) -> Self {
        let text = text.into();
        Node::Scalar {
            value: Value::String(text.clone()),
            text,
        }
    }

    /// Parse a YAML document, keeping scalar text and resolving merge keys
    pub fn from_yaml(bytes: &[u8]) -> error::Result<Self> {
        let shape: Value = serde_yaml::from_slice(bytes)?;
        if shape.is_null() {
            return Ok(Node::Null);
        }

        let mut node = Shape(&shape).deserialize(serde_yaml::Deserializer::from_slice(bytes))?;
        node.apply_merge()?;
        Ok(node)
    }

    /// Parse a JSON document
    pub fn from_json(bytes: &[u8]) -> error::Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        Ok(Node::from(value))
    }

    /// Human-readable node kind for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Scalar { .. } => "scalar",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }

    /// Scalar text, if this node is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Value of a mapping entry
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Mapping entries whose keys are not in `known`, as opaque values
    pub fn unknown_fields(&self, known: &[&str]) -> BTreeMap<String, Value> {
        let Node::Mapping(entries) = self else {
            return BTreeMap::new();
        };
        entries
            .iter()
            .filter(|(key, _)| !known.contains(&key.as_str()))
            .map(|(key, node)| (key.clone(), node.to_value()))
            .collect()
    }

    /// Opaque value with every scalar resolved
    pub fn to_value(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Scalar { value, .. } => value.clone(),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_value).collect()),
            Node::Mapping(entries) => Value::Mapping(
                entries
                    .iter()
                    .map(|(key, node)| (Value::String(key.clone()), node.to_value()))
                    .collect::<Mapping>(),
            ),
        }
    }

    /// Resolve merge keys throughout the tree
    ///
    /// Keys already present win over merged ones. With a sequence of sources
    /// (`<<: [*a, *b]`), earlier sources win over later ones.
    pub fn apply_merge(&mut self) -> error::Result<()> {
        match self {
            Node::Mapping(entries) => {
                let (merges, rest): (Vec<_>, Vec<_>) = std::mem::take(entries)
                    .into_iter()
                    .partition(|(key, _)| key == MERGE_KEY);
                *entries = rest;

                for (_, source) in merges {
                    let sources = match source {
                        Node::Sequence(items) => items,
                        other => vec![other],
                    };
                    for mut source in sources {
                        source.apply_merge()?;
                        let merged = match source {
                            Node::Mapping(merged) => merged,
                            other => {
                                return Err(ComposeError::format(format!(
                                    "invalid merge key: expected a mapping, found {}",
                                    other.kind()
                                )));
                            }
                        };
                        for (key, value) in merged {
                            if !entries.iter().any(|(existing, _)| *existing == key) {
                                entries.push((key, value));
                            }
                        }
                    }
                }

                for (_, value) in entries.iter_mut() {
                    value.apply_merge()?;
                }
            }
            Node::Sequence(items) => {
                for item in items.iter_mut() {
                    item.apply_merge()?;
                }
            }
            Node::Null | Node::Scalar { .. } => {}
        }
        Ok(())
    }

    fn from_value(value: &Value) -> Node {
        match value {
            Value::Null => Node::Null,
            Value::Bool(flag) => Node::Scalar {
                text: flag.to_string(),
                value: value.clone(),
            },
            Value::Number(number) => Node::Scalar {
                text: number.to_string(),
                value: value.clone(),
            },
            Value::String(text) => Node::string(text.clone()),
            Value::Sequence(items) => Node::Sequence(items.iter().map(Node::from_value).collect()),
            Value::Mapping(mapping) => Node::Mapping(
                mapping
                    .iter()
                    .map(|(key, value)| {
                        let key = Node::from_value(key);
                        (key.as_scalar().unwrap_or_default().to_string(), Node::from_value(value))
                    })
                    .collect(),
            ),
            Value::Tagged(tagged) => Node::from_value(&tagged.value),
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Node::Null,
            Json::Bool(flag) => Node::Scalar {
                text: flag.to_string(),
                value: Value::Bool(flag),
            },
            Json::Number(number) => {
                let value = if let Some(n) = number.as_u64() {
                    Value::from(n)
                } else if let Some(n) = number.as_i64() {
                    Value::from(n)
                } else {
                    Value::from(number.as_f64().unwrap_or_default())
                };
                Node::Scalar {
                    text: number.to_string(),
                    value,
                }
            }
            Json::String(text) => Node::string(text),
            Json::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Json::Object(map) => Node::Mapping(
                map.into_iter().map(|(key, value)| (key, Node::from(value))).collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_newtype_struct(RAW_NODE, NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a scalar, sequence or mapping")
    }

    fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(NodeVisitor)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Node, E> {
        Ok(Node::Scalar {
            text: value.to_string(),
            value: Value::Bool(value),
        })
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Node, E> {
        Ok(Node::Scalar {
            text: value.to_string(),
            value: Value::from(value),
        })
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Node, E> {
        Ok(Node::Scalar {
            text: value.to_string(),
            value: Value::from(value),
        })
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Node, E> {
        // Debug keeps the fractional part of whole numbers ("3.0", not "3").
        Ok(Node::Scalar {
            text: format!("{:?}", value),
            value: Value::from(value),
        })
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Node, E> {
        Ok(Node::string(value))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Node, E> {
        Ok(Node::string(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Node, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::Sequence(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Node, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<Node, Node>()? {
            let key = match key {
                Node::Scalar { text, .. } => text,
                Node::Null => String::new(),
                other => {
                    return Err(de::Error::custom(ComposeError::format(format!(
                        "unsupported {} mapping key",
                        other.kind()
                    ))));
                }
            };
            entries.push((key, value));
        }
        Ok(Node::Mapping(entries))
    }
}

// Second YAML pass: the resolved value from the first pass says what each
// event is, so scalars can be requested as strings and keep their text.
struct Shape<'a>(&'a Value);

impl<'de, 'a> DeserializeSeed<'de> for Shape<'a> {
    type Value = Node;

    fn deserialize<D>(self, deserializer: D) -> Result<Node, D::Error>
    where
        D: Deserializer<'de>,
    {
        match self.0 {
            Value::Null => {
                IgnoredAny::deserialize(deserializer)?;
                Ok(Node::Null)
            }
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                let text = deserializer.deserialize_str(ScalarText)?;
                Ok(Node::Scalar {
                    text,
                    value: self.0.clone(),
                })
            }
            Value::Sequence(items) => deserializer.deserialize_seq(SequenceShape(items)),
            Value::Mapping(mapping) => deserializer.deserialize_map(MappingShape(mapping)),
            Value::Tagged(tagged) => {
                IgnoredAny::deserialize(deserializer)?;
                Ok(Node::from_value(&tagged.value))
            }
        }
    }
}

struct ScalarText;

impl<'de> Visitor<'de> for ScalarText {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a scalar")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
        Ok(value.to_owned())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
        Ok(value)
    }
}

struct SequenceShape<'a>(&'a [Value]);

impl<'de, 'a> Visitor<'de> for SequenceShape<'a> {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a sequence of {} items", self.0.len())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Node, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(self.0.len());
        for shape in self.0 {
            match seq.next_element_seed(Shape(shape))? {
                Some(item) => items.push(item),
                None => return Err(de::Error::invalid_length(items.len(), &self)),
            }
        }
        Ok(Node::Sequence(items))
    }
}

struct MappingShape<'a>(&'a Mapping);

impl<'de, 'a> Visitor<'de> for MappingShape<'a> {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a mapping of {} entries", self.0.len())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Node, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(self.0.len());
        for (key_shape, value_shape) in self.0 {
            let key = match map.next_key_seed(Shape(key_shape))? {
                Some(Node::Scalar { text, .. }) => text,
                Some(Node::Null) => String::new(),
                Some(other) => {
                    return Err(de::Error::custom(format!(
                        "unsupported {} mapping key",
                        other.kind()
                    )));
                }
                None => return Err(de::Error::invalid_length(entries.len(), &self)),
            };
            let value = map.next_value_seed(Shape(value_shape))?;
            entries.push((key, value));
        }
        Ok(Node::Mapping(entries))
    }
}

/// Map a node tree onto a typed value
pub(crate) fn decode<T: DeserializeOwned>(node: Node) -> error::Result<T> {
    T::deserialize(NodeDeserializer::new(node)).map_err(ComposeError::from)
}

/// Failure while mapping a node tree onto the typed model
#[derive(Debug)]
pub struct DecodeError {
    path: Option<String>,
    message: String,
}

impl DecodeError {
    // The innermost field that failed names the error; outer fields keep it.
    fn at(mut self, path: &str) -> Self {
        if self.path.is_none() && !path.is_empty() {
            self.path = Some(path.to_string());
        }
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DecodeError {}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            path: None,
            message: msg.to_string(),
        }
    }
}

impl From<DecodeError> for ComposeError {
    fn from(err: DecodeError) -> Self {
        // Codec failures lead with the prefix; serde's own messages start with
        // fixed wording and only quote input text further in.
        match err.message.strip_prefix(FORMAT_ERROR_PREFIX) {
            Some(message) => ComposeError::Format(match &err.path {
                Some(path) => format!("{}: {}", path, message),
                None => message.to_string(),
            }),
            None => ComposeError::Decode(err.to_string()),
        }
    }
}

/// Deserializer over a [`Node`] tree
///
/// Strings are read from the source text, everything else from the resolved
/// value. A nested [`Node`] receives its subtree with text-only scalars.
pub(crate) struct NodeDeserializer {
    node: Node,
    path: String,
    raw: bool,
}

impl NodeDeserializer {
    pub(crate) fn new(node: Node) -> Self {
        Self {
            node,
            path: String::new(),
            raw: false,
        }
    }
}

impl<'de> Deserializer<'de> for NodeDeserializer {
    type Error = DecodeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Null => visitor.visit_unit(),
            Node::Scalar { text, .. } if self.raw => visitor.visit_string(text),
            Node::Scalar { text, value } => match value {
                Value::Bool(flag) => visitor.visit_bool(flag),
                Value::Number(number) => {
                    if let Some(n) = number.as_u64() {
                        visitor.visit_u64(n)
                    } else if let Some(n) = number.as_i64() {
                        visitor.visit_i64(n)
                    } else if let Some(n) = number.as_f64() {
                        visitor.visit_f64(n)
                    } else {
                        visitor.visit_string(text)
                    }
                }
                _ => visitor.visit_string(text),
            },
            Node::Sequence(items) => visitor.visit_seq(SeqNodes::new(items, self.path, self.raw)),
            Node::Mapping(entries) => {
                visitor.visit_map(MapNodes::new(entries, self.path, self.raw))
            }
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Scalar { text, .. } => visitor.visit_string(text),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Null => visitor.visit_unit(),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        if name == RAW_NODE {
            visitor.visit_newtype_struct(NodeDeserializer { raw: true, ..self })
        } else {
            visitor.visit_newtype_struct(self)
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Null => visitor.visit_seq(SeqNodes::new(Vec::new(), self.path, self.raw)),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        match self.node {
            Node::Null => visitor.visit_map(MapNodes::new(Vec::new(), self.path, self.raw)),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, DecodeError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char bytes
        byte_buf unit_struct tuple tuple_struct enum identifier
    }
}

struct SeqNodes {
    items: std::iter::Enumerate<std::vec::IntoIter<Node>>,
    path: String,
    raw: bool,
}

impl SeqNodes {
    fn new(items: Vec<Node>, path: String, raw: bool) -> Self {
        Self {
            items: items.into_iter().enumerate(),
            path,
            raw,
        }
    }
}

impl<'de> SeqAccess<'de> for SeqNodes {
    type Error = DecodeError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, DecodeError>
    where
        T: DeserializeSeed<'de>,
    {
        let Some((index, node)) = self.items.next() else {
            return Ok(None);
        };
        let path = format!("{}[{}]", self.path, index);
        let deserializer = NodeDeserializer {
            node,
            path: path.clone(),
            raw: self.raw,
        };
        seed.deserialize(deserializer).map(Some).map_err(|err| err.at(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MapNodes {
    entries: std::vec::IntoIter<(String, Node)>,
    pending: Option<(String, Node)>,
    path: String,
    raw: bool,
}

impl MapNodes {
    fn new(entries: Vec<(String, Node)>, path: String, raw: bool) -> Self {
        Self {
            entries: entries.into_iter(),
            pending: None,
            path,
            raw,
        }
    }
}

impl<'de> MapAccess<'de> for MapNodes {
    type Error = DecodeError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, DecodeError>
    where
        K: DeserializeSeed<'de>,
    {
        let Some((key, node)) = self.entries.next() else {
            return Ok(None);
        };
        let deserializer: StringDeserializer<DecodeError> = key.clone().into_deserializer();
        let key_value = seed.deserialize(deserializer)?;
        self.pending = Some((key, node));
        Ok(Some(key_value))
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, DecodeError>
    where
        V: DeserializeSeed<'de>,
    {
        let Some((key, node)) = self.pending.take() else {
            return Err(de::Error::custom("mapping value requested before its key"));
        };
        let path = if self.path.is_empty() {
            key
        } else {
            format!("{}.{}", self.path, key)
        };
        let deserializer = NodeDeserializer {
            node,
            path: path.clone(),
            raw: self.raw,
        };
        seed.deserialize(deserializer).map_err(|err| err.at(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Node {
        Node::from_yaml(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_yaml_scalars_keep_source_text() {
        let node = yaml("version: 3.10\nmask: 0x1F\nflag: yes\nwhole: 3.0\nquoted: '1.10'\n");

        assert_eq!(node.get("version").and_then(Node::as_scalar), Some("3.10"));
        assert_eq!(node.get("mask").and_then(Node::as_scalar), Some("0x1F"));
        assert_eq!(node.get("flag").and_then(Node::as_scalar), Some("yes"));
        assert_eq!(node.get("whole").and_then(Node::as_scalar), Some("3.0"));
        assert_eq!(node.get("quoted").and_then(Node::as_scalar), Some("1.10"));

        // The resolved side still sees numbers.
        assert!(node.get("version").unwrap().to_value().is_f64());
        assert_eq!(node.get("mask").unwrap().to_value().as_u64(), Some(31));
        assert!(node.get("quoted").unwrap().to_value().is_string());
    }

    #[test]
    fn test_yaml_null_and_empty() {
        assert_eq!(yaml(""), Node::Null);
        assert_eq!(yaml("a:\nb: ~\n").get("a"), Some(&Node::Null));
        assert_eq!(yaml("a:\nb: ~\n").get("b"), Some(&Node::Null));
    }

    #[test]
    fn test_yaml_aliases_keep_source_text() {
        let node = yaml("base: &v 1.10\nlist: [*v, 2.50]\n");
        let Some(Node::Sequence(items)) = node.get("list") else {
            panic!("expected a sequence");
        };
        assert_eq!(items[0].as_scalar(), Some("1.10"));
        assert_eq!(items[1].as_scalar(), Some("2.50"));
    }

    #[test]
    fn test_yaml_syntax_error_surfaces() {
        let err = Node::from_yaml(b"services: [").unwrap_err();
        assert!(matches!(err, ComposeError::Yaml(_)));
    }

    #[test]
    fn test_merge_keys() {
        let node = yaml(
            "base: &base\n  image: nginx\n  restart: always\nweb:\n  <<: *base\n  restart: no\n",
        );
        let web = node.get("web").unwrap();

        assert_eq!(web.get("image").and_then(Node::as_scalar), Some("nginx"));
        assert_eq!(web.get("restart").and_then(Node::as_scalar), Some("no"));
        assert!(web.get(MERGE_KEY).is_none());
    }

    #[test]
    fn test_merge_sequence_earlier_wins() {
        let node = yaml("a: &a {x: 1}\nb: &b {x: 2, y: 2}\nc:\n  <<: [*a, *b]\n");
        let c = node.get("c").unwrap();

        assert_eq!(c.get("x").and_then(Node::as_scalar), Some("1"));
        assert_eq!(c.get("y").and_then(Node::as_scalar), Some("2"));
    }

    #[test]
    fn test_nested_merge_in_source() {
        let node = yaml("a: &a {x: 1}\nb: &b\n  <<: *a\n  y: 2\nc:\n  <<: *b\n");
        let c = node.get("c").unwrap();

        assert_eq!(c.get("x").and_then(Node::as_scalar), Some("1"));
        assert_eq!(c.get("y").and_then(Node::as_scalar), Some("2"));
        assert!(c.get(MERGE_KEY).is_none());
    }

    #[test]
    fn test_merge_rejects_scalar() {
        let err = Node::from_yaml(b"a:\n  <<: oops\n").unwrap_err();
        assert!(err.is_format(), "unexpected error: {err}");
    }

    #[test]
    fn test_json_tree() {
        let node = Node::from_json(br#"{"a": [1, null, "x", true]}"#).unwrap();
        let Some(Node::Sequence(items)) = node.get("a") else {
            panic!("expected a sequence");
        };
        assert_eq!(items[0].as_scalar(), Some("1"));
        assert_eq!(items[1], Node::Null);
        assert_eq!(items[2], Node::string("x"));
        assert_eq!(items[3].to_value(), Value::Bool(true));
    }

    #[test]
    fn test_json_keeps_merge_key_literal() {
        let node = Node::from_json(br#"{"<<": {"a": 1}}"#).unwrap();
        assert!(node.get(MERGE_KEY).is_some());
    }

    #[test]
    fn test_unknown_fields() {
        let node = yaml("image: nginx\nx-team: infra\nreplicas: 2\n");
        let extra = node.unknown_fields(&["image"]);

        assert_eq!(extra.len(), 2);
        assert_eq!(extra["x-team"], Value::String("infra".to_string()));
        assert_eq!(extra["replicas"].as_u64(), Some(2));
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        count: Option<u64>,
        tags: Vec<String>,
    }

    #[test]
    fn test_decode_reads_strings_as_text() {
        let sample: Sample = decode(yaml("name: 1.10\ncount: 3\ntags: [0x1F, on]\n")).unwrap();

        assert_eq!(sample.name, "1.10");
        assert_eq!(sample.count, Some(3));
        assert_eq!(sample.tags, ["0x1F", "on"]);
    }

    #[test]
    fn test_decode_error_carries_path() {
        let err = decode::<Sample>(yaml("name: x\ncount: many\ntags: []\n")).unwrap_err();

        assert!(matches!(err, ComposeError::Decode(_)));
        assert!(err.to_string().contains("count: invalid type"), "unexpected error: {err}");
    }

    #[test]
    fn test_prefix_inside_user_text_is_not_a_format_error() {
        let err =
            decode::<Sample>(yaml("name: x\ncount: 'Format error: x'\ntags: []\n")).unwrap_err();

        assert!(!err.is_format());
        assert!(err.to_string().contains("\"Format error: x\""), "unexpected error: {err}");
    }

    #[test]
    fn test_codec_failure_becomes_format_error() {
        let err = ComposeError::from(DecodeError {
            path: Some("services.web.environment".to_string()),
            message: "Format error: invalid environment format: FOO".to_string(),
        });

        assert!(err.is_format());
        assert_eq!(
            err.to_string(),
            "Format error: services.web.environment: invalid environment format: FOO"
        );
    }
}
