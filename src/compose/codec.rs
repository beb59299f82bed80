//! Primitive codecs for compose fields with more than one accepted shape
//!
//! Every polymorphic field is first read into a [`Node`] and then converted
//! explicitly into its canonical in-memory form. The model types never look
//! at raw decoder shapes themselves; they delegate to the functions here.

use super::node::Node;
use crate::error::ComposeError;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Tag used when an image reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// Healthcheck test prefix for a command run through the shell
pub const CMD_SHELL: &str = "CMD-SHELL";

static ENV_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)=(.+)$").expect("environment entry pattern"));

// The tag is whatever follows the last ':' as long as it holds no '/'.
static IMAGE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):([^/:]+)$").expect("image reference pattern"));

fn invalid(field: &str) -> ComposeError {
    ComposeError::format(format!("invalid {} format", field))
}

fn invalid_entry(field: &str, entry: &str) -> ComposeError {
    ComposeError::format(format!("invalid {} format: {}", field, entry))
}

/// Scalar text, with null read as the empty string
fn scalar_or_empty(node: Node, field: &str, entry: &str) -> Result<String, ComposeError> {
    match node {
        Node::Scalar { text, .. } => Ok(text),
        Node::Null => Ok(String::new()),
        _ => Err(invalid_entry(field, entry)),
    }
}

/// Decode a string-to-string mapping written either as a mapping or as a
/// sequence of `KEY=VALUE` entries.
///
/// Later keys overwrite earlier ones.
pub fn decode_key_values(
    node: Node,
    field: &str,
) -> Result<BTreeMap<String, String>, ComposeError> {
    let mut values = BTreeMap::new();
    match node {
        Node::Sequence(items) => {
            for item in items {
                let entry = match item {
                    Node::Scalar { text, .. } => text,
                    other => return Err(invalid_entry(field, other.kind())),
                };
                let captures = ENV_ENTRY
                    .captures(&entry)
                    .ok_or_else(|| invalid_entry(field, &entry))?;
                values.insert(captures[1].to_string(), captures[2].to_string());
            }
        }
        Node::Mapping(entries) => {
            for (key, value) in entries {
                let value = scalar_or_empty(value, field, &key)?;
                values.insert(key, value);
            }
        }
        _ => return Err(invalid(field)),
    }
    Ok(values)
}

/// Decode a sequence of scalars
pub fn decode_string_list(node: Node, field: &str) -> Result<Vec<String>, ComposeError> {
    let Node::Sequence(items) = node else {
        return Err(invalid(field));
    };
    items
        .into_iter()
        .map(|item| match item {
            Node::Scalar { text, .. } => Ok(text),
            other => Err(invalid_entry(field, other.kind())),
        })
        .collect()
}

/// Services a service depends on, each with an optional readiness condition
///
/// An empty condition means "no condition". Accepts the short sequence form
/// (`[db, cache]`) and the long mapping form
/// (`{db: {condition: service_healthy}, cache: null}`). Encodes in the short
/// form whenever no entry carries a condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependsOnConfig {
    entries: BTreeMap<String, String>,
}

impl DependsOnConfig {
    /// Create an empty dependency set
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a parse node into a dependency set
    pub fn from_node(node: Node) -> Result<Self, ComposeError> {
        let mut entries = BTreeMap::new();
        match node {
            Node::Sequence(items) => {
                for item in items {
                    match item {
                        Node::Scalar { text, .. } => entries.insert(text, String::new()),
                        other => return Err(invalid_entry("depends_on", other.kind())),
                    };
                }
            }
            Node::Mapping(services) => {
                for (service, value) in services {
                    let condition = match value {
                        Node::Null => String::new(),
                        Node::Mapping(fields) => {
                            match fields.into_iter().find(|(key, _)| key == "condition") {
                                Some((_, condition)) => {
                                    scalar_or_empty(condition, "depends_on", &service)?
                                }
                                None => String::new(),
                            }
                        }
                        _ => return Err(invalid_entry("depends_on", &service)),
                    };
                    entries.insert(service, condition);
                }
            }
            _ => return Err(invalid("depends_on")),
        }
        Ok(Self { entries })
    }

    /// Add or replace a dependency, returning the previous condition
    pub fn insert(
        &mut self,
        service: impl Into<String>,
        condition: impl Into<String>,
    ) -> Option<String> {
        self.entries.insert(service.into(), condition.into())
    }

    /// Remove a dependency
    pub fn remove(&mut self, service: &str) -> Option<String> {
        self.entries.remove(service)
    }

    /// Condition for a dependency; empty when it has none
    pub fn condition(&self, service: &str) -> Option<&str> {
        self.entries.get(service).map(String::as_str)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.entries.contains_key(service)
    }

    /// Dependency names in sorted order
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no dependency carries a condition, so the short form is lossless
    pub fn is_short_form(&self) -> bool {
        self.entries.values().all(String::is_empty)
    }
}

impl<S: Into<String>, C: Into<String>> FromIterator<(S, C)> for DependsOnConfig {
    fn from_iter<I: IntoIterator<Item = (S, C)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(s, c)| (s.into(), c.into())).collect(),
        }
    }
}

#[derive(Serialize)]
struct Condition<'a> {
    condition: &'a str,
}

impl Serialize for DependsOnConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_short_form() {
            let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
            for service in self.entries.keys() {
                seq.serialize_element(service)?;
            }
            return seq.end();
        }

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (service, condition) in &self.entries {
            let condition = (!condition.is_empty()).then_some(Condition { condition });
            map.serialize_entry(service, &condition)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DependsOnConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = Node::deserialize(deserializer)?;
        Self::from_node(node).map_err(de::Error::custom)
    }
}

/// Environment variables of a service
///
/// Accepts a sequence of `KEY=VALUE` strings or a mapping; always encodes as
/// a mapping, so the sequence shape is not preserved across a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnvironmentConfig {
    vars: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a parse node into an environment set
    pub fn from_node(node: Node) -> Result<Self, ComposeError> {
        decode_key_values(node, "environment").map(|vars| Self { vars })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set a variable, returning its previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for EnvironmentConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = Node::deserialize(deserializer)?;
        Self::from_node(node).map_err(de::Error::custom)
    }
}

/// Healthcheck command vector
///
/// The YAML encoder renders it as a flow sequence (`[CMD, curl, ...]`).
/// A bare string is read as a shell command: `["CMD-SHELL", <string>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthcheckTest(Vec<String>);

impl HealthcheckTest {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Convert a parse node into a command vector
    pub fn from_node(node: Node) -> Result<Self, ComposeError> {
        match node {
            Node::Scalar { text, .. } => Ok(Self(vec![CMD_SHELL.to_string(), text])),
            Node::Sequence(_) => decode_string_list(node, "healthcheck test").map(Self),
            _ => Err(invalid("healthcheck test")),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for HealthcheckTest {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}

impl<'de> Deserialize<'de> for HealthcheckTest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = Node::deserialize(deserializer)?;
        Self::from_node(node).map_err(de::Error::custom)
    }
}

/// Split an image reference into name and tag
///
/// Without a tag the whole reference is the name and the tag is
/// [`DEFAULT_TAG`]. A colon followed by a `/` belongs to a registry port, not
/// a tag.
pub fn split_image(image: &str) -> (&str, &str) {
    match IMAGE_REFERENCE.captures(image) {
        Some(captures) => match (captures.get(1), captures.get(2)) {
            (Some(name), Some(tag)) => (name.as_str(), tag.as_str()),
            _ => (image, DEFAULT_TAG),
        },
        None => (image, DEFAULT_TAG),
    }
}

/// Render an image reference, always including the tag
pub fn join_image(name: &str, tag: &str) -> String {
    format!("{}:{}", name, tag)
}

/// Any scalar as a string; null reads as empty
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Node::deserialize(deserializer)? {
        Node::Scalar { text, .. } => Ok(text),
        Node::Null => Ok(String::new()),
        other => Err(de::Error::custom(invalid_entry("scalar", other.kind()))),
    }
}

/// Optional scalar as a string; null reads as absent
pub(crate) fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Node::deserialize(deserializer)? {
        Node::Scalar { text, .. } => Ok(Some(text)),
        Node::Null => Ok(None),
        other => Err(de::Error::custom(invalid_entry("scalar", other.kind()))),
    }
}

/// Optional sequence of scalars
pub(crate) fn optional_string_list<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Node::deserialize(deserializer)? {
        Node::Null => Ok(None),
        node => decode_string_list(node, "string list")
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Optional labels, as a mapping or as `key=value` entries
pub(crate) fn optional_labels<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Node::deserialize(deserializer)? {
        Node::Null => Ok(None),
        node => decode_key_values(node, "labels")
            .map(Some)
            .map_err(de::Error::custom),
    }
}
