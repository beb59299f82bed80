//! Service records of a compose document

use super::codec::{self, DependsOnConfig, EnvironmentConfig, HealthcheckTest};
use super::node::{self, Node};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Label holding the source repository of a service's image
pub const GIT_REPOSITORY_LABEL: &str = "git.repository";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, taken from the key in the document's service mapping
    #[serde(skip)]
    pub name: String,
    /// Image reference, `name[:tag]`
    #[serde(default, deserialize_with = "codec::scalar_string")]
    pub image: String,
    /// Container name
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub container_name: Option<String>,
    /// Hostname
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub hostname: Option<String>,
    /// Restart policy
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub restart: Option<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
    /// Logging configuration, carried as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Networks to connect to
    #[serde(
        default,
        deserialize_with = "codec::optional_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub networks: Option<Vec<String>>,
    /// Port mappings
    #[serde(
        default,
        deserialize_with = "codec::optional_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub ports: Option<Vec<String>>,
    /// Volume mounts
    #[serde(
        default,
        deserialize_with = "codec::optional_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub volumes: Option<Vec<String>>,
    /// Labels
    #[serde(
        default,
        deserialize_with = "codec::optional_labels",
        skip_serializing_if = "Option::is_none"
    )]
    pub labels: Option<BTreeMap<String, String>>,
    /// Service dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOnConfig>,
    /// Healthcheck configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckConfig>,
    /// Privileged mode
    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,
    /// Security options
    #[serde(
        default,
        deserialize_with = "codec::optional_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub security_opt: Option<Vec<String>>,
    /// Keys this model does not interpret, re-emitted unchanged
    #[serde(flatten, skip_deserializing)]
    pub extra: BTreeMap<String, Value>,
}

impl ServiceConfig {
    /// Keys with a field of their own; everything else lands in `extra`
    pub const FIELDS: &'static [&'static str] = &[
        "image",
        "container_name",
        "hostname",
        "restart",
        "environment",
        "logging",
        "networks",
        "ports",
        "volumes",
        "labels",
        "depends_on",
        "healthcheck",
        "privileged",
        "security_opt",
    ];

    /// Create a service running the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Decode a service from its parse node
    ///
    /// The name is left empty; the document sets it from the service's key.
    pub fn from_node(node: Node) -> Result<Self> {
        let extra = node.unknown_fields(Self::FIELDS);
        let mut service: Self = node::decode(node)?;
        service.extra = extra;
        Ok(service)
    }

    /// Image name without its tag
    pub fn image_name(&self) -> &str {
        codec::split_image(&self.image).0
    }

    /// Image tag, `latest` when the reference carries none
    pub fn version(&self) -> &str {
        codec::split_image(&self.image).1
    }

    /// Replace the image tag; the reference is always rendered as `name:tag`
    pub fn set_version(&mut self, version: &str) {
        self.image = codec::join_image(self.image_name(), version);
    }

    /// Value of a label, if present
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    /// Source repository recorded in the `git.repository` label, or empty
    pub fn git_registry(&self) -> &str {
        self.label(GIT_REPOSITORY_LABEL).unwrap_or_default()
    }

    /// Names of the services this one depends on
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().flat_map(|deps| deps.services())
    }
}

/// Healthcheck configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    /// Test command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<HealthcheckTest>,
    /// Timeout
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<String>,
    /// Interval
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<String>,
    /// Retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u64>,
    /// Start period
    #[serde(
        default,
        deserialize_with = "codec::optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_period: Option<String>,
    /// Disable healthcheck
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable: bool,
}

/// Network configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// External network
    #[serde(default, skip_serializing_if = "is_false")]
    pub external: bool,
    /// Driver options, IPAM and the like, carried as-is
    #[serde(flatten, skip_deserializing)]
    pub extra: BTreeMap<String, Value>,
}

impl NetworkConfig {
    /// Keys with a field of their own; everything else lands in `extra`
    pub const FIELDS: &'static [&'static str] = &["name", "driver", "external"];
}
