//! Compose document model

use super::codec;
use super::node::{self, Node};
use super::service::{NetworkConfig, ServiceConfig};
use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};

/// Network every service joins when it names none
pub const DEFAULT_NETWORK: &str = "default";

/// Docker Compose file configuration
///
/// Every mapping is a `BTreeMap`, so services (and everything else) are
/// always emitted with their keys in lexicographic order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Compose file version
    #[serde(deserialize_with = "codec::scalar_string")]
    pub version: String,
    /// Services, keyed by name
    pub services: BTreeMap<String, ServiceConfig>,
    /// Networks; a null entry declares a network with default settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, Option<NetworkConfig>>,
    /// Named volumes, carried as-is
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Value>,
    /// Secrets, carried as-is
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, Value>,
    /// Top-level keys this model does not interpret
    #[serde(flatten, skip_deserializing)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self::new("3.8")
    }
}

impl ComposeConfig {
    /// Top-level keys with a field of their own
    pub const FIELDS: &'static [&'static str] = &[
        "version", "services", "networks", "volumes", "secrets",
    ];

    /// Create an empty document with the given version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            services: BTreeMap::new(),
            networks: BTreeMap::new(),
            volumes: BTreeMap::new(),
            secrets: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Look up a service; `None` when the document has no such service
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceConfig> {
        self.services.get_mut(name)
    }

    /// Insert or silently replace a service, returning the replaced record
    pub fn set_service(
        &mut self,
        name: impl Into<String>,
        mut service: ServiceConfig,
    ) -> Option<ServiceConfig> {
        let name = name.into();
        service.name = name.clone();
        self.services.insert(name, service)
    }

    pub fn remove_service(&mut self, name: &str) -> Option<ServiceConfig> {
        self.services.remove(name)
    }

    /// Service names in sorted order
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Look up a top-level network; declared-but-empty networks yield defaults
    pub fn network(&self, name: &str) -> Option<NetworkConfig> {
        self.networks
            .get(name)
            .map(|network| network.clone().unwrap_or_default())
    }

    /// Decode a document from its parse node
    ///
    /// Unknown keys of the document, of each service and of each network are
    /// collected from the node before the typed decode and stored in `extra`.
    pub(crate) fn from_node(node: Node) -> Result<Self> {
        let extra = node.unknown_fields(Self::FIELDS);
        let mut service_extras = entry_extras(node.get("services"), ServiceConfig::FIELDS);
        let mut network_extras = entry_extras(node.get("networks"), NetworkConfig::FIELDS);

        let mut config: Self = node::decode(node)?;
        config.extra = extra;
        for (name, service) in config.services.iter_mut() {
            if let Some(extra) = service_extras.remove(name) {
                service.extra = extra;
            }
        }
        for (name, network) in config.networks.iter_mut() {
            if let (Some(network), Some(extra)) = (network.as_mut(), network_extras.remove(name)) {
                network.extra = extra;
            }
        }
        config.attach_service_names();
        Ok(config)
    }

    /// Copy each service's key into its record
    pub(crate) fn attach_service_names(&mut self) {
        for (name, service) in self.services.iter_mut() {
            service.name = name.clone();
        }
    }

    /// Check cross-references the decoder leaves alone
    ///
    /// Never fails; every problem becomes a warning.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, service) in &self.services {
            if service.image.is_empty() {
                warnings.push(format!("Service '{}' has no image", name));
            }

            for dep in service.dependencies() {
                if !self.services.contains_key(dep) {
                    warnings.push(format!(
                        "Service '{}' depends on unknown service '{}'",
                        name, dep
                    ));
                }
            }

            for net in service.networks.iter().flatten() {
                if net != DEFAULT_NETWORK && !self.networks.contains_key(net) {
                    warnings.push(format!(
                        "Service '{}' references undefined network '{}'",
                        name, net
                    ));
                }
            }
        }

        warnings
    }

    /// Services ordered so that every service follows its dependencies
    ///
    /// Services are visited in name order. Dependencies on services missing
    /// from the document are skipped.
    pub fn start_order(&self) -> Result<Vec<String>> {
        let mut order = Vec::with_capacity(self.services.len());
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        for name in self.services.keys() {
            self.topological_sort(name, &mut visited, &mut visiting, &mut order)?;
        }

        Ok(order)
    }

    fn topological_sort<'a>(
        &'a self,
        service: &'a str,
        visited: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if visited.contains(service) {
            return Ok(());
        }

        if !visiting.insert(service) {
            return Err(ComposeError::Compose(format!(
                "Circular dependency detected for service: {}",
                service
            )));
        }

        if let Some(config) = self.services.get(service) {
            for dep in config.dependencies() {
                if self.services.contains_key(dep) {
                    self.topological_sort(dep, visited, visiting, order)?;
                }
            }
        }

        visiting.remove(service);
        visited.insert(service);
        order.push(service.to_string());
        Ok(())
    }
}

/// Unknown keys of every entry in a mapping of records, keyed by entry name
fn entry_extras(
    records: Option<&Node>,
    known: &[&str],
) -> BTreeMap<String, BTreeMap<String, Value>> {
    match records {
        Some(Node::Mapping(entries)) => entries
            .iter()
            .map(|(name, record)| (name.clone(), record.unknown_fields(known)))
            .collect(),
        _ => BTreeMap::new(),
    }
}
