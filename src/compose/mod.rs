//! Docker Compose file adapter
//!
//! This module loads compose documents in YAML or JSON, normalizes fields
//! that accept several shapes into one canonical form, and encodes them back
//! deterministically.

pub mod adapter;
pub mod codec;
pub mod config;
pub mod file;
pub mod node;
pub mod service;

pub use adapter::{ComposeAdapter, Format};
pub use codec::{DependsOnConfig, EnvironmentConfig, HealthcheckTest};
pub use config::ComposeConfig;
pub use file::ComposeFile;
pub use node::Node;
pub use service::{HealthcheckConfig, NetworkConfig, ServiceConfig};
