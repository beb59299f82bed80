//! rune-compose - A Docker Compose file adapter
//!
//! Loads compose documents, normalizes the fields the format lets authors
//! write in more than one shape, and re-encodes them deterministically:
//!
//! - `depends_on` as a list or as a mapping with conditions
//! - `environment` as `KEY=VALUE` entries or as a mapping
//! - healthcheck tests as a command vector or a shell string
//! - image references split into name and tag

pub mod compose;
pub mod error;

pub use compose::{ComposeAdapter, ComposeConfig, ComposeFile, Format, ServiceConfig};
pub use error::{ComposeError, Result};
