//! Compose files on disk

use super::adapter::{ComposeAdapter, Format};
use super::config::ComposeConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default compose file names, in lookup order
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
    "compose.json",
    "docker-compose.json",
];

/// Compose file reader and writer
pub struct ComposeFile;

impl ComposeFile {
    /// Find compose file in directory
    pub fn find(dir: &Path) -> Option<PathBuf> {
        DEFAULT_COMPOSE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load a compose file, choosing the decoder from its suffix
    ///
    /// An unsupported suffix fails before the file is opened.
    pub fn load(path: &Path) -> Result<ComposeConfig> {
        let format = Format::from_path(path)?;
        let bytes = std::fs::read(path)?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        ComposeAdapter::load(&path.display().to_string(), &bytes, format.extension())
    }

    /// Write a compose file in the format its suffix names
    pub fn save(path: &Path, config: &ComposeConfig) -> Result<()> {
        let format = Format::from_path(path)?;
        let bytes = ComposeAdapter::save(config, format)?;
        std::fs::write(path, &bytes)?;
        info!("Wrote {} services to {}", config.services.len(), path.display());
        Ok(())
    }
}
