//! rune-compose - inspect, normalize and edit compose files
//!
//! This is the CLI entry point for rune-compose.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rune_compose::{ComposeAdapter, ComposeError, ComposeFile, Format};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// rune-compose - Docker Compose file adapter
#[derive(Parser)]
#[command(name = "rune-compose")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Load, normalize and edit Docker Compose files", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a compose file and print it in canonical form
    Config {
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output format (yaml or json); defaults to the input's
        #[arg(long)]
        format: Option<Format>,
    },
    /// Convert a compose file between YAML and JSON
    Convert {
        /// Input compose file
        input: PathBuf,
        /// Output compose file; the suffix selects the format
        output: PathBuf,
    },
    /// List services with their image and source repository
    Services {
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the image tag of a service
    GetVersion {
        /// Service name
        service: String,
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Set the image tag of a service, rewriting the file in place
    SetVersion {
        /// Service name
        service: String,
        /// New image tag
        version: String,
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Use the given file or look for a default one in the working directory
fn resolve_compose_file(file: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(file) = file {
        return Ok(file);
    }
    let working_dir = std::env::current_dir().context("Failed to read working directory")?;
    ComposeFile::find(&working_dir)
        .with_context(|| format!("No compose file found in {}", working_dir.display()))
}

fn load(path: &Path) -> Result<rune_compose::ComposeConfig> {
    ComposeFile::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config { file, format } => {
            let path = resolve_compose_file(file)?;
            let config = load(&path)?;

            for warning in config.validate() {
                warn!("{}", warning);
            }

            let format = match format {
                Some(format) => format,
                None => Format::from_path(&path)?,
            };
            let bytes = ComposeAdapter::save(&config, format)?;
            std::io::stdout().write_all(&bytes)?;
        }

        Commands::Convert { input, output } => {
            let config = load(&input)?;
            ComposeFile::save(&output, &config)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Converted {} to {}", input.display(), output.display());
        }

        Commands::Services { file } => {
            let path = resolve_compose_file(file)?;
            let config = load(&path)?;

            println!("{:<20} {:<40} {:<15} {}", "SERVICE", "IMAGE", "VERSION", "REPOSITORY");
            let order = config.start_order().unwrap_or_else(|err| {
                warn!("{}", err);
                config.service_names().map(str::to_string).collect()
            });
            for name in order {
                if let Some(service) = config.service(&name) {
                    println!(
                        "{:<20} {:<40} {:<15} {}",
                        name,
                        service.image_name(),
                        service.version(),
                        service.git_registry()
                    );
                }
            }
        }

        Commands::GetVersion { service, file } => {
            let path = resolve_compose_file(file)?;
            let config = load(&path)?;
            let record = config
                .service(&service)
                .ok_or_else(|| ComposeError::ServiceNotFound(service.clone()))?;
            println!("{}", record.version());
        }

        Commands::SetVersion {
            service,
            version,
            file,
        } => {
            let path = resolve_compose_file(file)?;
            let mut config = load(&path)?;
            let record = config
                .service_mut(&service)
                .ok_or_else(|| ComposeError::ServiceNotFound(service.clone()))?;
            let previous = record.image.clone();
            record.set_version(&version);
            info!("Service {}: {} -> {}", service, previous, record.image);

            ComposeFile::save(&path, &config)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    Ok(())
}
