//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use mosaic_sdk::prelude::{RegistryConfig, RouteTable};

use crate::output::Output;

const REGISTRY_NAMES: [&str; 4] = ["mosaic.toml", ".mosaic.toml", "mosaic.json", "registry.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// The loaded registry.
    pub registry: RegistryConfig,
    /// Where the registry was read from.
    pub registry_path: PathBuf,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load the registry from `config_path`, or search upwards from the
    /// working directory.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let registry_path = match config_path {
            Some(path) => PathBuf::from(path),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                match Self::find_registry(&cwd) {
                    Some(path) => path,
                    None => bail!(
                        "No registry found. Pass --config or create one of: {}",
                        REGISTRY_NAMES.join(", ")
                    ),
                }
            }
        };

        output.debug(&format!("Loading registry from {}", registry_path.display()));
        let registry = RegistryConfig::load(&registry_path)
            .with_context(|| format!("Failed to load registry: {}", registry_path.display()))?;
        registry.validate()?;

        Ok(Self {
            registry,
            registry_path,
            output,
        })
    }

    /// Find a registry file in the directory tree.
    fn find_registry(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            for name in &REGISTRY_NAMES {
                let candidate = current.join(name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Route table built from the registry.
    pub fn table(&self) -> Result<RouteTable> {
        RouteTable::from_registry(&self.registry).context("Failed to build route table")
    }
}
