//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::config::CliConfig;
use crate::output::Output;

/// Config file names searched for in the working directory and its ancestors.
const CONFIG_NAMES: [&str; 3] = ["netseal.toml", ".netseal.toml", "netseal.json"];

/// Environment variable overriding the bundle root.
pub const BUNDLE_ENV: &str = "NETSEAL_BUNDLE";

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
    /// Directory config paths are relative to.
    pub base_dir: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, base_dir) = match config_path {
            Some(path) => {
                let config = CliConfig::load(path)?;
                let base = absolute(&cwd, Path::new(path))
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.clone());
                (config, base)
            }
            None => match find_config(&cwd) {
                Some(path) => {
                    let config = CliConfig::load(&path.to_string_lossy())?;
                    let base = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.clone());
                    (config, base)
                }
                None => (CliConfig::default(), cwd.clone()),
            },
        };

        Ok(Self {
            config,
            output,
            cwd,
            base_dir,
        })
    }

    /// Bundle directory: the command-line value, then `NETSEAL_BUNDLE`, then
    /// the config file.
    pub fn bundle_root(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(path) = flag {
            return absolute(&self.cwd, path);
        }
        if let Some(path) = std::env::var_os(BUNDLE_ENV).filter(|v| !v.is_empty()) {
            return absolute(&self.cwd, Path::new(&path));
        }
        absolute(&self.base_dir, &self.config.bundle.root)
    }

    /// Version metadata file for the bundle at `root`.
    pub fn version_file(&self, root: &Path) -> PathBuf {
        match &self.config.bundle.version_file {
            Some(path) => absolute(&self.base_dir, path),
            None => root
                .parent()
                .unwrap_or(root)
                .join("version.json"),
        }
    }
}

/// Find the nearest config file at or above `start`.
fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_walks_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".netseal.toml"), "").unwrap();

        assert_eq!(find_config(&nested), Some(dir.path().join(".netseal.toml")));
    }

    #[test]
    fn test_find_config_prefers_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("project");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("netseal.toml"), "").unwrap();
        std::fs::write(nested.join("netseal.json"), "{}").unwrap();

        assert_eq!(find_config(&nested), Some(nested.join("netseal.json")));
    }

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let ctx = Context {
            config: CliConfig::default(),
            output: Output::new(false, true),
            cwd: PathBuf::from("/work/sub"),
            base_dir: PathBuf::from("/work"),
        };

        let flagged = ctx.bundle_root(Some(Path::new("other")));
        assert_eq!(flagged, PathBuf::from("/work/sub/other"));

        let root = PathBuf::from("/work/bundle/app");
        assert_eq!(ctx.version_file(&root), PathBuf::from("/work/bundle/version.json"));
    }
}
