//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated "home" holding the global `.vgate/config.toml`
//! - An isolated project root holding the project `.vgate/config.toml`
//! - Scratch files for interception tests
//!
//! # Usage
//!
//! ```ignore
//! use vgate_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     env.write_project_config("[layer]\npassthrough = true\n").unwrap();
//!     let cfg = env.load().unwrap();
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, LayerConfig};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Stand-in for `$HOME`
    pub home: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let home = root.join("home");
        let project_root = root.join(format!("project-{}", test_id));

        std::fs::create_dir_all(home.join(".vgate"))?;
        std::fs::create_dir_all(project_root.join(".vgate"))?;

        Ok(Self {
            _temp_dir: temp_dir,
            home,
            project_root,
            test_id,
        })
    }

    pub fn global_config_path(&self) -> PathBuf {
        self.home.join(".vgate/config.toml")
    }

    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".vgate/config.toml")
    }

    pub fn write_global_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.global_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Load both config files of this environment (no environment overrides)
    pub fn load(&self) -> anyhow::Result<Config> {
        let global = self.global_config_path();
        let project = self.project_config_path();
        Ok(Config::load_from(Some(&global), Some(&project))?)
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test directory
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Environment variables for spawning a child under the layer with the
    /// configuration found in this environment.
    pub fn layer_env(&self) -> anyhow::Result<Vec<(String, String)>> {
        let cfg: LayerConfig = self.load()?.layer;
        Ok(cfg.layer_env())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.home.join(".vgate").exists());
        assert!(env.project_root.join(".vgate").exists());
    }

    #[test]
    fn test_environment_has_unique_project_root() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.project_root, env2.project_root);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("src/main.rs", b"fn main() {}").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fn main() {}");
    }

    #[test]
    fn test_layer_env_reflects_files() {
        let env = TestEnvironment::new().unwrap();
        env.write_project_config("[layer]\npassthrough = true\n")
            .unwrap();
        let vars = env.layer_env().unwrap();
        assert!(vars
            .iter()
            .any(|(k, v)| k == "VGATE_PASSTHROUGH" && v == "1"));
        assert!(vars.iter().any(|(k, v)| k == "VGATE_LOG_LEVEL" && v == "info"));
    }
}
