//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A private scratch directory per test
//! - A project root with its own `.nfv/` config directory
//! - Helpers for creating sized or literal test files
//!
//! # Usage
//!
//! ```ignore
//! use nfv_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let path = env.create_sized_file("a.bin", 10240).unwrap();
//!     // env.files_dir and env.project_root are isolated and removed on drop
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Directory workload files are written to
    pub files_dir: PathBuf,
    /// Project root for the test (contains `.nfv/`)
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

        let project_root = root.join("project");
        let files_dir = root.join(format!("files-{}", test_id));

        std::fs::create_dir_all(project_root.join(".nfv"))?;
        std::fs::create_dir_all(&files_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            files_dir,
            project_root,
            test_id,
        })
    }

    /// Path of the project-local config file
    pub fn config_path(&self) -> PathBuf {
        self.project_root.join(".nfv").join("config.toml")
    }

    /// Write a project-local config file
    pub fn write_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Path for a file inside `files_dir` (not created)
    pub fn file_path(&self, relative_path: &str) -> PathBuf {
        self.files_dir.join(relative_path)
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.file_path(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a zero-filled test file of `size` bytes
    pub fn create_sized_file(&self, relative_path: &str, size: u64) -> anyhow::Result<PathBuf> {
        let path = self.create_file(relative_path, b"")?;
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_len(size)?;
        Ok(path)
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
        assert!(env.project_root.join(".nfv").exists());
        assert!(env.files_dir.exists());
    }

    #[test]
    fn test_environment_has_unique_files_dir() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.test_id, env2.test_id);
        assert_ne!(env1.files_dir, env2.files_dir);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("sub/a.txt", b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_create_sized_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_sized_file("big.bin", 10240).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10240);
    }
}
