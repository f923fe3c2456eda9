//! Session directory management.
//!
//! Every session compiles its cells into its own directory tree, either next
//! to the notebook or in a scratch directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory structure for one kernel session.
///
/// ```text
/// notebook.java
/// .javelin/
/// ├── classes/  # Linked wrapper classes (worker classpath root)
/// └── staging/  # Per-cell javac output before linking
/// ```
#[derive(Debug, Clone)]
pub struct SessionDirs {
    /// The `.javelin` directory itself.
    pub root: PathBuf,

    /// Directory of linked class files.
    pub classes_dir: PathBuf,

    /// Scratch directory for cells that have not been linked yet.
    pub staging_dir: PathBuf,

    /// Directory relative paths in directives are resolved against.
    pub work_dir: PathBuf,
}

impl SessionDirs {
    /// Create the structure next to a notebook file.
    pub fn from_notebook_path(notebook_path: &Path) -> Result<Self> {
        let notebook_dir = notebook_path.parent().unwrap_or(Path::new("."));
        Self::from_work_dir(notebook_dir)
    }

    /// Create the structure inside a working directory.
    pub fn from_work_dir(work_dir: &Path) -> Result<Self> {
        let root = work_dir.join(".javelin");
        Self::create(root, work_dir.to_path_buf())
    }

    /// Create a throwaway structure under the system temp directory.
    pub fn scratch(work_dir: &Path) -> Result<Self> {
        let root = std::env::temp_dir()
            .join("javelin-sessions")
            .join(uuid::Uuid::new_v4().to_string());
        Self::create(root, work_dir.to_path_buf())
    }

    fn create(root: PathBuf, work_dir: PathBuf) -> Result<Self> {
        let classes_dir = root.join("classes");
        let staging_dir = root.join("staging");

        fs::create_dir_all(&classes_dir)?;
        fs::create_dir_all(&staging_dir)?;

        Ok(Self {
            root,
            classes_dir,
            staging_dir,
            work_dir,
        })
    }

    /// Remove all compiled classes and recreate the empty structure.
    pub fn clean(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.classes_dir)?;
        fs::create_dir_all(&self.staging_dir)?;
        Ok(())
    }

    /// Resolve a directive path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_notebook_path() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let notebook_path = temp.path().join("mockito.java");

        let dirs = SessionDirs::from_notebook_path(&notebook_path).expect("Failed to create dirs");

        assert!(dirs.root.ends_with(".javelin"));
        assert!(dirs.classes_dir.exists());
        assert!(dirs.staging_dir.exists());
        assert_eq!(dirs.work_dir, temp.path());
    }

    #[test]
    fn test_clean() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = SessionDirs::from_work_dir(temp.path()).expect("Failed to create dirs");

        let class_file = dirs.classes_dir.join("Snippet1.class");
        fs::write(&class_file, b"cafebabe").expect("Failed to write class file");

        dirs.clean().expect("Failed to clean");
        assert!(!class_file.exists());
        assert!(dirs.classes_dir.exists());
    }

    #[test]
    fn test_resolve_relative() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = SessionDirs::from_work_dir(temp.path()).expect("Failed to create dirs");

        assert_eq!(dirs.resolve("lib/a.jar"), temp.path().join("lib/a.jar"));
        assert_eq!(dirs.resolve("/opt/b.jar"), PathBuf::from("/opt/b.jar"));
    }
}
