//! Role definitions stored as markdown files.

use std::path::{Path, PathBuf};

use crate::traits::RoleCatalog;

/// Roles defined as `<dir>/<role>.md` files.
#[derive(Debug, Clone)]
pub struct DirRoleCatalog {
    dir: PathBuf,
}

impl DirRoleCatalog {
    /// Create a catalog over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding role files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file defining `role`.
    #[must_use]
    pub fn role_path(&self, role: &str) -> PathBuf {
        self.dir.join(format!("{role}.md"))
    }
}

impl Default for DirRoleCatalog {
    fn default() -> Self {
        Self::new("roles")
    }
}

impl RoleCatalog for DirRoleCatalog {
    fn role_exists(&self, role: &str) -> bool {
        !role.is_empty() && !role.contains(['/', '\\']) && self.role_path(role).is_file()
    }

    fn describe_role(&self, role: &str) -> String {
        self.role_path(role).display().to_string()
    }
}
