use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::MigrationError;

/// One `.sql` file as read from a script store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub content: String,
    pub modified: Option<DateTime<Utc>>,
}

impl ScriptFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            modified: None,
        }
    }
}

/// Where migration scripts come from.
pub trait ScriptSource: Send + Sync {
    /// Human-readable location, used in log output.
    fn describe(&self) -> String;

    /// Every `.sql` file currently in the store.
    fn scripts(&self) -> Result<Vec<ScriptFile>, MigrationError>;
}

/// Recursively reads `.sql` files below a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ScriptSource for DirectorySource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn scripts(&self) -> Result<Vec<ScriptFile>, MigrationError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.dir).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(MigrationError::CatalogLoad {
                        dir: self.dir.clone(),
                        source: e.into(),
                    });
                }
                // Broken links and loops below the root only lose that entry.
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!("skipping migration entry {path}: {e}");
                    continue;
                }
            };

            let path = entry.path();
            let is_sql = path.extension().and_then(|e| e.to_str()) == Some("sql");
            if !is_sql {
                continue;
            }
            if !entry.file_type().is_file() {
                warn!("skipping {}: not a regular file", path.display());
                continue;
            }

            // An unreadable file only loses that file, like a malformed name.
            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("skipping unreadable migration file {}: {e}", path.display());
                    continue;
                }
            };

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            files.push(ScriptFile {
                path: path.to_path_buf(),
                content,
                modified,
            });
        }

        debug!("read {} sql files from {}", files.len(), self.dir.display());
        Ok(files)
    }
}

/// Fixed, in-memory set of scripts.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Vec<ScriptFile>,
}

impl MemorySource {
    pub fn new(files: Vec<ScriptFile>) -> Self {
        Self { files }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push(ScriptFile::new(path, content));
        self
    }
}

impl ScriptSource for MemorySource {
    fn describe(&self) -> String {
        format!("<memory: {} files>", self.files.len())
    }

    fn scripts(&self) -> Result<Vec<ScriptFile>, MigrationError> {
        Ok(self.files.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{DirectorySource, MemorySource, ScriptSource};
    use crate::migrations::error::MigrationError;
    use std::fs;

    #[test]
    fn directory_source_walks_subdirectories_and_filters_sql() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::create_dir_all(dir.path().join("nested")).expect("failed to create nested dir");
        fs::write(
            dir.path().join("001_init.up.sql"),
            "CREATE TABLE a (id INTEGER);",
        )
        .expect("failed to write up file");
        fs::write(
            dir.path().join("nested/002_more.up.sql"),
            "CREATE TABLE b (id INTEGER);",
        )
        .expect("failed to write nested file");
        fs::write(dir.path().join("README.md"), "# migrations").expect("failed to write readme");

        let files = DirectorySource::new(dir.path())
            .scripts()
            .expect("directory should be readable");

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.path.extension().is_some_and(|e| e == "sql")));
        assert!(files.iter().all(|f| f.modified.is_some()));
        assert!(files.iter().any(|f| f.content == "CREATE TABLE b (id INTEGER);"));
    }

    #[cfg(unix)]
    #[test]
    fn directory_source_follows_symlinked_scripts() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let shared = dir.path().join("shared");
        let scripts = dir.path().join("migrations");
        fs::create_dir_all(&shared).expect("failed to create shared dir");
        fs::create_dir_all(&scripts).expect("failed to create migrations dir");
        fs::write(shared.join("create_a.sql"), "CREATE TABLE a (id INTEGER);")
            .expect("failed to write target file");

        std::os::unix::fs::symlink(shared.join("create_a.sql"), scripts.join("1_a.up.sql"))
            .expect("failed to create file link");
        std::os::unix::fs::symlink(
            dir.path().join("missing.sql"),
            scripts.join("2_b.up.sql"),
        )
        .expect("failed to create dangling link");

        let files = DirectorySource::new(&scripts)
            .scripts()
            .expect("dangling link must not fail the load");

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, scripts.join("1_a.up.sql"));
        assert_eq!(files[0].content, "CREATE TABLE a (id INTEGER);");
    }

    #[test]
    fn directory_source_fails_for_missing_root() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let missing = dir.path().join("does-not-exist");

        let err = DirectorySource::new(&missing)
            .scripts()
            .expect_err("missing directory must fail");
        match err {
            MigrationError::CatalogLoad { dir, .. } => assert_eq!(dir, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn memory_source_returns_its_files() {
        let source = MemorySource::default()
            .with_file("1_a.up.sql", "SELECT 1;")
            .with_file("1_a.down.sql", "SELECT 2;");

        let files = source.scripts().expect("memory source never fails");
        assert_eq!(files.len(), 2);
        assert_eq!(source.describe(), "<memory: 2 files>");
    }
}
