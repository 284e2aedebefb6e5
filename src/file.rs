//! Filesystem artifacts and the tasks that produce them.
//!
//! Staleness is decided by existence alone: an artifact that is present on
//! disk is up to date, whatever happened to its inputs. Building is therefore
//! idempotent, and the only way to force a rebuild is to clean first.

use std::fmt::Display;
use std::fs;

use anyhow::{Context, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::core::Resource;
use crate::error::{CleanupError, TaskResult};
use crate::task::{Actionable, Cleanable};

/// A path to a file or directory which may or may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct File {
    path: Utf8PathBuf,
}

impl File {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Collects every path matching `pattern`, sorted.
    pub fn glob(pattern: &str) -> TaskResult<Vec<File>> {
        let mut files = Vec::new();

        for entry in glob::glob(pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            files.push(File::new(path));
        }

        files.sort();
        Ok(files)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The same path with its extension replaced by `ext`.
    pub fn change_ext(&self, ext: &str) -> File {
        File::new(self.path.with_extension(ext.trim_start_matches('.')))
    }

    pub fn abspath(&self) -> Utf8PathBuf {
        std::path::absolute(&self.path)
            .ok()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            .unwrap_or_else(|| self.path.clone())
    }

    /// Path relative to the working directory, when it lies beneath it.
    pub fn relpath(&self) -> Utf8PathBuf {
        let abspath = self.abspath();

        std::env::current_dir()
            .ok()
            .and_then(|cwd| Utf8PathBuf::from_path_buf(cwd).ok())
            .and_then(|cwd| abspath.strip_prefix(&cwd).ok().map(Utf8Path::to_path_buf))
            .unwrap_or(abspath)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    /// Runs `make` unless the file exists, then requires that it does.
    pub fn build(&self, make: impl FnOnce(&File) -> TaskResult<()>) -> TaskResult<()> {
        if !self.exists() {
            make(self).with_context(|| format!("Failed to make '{}'", self.path))?;
        }

        if !self.exists() {
            return Err(anyhow!(
                "Required file does not exist or was not created: {}",
                self.path
            ));
        }

        Ok(())
    }
}

impl Cleanable for File {
    fn needs_cleaning(&self, recursive: bool) -> Result<bool, CleanupError> {
        if self.is_dir() && !recursive {
            return Err(CleanupError::Directory(self.path.clone()));
        }

        Ok(self.exists())
    }

    fn clean(&self) -> Result<(), CleanupError> {
        if !self.exists() {
            return Ok(());
        }

        warn!("Deleting file: {}", self.abspath());

        let result = if self.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };

        result.map_err(|err| CleanupError::Io(self.path.clone(), err))
    }
}

impl Display for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl From<&str> for File {
    fn from(value: &str) -> Self {
        File::new(value)
    }
}

impl From<String> for File {
    fn from(value: String) -> Self {
        File::new(value)
    }
}

impl From<Utf8PathBuf> for File {
    fn from(value: Utf8PathBuf) -> Self {
        File::new(value)
    }
}

impl From<&Utf8Path> for File {
    fn from(value: &Utf8Path) -> Self {
        File::new(value.to_path_buf())
    }
}

type FileAction = Box<dyn Fn(&File) -> TaskResult<()> + Send + Sync>;

/// A task that is done exactly when its file exists.
///
/// Running the task invokes the action and then checks that the artifact was
/// actually created. The result is always the file itself.
pub struct FileTask {
    file: File,
    action: FileAction,
}

impl FileTask {
    pub fn new<F>(file: impl Into<File>, action: F) -> Self
    where
        F: Fn(&File) -> TaskResult<()> + Send + Sync + 'static,
    {
        Self {
            file: file.into(),
            action: Box::new(action),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Actionable for FileTask {
    fn name(&self) -> &str {
        self.file.path.as_str()
    }

    fn is_done(&self) -> bool {
        self.file.exists()
    }

    fn run(&self) -> TaskResult<Resource> {
        (self.action)(&self.file)?;

        if !self.file.exists() {
            return Err(anyhow!(
                "Required file does not exist or was not created: {}",
                self.file
            ));
        }

        Ok(Resource::File(self.file.clone()))
    }

    fn result(&self) -> Option<Resource> {
        Some(Resource::File(self.file.clone()))
    }
}

impl Cleanable for FileTask {
    fn needs_cleaning(&self, recursive: bool) -> Result<bool, CleanupError> {
        self.file.needs_cleaning(recursive)
    }

    fn clean(&self) -> Result<(), CleanupError> {
        self.file.clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_change_ext() {
        let file = File::new("src/main.cpp");

        assert_eq!(file.change_ext("o").path(), "src/main.o");
        assert_eq!(file.change_ext(".o").path(), "src/main.o");
    }

    #[test]
    fn test_plain_file_needs_cleaning_when_present() {
        let (_dir, root) = scratch();
        let file = File::new(root.join("a.txt"));

        assert!(!file.needs_cleaning(false).unwrap());

        fs::write(file.path(), "a").unwrap();
        assert!(file.needs_cleaning(false).unwrap());

        file.clean().unwrap();
        assert!(!file.exists());

        // cleaning a missing file is a no-op
        file.clean().unwrap();
    }

    #[test]
    fn test_directory_requires_recursive_clean() {
        let (_dir, root) = scratch();
        let out = root.join("out");
        fs::create_dir_all(out.join("nested")).unwrap();
        fs::write(out.join("nested/x.o"), "x").unwrap();

        let file = File::new(out.clone());

        let err = file.needs_cleaning(false).unwrap_err();
        assert!(matches!(err, CleanupError::Directory(_)));
        assert!(out.exists());

        assert!(file.needs_cleaning(true).unwrap());
        file.clean().unwrap();
        assert!(!out.exists());
    }

    #[test]
    fn test_glob_is_sorted() {
        let (_dir, root) = scratch();
        for name in ["b.c", "a.c", "c.h"] {
            fs::write(root.join(name), "").unwrap();
        }

        let files = File::glob(root.join("*.c").as_str()).unwrap();

        let names: Vec<_> = files.iter().map(|f| f.path().file_name().unwrap()).collect();
        assert_eq!(names, vec!["a.c", "b.c"]);
    }

    #[test]
    fn test_file_task_is_done_by_existence() {
        let (_dir, root) = scratch();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let task = FileTask::new(root.join("out.txt"), move |file| {
            counter.fetch_add(1, Ordering::SeqCst);
            fs::write(file.path(), "built")?;
            Ok(())
        });

        assert!(!task.is_done());
        let result = task.run().unwrap();
        assert_eq!(result.as_file(), Some(task.file()));
        assert!(task.is_done());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // removing the artifact makes the task pending again
        task.clean().unwrap();
        assert!(!task.is_done());
    }

    #[test]
    fn test_file_task_must_create_its_artifact() {
        let (_dir, root) = scratch();
        let task = FileTask::new(root.join("never.txt"), |_| Ok(()));

        let err = task.run().unwrap_err();
        assert!(err.to_string().contains("was not created"));
    }

    #[test]
    fn test_build_skips_existing() {
        let (_dir, root) = scratch();
        let file = File::new(root.join("exists.txt"));
        fs::write(file.path(), "").unwrap();

        file.build(|_| anyhow::bail!("should not be called")).unwrap();
    }
}
