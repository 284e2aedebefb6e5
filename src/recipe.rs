//! Ready made tasks for common filesystem chores.

use std::fs;
use std::sync::Arc;

use anyhow::bail;
use camino::Utf8PathBuf;
use tracing::debug;

use crate::file::File;
use crate::log::Sink;
use crate::task::Task;

/// A task that creates the directory at `path`, parents included.
///
/// The task is done as soon as the path exists. Progress is reported to
/// `sink`, usually [`Build::sink`](crate::Build::sink).
pub fn make_dir(path: impl Into<Utf8PathBuf>, sink: Arc<dyn Sink>) -> Task {
    Task::file(File::new(path), move |file| {
        if !file.exists() {
            debug!(path = %file.path(), "creating directory");
            sink.task(&format!("Making directory: {}", file.relpath()));
            fs::create_dir_all(file.path())?;
        } else if file.is_dir() {
            sink.message(&format!("Directory exists: {}", file.relpath()));
        } else {
            bail!(
                "File \"{}\" already exists and is not a directory.",
                file.relpath()
            );
        }

        Ok(())
    })
}
