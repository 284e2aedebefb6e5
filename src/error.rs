use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Result from a single producer or task.
pub type TaskResult<T> = anyhow::Result<T, anyhow::Error>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No targets defined in the build module.")]
    NoTargets,

    #[error("Undefined target: \"{0}\"")]
    UndefinedTarget(String),

    #[error("No target was specified and no default target was provided.")]
    NoDefaultTarget,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Invalid progress bar template")]
    Style(#[from] indicatif::style::TemplateError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unknown resource '{0}'")]
    Unknown(String),

    #[error("Resource '{consumer}' depends on unknown resource '{name}'")]
    MissingDependency { name: String, consumer: String },

    #[error("Resource '{0}' is already defined")]
    Duplicate(String),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Resource '{name}'{}:\n{source}", display_consumer(.consumer))]
    Producer {
        name: String,
        consumer: Option<String>,
        source: anyhow::Error,
    },
}

fn display_consumer(consumer: &Option<String>) -> String {
    match consumer {
        Some(consumer) => format!(" (required by '{consumer}')"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Unable to resolve remaining dependencies for build deck: {0:?}")]
    UnresolvedDeck(BTreeSet<String>),

    #[error("Target '{target}':\n{source}")]
    Target {
        target: String,
        source: anyhow::Error,
    },

    #[error("Target '{0}' did not resolve to an actionable task")]
    NotActionable(String),

    #[error("Target '{0}' did not resolve to a cleanable artifact")]
    NotCleanable(String),
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Refusing to clean directory '{0}' without recursive clean enabled")]
    Directory(Utf8PathBuf),

    #[error("Couldn't remove '{0}'.\n{1}")]
    Io(Utf8PathBuf, std::io::Error),
}

#[derive(Debug, Error)]
#[error("Cannot interpolate {0} into a command line")]
pub struct InterpolationError(pub &'static str);

#[derive(Debug, Error)]
#[error("Cannot interpolate task queue '{0}' until it has been evaluated")]
pub struct WorkflowError(pub String);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to build worker pool")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("Worker panicked: {0}")]
    Panic(String),
}
