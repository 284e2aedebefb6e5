#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod build;
mod config;
mod core;
pub mod engine;
mod error;
mod file;
mod log;
mod pool;
pub mod recipe;
mod resolver;
pub mod shell;
mod task;
mod utils;

pub use crate::build::{Build, Outcome, Recipe};
pub use crate::config::{Config, Context, DEBUG_ENV};
pub use crate::core::{Mode, Resource};
pub use crate::error::*;
pub use crate::file::{File, FileTask};
pub use crate::log::{Console, Journal, Level, Sink};
pub use crate::pool::WorkerPool;
pub use crate::resolver::{Attributes, DependencyGraph, Injector, Inputs, Provider, Resolver};
pub use crate::task::{
    Actionable, Breakable, CallTask, Cleanable, Interpolatable, ParallelTaskQueue, Task, TaskQueue,
};

/// Installs a global subscriber which prints engine events to standard error
/// and draws progress bars for evaluated decks.
///
/// Filtering follows `RUST_LOG`, falling back to `info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init()
}
