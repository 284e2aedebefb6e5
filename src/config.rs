use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;

use crate::core::Mode;
use crate::error::PoolError;
use crate::pool::WorkerPool;

/// Environment variable which turns on debug mode when set to a non-zero
/// integer.
pub const DEBUG_ENV: &str = "BAKERY_DEBUG";

/// Command line options of a build invocation.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "bake", version, about = "Execute targets in a build description.")]
pub struct Config {
    /// Targets to evaluate, the default target when empty.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Return failures to the caller instead of only reporting them.
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Remove the artifacts of the targets instead of building them.
    #[arg(short, long)]
    pub clean: bool,

    /// Allow cleaning to remove whole directories.
    #[arg(short = 'R', long)]
    pub recursive_clean: bool,

    /// Number of worker threads for parallel queues.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

impl Config {
    pub fn mode(&self) -> Mode {
        if self.clean { Mode::Clean } else { Mode::Build }
    }

    pub fn is_debug(&self) -> bool {
        self.debug || debug_from_env()
    }
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .is_some_and(|value| value != 0)
}

/// Process wide state shared by every build.
///
/// The worker pool is created once here and handed to every parallel queue.
#[derive(Debug, Clone)]
pub struct Context {
    pool: WorkerPool,
    builds: Arc<AtomicUsize>,
}

impl Context {
    pub fn new(jobs: Option<usize>) -> Result<Self, PoolError> {
        Ok(Self {
            pool: WorkerPool::new(jobs)?,
            builds: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// How many builds have been started with this context.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_build(&self) -> usize {
        self.builds.fetch_add(1, Ordering::SeqCst) + 1
    }
}
