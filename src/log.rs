use std::sync::{Mutex, PoisonError};

use console::style;

/// Where the build reports its progress to the user.
pub trait Sink: Send + Sync {
    /// A target is about to be evaluated.
    fn target(&self, message: &str);

    /// A task inside a target is doing something noteworthy.
    fn task(&self, message: &str);

    fn message(&self, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    fn success(&self, message: &str);
}

/// Colored output on standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Sink for Console {
    fn target(&self, message: &str) {
        eprintln!("{} {}", style("====>").magenta().bold(), message);
    }

    fn task(&self, message: &str) {
        eprintln!("{} {}", style("-->").cyan(), message);
    }

    fn message(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {}", style("-/!\\-").yellow().bold(), style(message).yellow());
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", style("==/==").red().bold(), style(message).red());
    }

    fn success(&self, message: &str) {
        eprintln!("{} {}", style("====>").green().bold(), style(message).green());
    }
}

/// The kind of line recorded by a [`Journal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Target,
    Task,
    Message,
    Warning,
    Error,
    Success,
}

/// A sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct Journal {
    lines: Mutex<Vec<(Level, String)>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether some line of the given level contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }

    fn push(&self, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

impl Sink for Journal {
    fn target(&self, message: &str) {
        self.push(Level::Target, message);
    }

    fn task(&self, message: &str) {
        self.push(Level::Task, message);
    }

    fn message(&self, message: &str) {
        self.push(Level::Message, message);
    }

    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }

    fn success(&self, message: &str) {
        self.push(Level::Success, message);
    }
}
