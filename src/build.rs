use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::{Config, Context};
use crate::core::{Mode, Resource};
use crate::engine::{BuildTaskDecider, CleanupTaskDecider, Evaluator};
use crate::error::{BuildError, ResolveError, TaskResult};
use crate::file::File;
use crate::log::{Console, Sink};
use crate::resolver::{Attributes, Injector, Inputs, Provider, Resolver};
use crate::task::{Breakable, Cleanable, Task};
use crate::utils::as_overhead;

type Registry = Arc<Mutex<Vec<File>>>;

/// A single build invocation.
///
/// Recipes are registered on the build first, then [`Build::run`] evaluates
/// the requested targets in the mode selected by the [`Config`].
///
/// # Example
///
/// ```rust,no_run
/// use bakery::{Build, Config, Context, Task};
///
/// let context = Context::new(None)?;
/// let mut build = Build::new(&context, Config::default());
///
/// build
///     .target("hello")
///     .default()
///     .run(|_| Ok(Task::file("hello.txt", |file| Ok(std::fs::write(file.path(), "hi")?))))?;
///
/// let outcome = build.run()?;
/// std::process::exit(outcome.exit_code());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Build {
    context: Context,
    config: Config,
    injector: Injector,
    targets: BTreeSet<String>,
    default: Option<String>,
    setup: Vec<String>,
    outputs: Registry,
    temporaries: Registry,
    sink: Arc<dyn Sink>,
}

impl Build {
    pub fn new(context: &Context, config: Config) -> Self {
        Self {
            context: context.clone(),
            config,
            injector: Injector::new(),
            targets: BTreeSet::new(),
            default: None,
            setup: Vec::new(),
            outputs: Registry::default(),
            temporaries: Registry::default(),
            sink: Arc::new(Console),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    /// The sink this build reports to, for recipes that report progress.
    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    /// Artifacts recorded by output recipes during the last run.
    pub fn outputs(&self) -> Vec<File> {
        lock(&self.outputs).clone()
    }

    /// Temporary artifacts waiting to be reclaimed at the end of the run.
    pub fn temporaries(&self) -> Vec<File> {
        lock(&self.temporaries).clone()
    }

    /// Registers a target that can be requested by name.
    pub fn target(&mut self, name: impl Into<String>) -> Recipe<'_> {
        self.recipe(name, Attributes {
            singleton: true,
            target: true,
            ..Attributes::default()
        })
    }

    /// Registers a target whose artifacts are removed once the run ends.
    pub fn temporary(&mut self, name: impl Into<String>) -> Recipe<'_> {
        self.recipe(name, Attributes {
            singleton: true,
            target: true,
            temporary: true,
            ..Attributes::default()
        })
    }

    /// Registers a plain value other recipes can depend on.
    pub fn provide(&mut self, name: impl Into<String>) -> Recipe<'_> {
        self.recipe(name, Attributes::default())
    }

    /// Registers a value that is resolved before any target is evaluated.
    pub fn setup(&mut self, name: impl Into<String>) -> Recipe<'_> {
        self.recipe(name, Attributes {
            setup: true,
            ..Attributes::default()
        })
    }

    fn recipe(&mut self, name: impl Into<String>, attributes: Attributes) -> Recipe<'_> {
        Recipe {
            build: self,
            name: name.into(),
            dependencies: Vec::new(),
            attributes,
            default: false,
        }
    }

    /// Evaluates the requested targets.
    ///
    /// Configuration faults are returned as errors before anything is
    /// evaluated. A failed evaluation is reported through the sink and
    /// recorded in the returned [`Outcome`], unless debug mode is on, in
    /// which case it is returned as an error. Temporary artifacts are
    /// reclaimed either way.
    pub fn run(&mut self) -> Result<Outcome, BuildError> {
        let s = Instant::now();
        let count = self.context.begin_build();
        let mode = self.config.mode();
        info!(build = count, %mode, "starting");

        let targets = self.requested_targets()?;
        self.injector.validate()?;

        // every run resolves from scratch
        self.injector.clear_singletons();
        lock(&self.outputs).clear();
        lock(&self.temporaries).clear();

        let result = {
            let _reclaim = Reclaim {
                active: mode == Mode::Build,
                registry: self.temporaries.clone(),
                sink: self.sink.clone(),
            };

            self.resolve_setup()
                .and_then(|()| self.evaluate(mode, &targets))
        };

        match result {
            Ok(results) => {
                self.sink.success("BUILD SUCCEEDED");
                info!("Finished {} {}", mode, as_overhead(s));

                Ok(Outcome {
                    mode,
                    targets,
                    results,
                    failure: None,
                })
            }
            Err(err) => {
                self.sink.error(&format!("BUILD FAILED: {err}"));

                if self.config.is_debug() {
                    return Err(err);
                }

                Ok(Outcome {
                    mode,
                    targets,
                    results: Vec::new(),
                    failure: Some(err),
                })
            }
        }
    }

    /// Targets named on the command line, or the default target.
    fn requested_targets(&self) -> Result<Vec<String>, BuildError> {
        if self.targets.is_empty() {
            return Err(BuildError::NoTargets);
        }

        let targets = if !self.config.targets.is_empty() {
            self.config.targets.clone()
        } else if self.targets.len() == 1 {
            self.targets.iter().cloned().collect()
        } else if let Some(default) = &self.default {
            vec![default.clone()]
        } else {
            return Err(BuildError::NoDefaultTarget);
        };

        if let Some(undefined) = targets.iter().find(|t| !self.targets.contains(*t)) {
            return Err(BuildError::UndefinedTarget(undefined.clone()));
        }

        Ok(targets)
    }

    fn resolve_setup(&mut self) -> Result<(), BuildError> {
        for name in &self.setup {
            self.injector.require(name)?;
        }

        Ok(())
    }

    fn evaluate(
        &mut self,
        mode: Mode,
        targets: &[String],
    ) -> Result<Vec<(String, Resource)>, BuildError> {
        match mode {
            Mode::Build => Evaluator::new(BuildTaskDecider::new(), &*self.sink)
                .evaluate(&mut self.injector, targets),
            Mode::Clean => Evaluator::new(
                CleanupTaskDecider::new(self.config.recursive_clean),
                &*self.sink,
            )
            .evaluate(&mut self.injector, targets),
        }
    }
}

/// Builder returned by the registration methods of [`Build`].
#[must_use = "a recipe is only registered once it is finished with run, queue or parallel"]
pub struct Recipe<'a> {
    build: &'a mut Build,
    name: String,
    dependencies: Vec<String>,
    attributes: Attributes,
    default: bool,
}

impl<'a> Recipe<'a> {
    /// Names whose values are passed to the producer.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    /// Makes this the target built when none is requested.
    pub fn default(mut self) -> Self {
        self.default = true;
        self.attributes.target = true;
        self.attributes.singleton = true;
        self
    }

    /// Records every artifact this recipe produces as a build output.
    pub fn output(mut self) -> Self {
        self.attributes.output = true;
        self
    }

    pub fn input(mut self) -> Self {
        self.attributes.input = true;
        self
    }

    /// Reclaims every artifact this recipe produces once the run ends.
    pub fn temporary(mut self) -> Self {
        self.attributes.temporary = true;
        self.attributes.target = true;
        self.attributes.singleton = true;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.attributes.singleton = true;
        self
    }

    /// Finishes the recipe with a producer of a single value.
    pub fn run<F, R>(self, f: F) -> Result<(), ResolveError>
    where
        F: Fn(&Inputs) -> TaskResult<R> + Send + Sync + 'static,
        R: Into<Resource>,
    {
        self.finish(move |inputs| f(inputs).map(Into::into))
    }

    /// Finishes the recipe with tasks that run one after another.
    pub fn queue<F>(self, f: F) -> Result<(), ResolveError>
    where
        F: Fn(&Inputs) -> TaskResult<Vec<Task>> + Send + Sync + 'static,
    {
        let name = self.name.clone();

        self.finish(move |inputs| Ok(Task::queue(name.clone(), f(inputs)?).into()))
    }

    /// Finishes the recipe with tasks that run on the worker pool.
    pub fn parallel<F>(self, f: F) -> Result<(), ResolveError>
    where
        F: Fn(&Inputs) -> TaskResult<Vec<Task>> + Send + Sync + 'static,
    {
        let name = self.name.clone();
        let pool = self.build.context.pool().clone();

        self.finish(move |inputs| {
            Ok(Task::parallel(name.clone(), pool.clone(), f(inputs)?).into())
        })
    }

    fn finish<F>(self, producer: F) -> Result<(), ResolveError>
    where
        F: Fn(&Inputs) -> TaskResult<Resource> + Send + Sync + 'static,
    {
        let Recipe {
            build,
            name,
            dependencies,
            attributes,
            default,
        } = self;

        let mut registries = Vec::new();
        if attributes.output {
            registries.push(build.outputs.clone());
        }
        if attributes.temporary {
            registries.push(build.temporaries.clone());
        }

        let provider = Provider::new(move |inputs| {
            let value = producer(inputs)?;
            for registry in &registries {
                register(registry, &value);
            }
            Ok(value)
        })
        .depends_on(dependencies)
        .with_attributes(attributes);

        build.injector.register(name.clone(), provider)?;

        if attributes.target {
            build.targets.insert(name.clone());
        }
        if default {
            build.default = Some(name.clone());
        }
        if attributes.setup {
            build.setup.push(name);
        }

        Ok(())
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, Vec<File>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every file found in `value`, once.
///
/// Queues are broken down into their members. A producer may run more than
/// once per build, so a file already on record is not added again.
fn register(registry: &Registry, value: &Resource) {
    let mut entries = lock(registry);
    let mut record = |file: &File| {
        if !entries.contains(file) {
            entries.push(file.clone());
        }
    };

    value.for_each_leaf(&mut |leaf| match leaf {
        Resource::File(file) => record(file),
        Resource::Task(task) => files_of(task, &mut record),
        _ => {}
    });
}

fn files_of(task: &Task, record: &mut impl FnMut(&File)) {
    match task {
        Task::File(task) => record(task.file()),
        Task::Queue(_) | Task::Parallel(_) => {
            for member in task.as_breakable().into_iter().flat_map(|q| q.breakdown()) {
                files_of(member, record);
            }
        }
        Task::Call(_) => {}
    }
}

/// Cleans the registered temporary artifacts when dropped.
struct Reclaim {
    active: bool,
    registry: Registry,
    sink: Arc<dyn Sink>,
}

impl Drop for Reclaim {
    fn drop(&mut self) {
        let entries = std::mem::take(&mut *lock(&self.registry));

        if !self.active {
            return;
        }

        for file in &entries {
            if let Err(err) = file.clean() {
                warn!("Failed to reclaim temporary output: {err}");
                self.sink
                    .warning(&format!("Failed to reclaim temporary output: {err}"));
            }
        }
    }
}

/// The result of [`Build::run`].
#[derive(Debug)]
pub struct Outcome {
    mode: Mode,
    targets: Vec<String>,
    results: Vec<(String, Resource)>,
    failure: Option<BuildError>,
}

impl Outcome {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The targets that were requested, after applying the default.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Values produced by evaluated names, in evaluation order.
    pub fn results(&self) -> &[(String, Resource)] {
        &self.results
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, resource)| resource)
    }

    pub fn failure(&self) -> Option<&BuildError> {
        self.failure.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}
