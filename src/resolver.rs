//! Name based resolution of resources.
//!
//! The engine never calls producers directly. It asks a [`Resolver`] for the
//! value bound to a name, and for the names that value depends on. The
//! [`Injector`] is the resolver used by [`crate::Build`]: a registry of
//! providers with singleton memoization.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::trace;

use crate::core::Resource;
use crate::error::{ResolveError, TaskResult};
use crate::file::File;
use crate::task::Task;

/// Direct dependencies of every name reachable from a set of roots.
pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

/// Flags attached to a provider when it is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
    /// The produced value is memoized until it is unbound.
    pub singleton: bool,
    /// Only built when something that is being built demands it.
    pub temporary: bool,
    /// May be requested by name from the command line.
    pub target: bool,
    /// Artifacts are recorded as build outputs.
    pub output: bool,
    pub input: bool,
    /// Resolved before any target is evaluated.
    pub setup: bool,
}

/// The resolver contract the evaluation engine runs against.
pub trait Resolver {
    /// Produces the value bound to `name`, resolving its dependencies first.
    fn require(&mut self, name: &str) -> Result<Resource, ResolveError>;

    fn dependencies(&self, name: &str) -> Result<BTreeSet<String>, ResolveError>;

    /// Snapshot of the transitive dependency graph rooted at `roots`.
    fn dependency_graph(&self, roots: &[String]) -> Result<DependencyGraph, ResolveError>;

    fn attributes(&self, name: &str) -> Result<Attributes, ResolveError>;

    /// Binds a realized value to `name`, replacing what was bound before.
    fn provide(&mut self, name: &str, value: Resource, singleton: bool);

    /// Forgets a memoized singleton so the next `require` produces it again.
    fn unbind_singleton(&mut self, name: &str);
}

/// The resolved dependencies handed to a producer.
#[derive(Debug, Default)]
pub struct Inputs {
    values: BTreeMap<String, Resource>,
}

impl Inputs {
    pub fn get(&self, name: &str) -> TaskResult<&Resource> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("No input named '{name}'"))
    }

    /// The file behind `name`, whether it was bound to a file or a file task.
    pub fn file(&self, name: &str) -> TaskResult<&File> {
        let resource = self.get(name)?;
        resource
            .as_file()
            .ok_or_else(|| anyhow!("Input '{name}' is a {}, not a file", resource.kind()))
    }

    pub fn task(&self, name: &str) -> TaskResult<&Task> {
        let resource = self.get(name)?;
        resource
            .as_task()
            .ok_or_else(|| anyhow!("Input '{name}' is a {}, not a task", resource.kind()))
    }

    pub fn list(&self, name: &str) -> TaskResult<&[Resource]> {
        let resource = self.get(name)?;
        resource
            .as_list()
            .ok_or_else(|| anyhow!("Input '{name}' is a {}, not a list", resource.kind()))
    }

    pub fn int(&self, name: &str) -> TaskResult<i64> {
        let resource = self.get(name)?;
        resource
            .as_int()
            .ok_or_else(|| anyhow!("Input '{name}' is a {}, not an int", resource.kind()))
    }

    pub fn text(&self, name: &str) -> TaskResult<&str> {
        let resource = self.get(name)?;
        resource
            .as_str()
            .ok_or_else(|| anyhow!("Input '{name}' is a {}, not text", resource.kind()))
    }
}

pub(crate) type Producer = Arc<dyn Fn(&Inputs) -> TaskResult<Resource> + Send + Sync>;

/// A producer together with the names it depends on.
#[derive(Clone)]
pub struct Provider {
    dependencies: Vec<String>,
    attributes: Attributes,
    producer: Producer,
}

impl Provider {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(&Inputs) -> TaskResult<Resource> + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            attributes: Attributes::default(),
            producer: Arc::new(producer),
        }
    }

    fn constant(value: Resource) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A registry of providers keyed by name.
#[derive(Default)]
pub struct Injector {
    providers: HashMap<String, Provider>,
    singletons: HashMap<String, Resource>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Provider,
    ) -> Result<(), ResolveError> {
        let name = name.into();

        if self.providers.contains_key(&name) {
            return Err(ResolveError::Duplicate(name));
        }

        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Forgets every cached singleton, so the next require calls the producers again.
    pub fn clear_singletons(&mut self) {
        self.singletons.clear();
    }

    /// Checks that every dependency is registered and that there are no cycles.
    pub fn validate(&self) -> Result<(), ResolveError> {
        let mut graph = DiGraphMap::<&str, ()>::new();

        for (name, provider) in &self.providers {
            graph.add_node(name.as_str());

            for dep in &provider.dependencies {
                if !self.providers.contains_key(dep) {
                    return Err(ResolveError::MissingDependency {
                        name: dep.clone(),
                        consumer: name.clone(),
                    });
                }

                graph.add_edge(name.as_str(), dep.as_str(), ());
            }
        }

        for component in tarjan_scc(&graph) {
            let looped = match component.as_slice() {
                [node] => graph.contains_edge(*node, *node),
                _ => true,
            };

            if looped {
                let mut names = component.into_iter().map(String::from).collect::<Vec<_>>();
                names.sort();
                return Err(ResolveError::Cycle(names));
            }
        }

        Ok(())
    }

    fn provider(&self, name: &str) -> Result<&Provider, ResolveError> {
        self.providers
            .get(name)
            .ok_or_else(|| ResolveError::Unknown(name.to_string()))
    }

    fn require_from(
        &mut self,
        name: &str,
        consumer: Option<&str>,
        stack: &mut Vec<String>,
    ) -> Result<Resource, ResolveError> {
        if let Some(value) = self.singletons.get(name) {
            return Ok(value.clone());
        }

        let provider = match (self.providers.get(name), consumer) {
            (Some(provider), _) => provider.clone(),
            (None, Some(consumer)) => {
                return Err(ResolveError::MissingDependency {
                    name: name.to_string(),
                    consumer: consumer.to_string(),
                });
            }
            (None, None) => return Err(ResolveError::Unknown(name.to_string())),
        };

        if stack.iter().any(|entry| entry == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(ResolveError::Cycle(cycle));
        }

        stack.push(name.to_string());
        let mut inputs = Inputs::default();
        for dep in &provider.dependencies {
            let value = self.require_from(dep, Some(name), stack)?;
            inputs.values.insert(dep.clone(), value);
        }
        stack.pop();

        trace!(resource = name, "producing");
        let value = (provider.producer)(&inputs).map_err(|source| ResolveError::Producer {
            name: name.to_string(),
            consumer: consumer.map(String::from),
            source,
        })?;

        if provider.attributes.singleton {
            self.singletons.insert(name.to_string(), value.clone());
        }

        Ok(value)
    }
}

impl Resolver for Injector {
    fn require(&mut self, name: &str) -> Result<Resource, ResolveError> {
        self.require_from(name, None, &mut Vec::new())
    }

    fn dependencies(&self, name: &str) -> Result<BTreeSet<String>, ResolveError> {
        Ok(self.provider(name)?.dependencies.iter().cloned().collect())
    }

    fn dependency_graph(&self, roots: &[String]) -> Result<DependencyGraph, ResolveError> {
        let mut graph = DependencyGraph::new();
        let mut pending = roots.to_vec();

        while let Some(name) = pending.pop() {
            if graph.contains_key(&name) {
                continue;
            }

            let deps = self.dependencies(&name)?;
            for dep in &deps {
                if !self.providers.contains_key(dep) {
                    return Err(ResolveError::MissingDependency {
                        name: dep.clone(),
                        consumer: name.clone(),
                    });
                }
                pending.push(dep.clone());
            }

            graph.insert(name, deps);
        }

        Ok(graph)
    }

    fn attributes(&self, name: &str) -> Result<Attributes, ResolveError> {
        Ok(self.provider(name)?.attributes)
    }

    fn provide(&mut self, name: &str, value: Resource, singleton: bool) {
        if singleton {
            self.providers
                .entry(name.to_string())
                .or_insert_with(|| Provider::constant(Resource::None))
                .attributes
                .singleton = true;
            self.singletons.insert(name.to_string(), value);
        } else {
            let provider = self
                .providers
                .entry(name.to_string())
                .or_insert_with(|| Provider::constant(Resource::None));
            provider.producer = Provider::constant(value).producer;
            provider.attributes.singleton = false;
            self.singletons.remove(name);
        }
    }

    fn unbind_singleton(&mut self, name: &str) {
        self.singletons.remove(name);
    }
}
