use tracing::debug;

use crate::core::Resource;
use crate::engine::{Decider, EvaluationSet, fetch_singleton, walk};
use crate::error::{BuildError, EvaluationError};
use crate::resolver::{DependencyGraph, Resolver};
use crate::task::Actionable;

/// Picks the actionable targets which are not done yet.
///
/// A temporary target is only picked when something above it is being built.
/// Requesting it on its own still builds whatever it depends on.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildTaskDecider;

impl BuildTaskDecider {
    pub fn new() -> Self {
        Self
    }
}

impl Decider for BuildTaskDecider {
    fn action(&self) -> &'static str {
        "Building"
    }

    fn evaluation_set(
        &self,
        resolver: &mut dyn Resolver,
        graph: &DependencyGraph,
        target: &str,
    ) -> Result<EvaluationSet, BuildError> {
        walk(resolver, graph, target, |resolver, name, demanded| {
            let Some(resource) = fetch_singleton(resolver, name)? else {
                return Ok(false);
            };

            let Some(task) = resource.as_task() else {
                return Ok(false);
            };

            if task.is_done() {
                debug!(target = name, "already done");
                return Ok(false);
            }

            if !demanded && resolver.attributes(name)?.temporary {
                debug!(target = name, "temporary and not demanded");
                return Ok(false);
            }

            Ok(true)
        })
    }

    fn evaluate(
        &self,
        resolver: &mut dyn Resolver,
        target: &str,
    ) -> Result<Option<Resource>, BuildError> {
        resolver.unbind_singleton(target);

        let resource = resolver.require(target)?;
        let task = resource
            .as_task()
            .ok_or_else(|| EvaluationError::NotActionable(target.to_string()))?;

        let result = task.run().map_err(|source| EvaluationError::Target {
            target: target.to_string(),
            source,
        })?;

        resolver.provide(target, result.clone(), true);

        Ok(Some(result))
    }
}

/// Picks the cleanable targets whose artifacts still exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupTaskDecider {
    recursive: bool,
}

impl CleanupTaskDecider {
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }
}

impl Decider for CleanupTaskDecider {
    fn action(&self) -> &'static str {
        "Cleaning"
    }

    fn evaluation_set(
        &self,
        resolver: &mut dyn Resolver,
        graph: &DependencyGraph,
        target: &str,
    ) -> Result<EvaluationSet, BuildError> {
        let recursive = self.recursive;

        walk(resolver, graph, target, |resolver, name, _| {
            let Some(resource) = fetch_singleton(resolver, name)? else {
                return Ok(false);
            };

            match resource.as_cleanable() {
                Some(cleanable) => Ok(cleanable.needs_cleaning(recursive)?),
                None => Ok(false),
            }
        })
    }

    fn evaluate(
        &self,
        resolver: &mut dyn Resolver,
        target: &str,
    ) -> Result<Option<Resource>, BuildError> {
        let resource = resolver.require(target)?;
        let cleanable = resource
            .as_cleanable()
            .ok_or_else(|| EvaluationError::NotCleanable(target.to_string()))?;

        cleanable.clean()?;

        Ok(None)
    }
}
