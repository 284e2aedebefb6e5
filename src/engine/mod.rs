//! The evaluation engine.
//!
//! A build is evaluated in three steps:
//!
//! 1. The [`Decider`] walks the dependency graph from every requested target
//!    and picks the names that need work. This is the evaluation set.
//! 2. The evaluation set is levelled into a deck of cards, where every card
//!    only depends on names from earlier cards.
//! 3. The [`Evaluator`] plays the deck in order, asking the decider to evaluate
//!    each name.
//!
//! What "needs work" means is entirely up to the decider. Building picks
//! actionable targets that are not done yet, while cleaning picks artifacts
//! which still exist on disk.

mod decider;
mod evaluator;

use std::collections::{BTreeSet, HashSet};

use crate::core::Resource;
use crate::error::BuildError;
use crate::resolver::{DependencyGraph, Resolver};

pub use crate::engine::decider::{BuildTaskDecider, CleanupTaskDecider};
pub use crate::engine::evaluator::{Evaluator, evaluation_deck};

/// Names selected for evaluation.
pub type EvaluationSet = BTreeSet<String>;

/// The evaluation set split into dependency ordered cards.
pub type EvaluationDeck = Vec<EvaluationSet>;

/// Decides which targets need work in a given mode, and does that work.
pub trait Decider {
    /// Verb used to announce a target, e.g. "Building".
    fn action(&self) -> &'static str;

    /// Names reachable from `target` (itself included) which need work.
    fn evaluation_set(
        &self,
        resolver: &mut dyn Resolver,
        graph: &DependencyGraph,
        target: &str,
    ) -> Result<EvaluationSet, BuildError>;

    /// Does the work for a single name from the evaluation set.
    fn evaluate(
        &self,
        resolver: &mut dyn Resolver,
        target: &str,
    ) -> Result<Option<Resource>, BuildError>;
}

/// Walks the graph below `root`, keeping the names for which `include` holds.
///
/// `include` receives whether the name is demanded, that is whether anything
/// above it on the current path was included. Names are visited once per
/// demand state, so the result does not depend on the order of dependencies.
pub(crate) fn walk<F>(
    resolver: &mut dyn Resolver,
    graph: &DependencyGraph,
    root: &str,
    mut include: F,
) -> Result<EvaluationSet, BuildError>
where
    F: FnMut(&mut dyn Resolver, &str, bool) -> Result<bool, BuildError>,
{
    let mut walker = Walker {
        graph,
        visited: HashSet::new(),
        set: EvaluationSet::new(),
    };

    walker.visit(resolver, root, false, &mut include)?;

    Ok(walker.set)
}

struct Walker<'a> {
    graph: &'a DependencyGraph,
    visited: HashSet<(String, bool)>,
    set: EvaluationSet,
}

impl Walker<'_> {
    fn visit<F>(
        &mut self,
        resolver: &mut dyn Resolver,
        target: &str,
        demanded: bool,
        include: &mut F,
    ) -> Result<(), BuildError>
    where
        F: FnMut(&mut dyn Resolver, &str, bool) -> Result<bool, BuildError>,
    {
        if !self.visited.insert((target.to_string(), demanded)) {
            return Ok(());
        }

        let own = include(resolver, target, demanded)?;
        if own {
            self.set.insert(target.to_string());
        }

        let deps = match self.graph.get(target) {
            Some(deps) => deps.clone(),
            None => resolver.dependencies(target)?,
        };

        for dep in &deps {
            self.visit(resolver, dep, demanded || own, include)?;
        }

        Ok(())
    }
}

/// Fetches the value bound to a singleton `target`, or `None` otherwise.
///
/// The singleton is unbound afterwards, so that whoever requires it later sees
/// the realized values of its dependencies instead of their tasks.
pub(crate) fn fetch_singleton(
    resolver: &mut dyn Resolver,
    target: &str,
) -> Result<Option<Resource>, BuildError> {
    if !resolver.attributes(target)?.singleton {
        return Ok(None);
    }

    let value = resolver.require(target)?;
    resolver.unbind_singleton(target);

    Ok(Some(value))
}
