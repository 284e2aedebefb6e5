use std::time::Instant;

use tracing::{Level, debug, info};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::Resource;
use crate::engine::{Decider, EvaluationDeck, EvaluationSet};
use crate::error::{BuildError, EvaluationError};
use crate::log::Sink;
use crate::resolver::{DependencyGraph, Resolver};
use crate::utils::as_overhead;

/// Plays the evaluation deck for a set of requested targets.
pub struct Evaluator<'a, D> {
    decider: D,
    sink: &'a dyn Sink,
}

impl<'a, D> Evaluator<'a, D>
where
    D: Decider,
{
    pub fn new(decider: D, sink: &'a dyn Sink) -> Self {
        Self { decider, sink }
    }

    /// Evaluates every name in need of work below `targets`.
    ///
    /// Returns the produced resources in the order they were evaluated. The
    /// first failure aborts the remaining cards.
    pub fn evaluate(
        &self,
        resolver: &mut dyn Resolver,
        targets: &[String],
    ) -> Result<Vec<(String, Resource)>, BuildError> {
        let graph = resolver.dependency_graph(targets)?;

        let mut set = EvaluationSet::new();
        for target in targets {
            set.extend(self.decider.evaluation_set(resolver, &graph, target)?);
        }

        let deck = evaluation_deck(&graph, &set)?;
        debug!(names = set.len(), cards = deck.len(), "evaluation deck ready");

        let mut results = Vec::new();
        if set.is_empty() {
            return Ok(results);
        }

        let span = tracing::span!(Level::INFO, "evaluating");
        span.pb_set_length(set.len() as u64);
        span.pb_set_style(&crate::utils::get_style_deck()?);
        span.pb_set_message(self.decider.action());
        let _enter = span.enter();

        for card in &deck {
            for target in card {
                let s = Instant::now();
                self.sink
                    .target(&format!("{} target '{}'...", self.decider.action(), target));

                if let Some(result) = self.decider.evaluate(resolver, target)? {
                    results.push((target.clone(), result));
                }

                info!("{} {} {}", self.decider.action(), target, as_overhead(s));
                span.pb_inc(1);
            }
        }

        Ok(results)
    }
}

/// Levels `set` into cards so that every dependency inside the set is placed
/// in an earlier card than its consumer.
pub fn evaluation_deck(
    graph: &DependencyGraph,
    set: &EvaluationSet,
) -> Result<EvaluationDeck, EvaluationError> {
    let mut processed = EvaluationSet::new();
    let mut todo = set.clone();
    let mut deck = EvaluationDeck::new();

    while !todo.is_empty() {
        let card = todo
            .iter()
            .filter(|target| {
                graph
                    .get(*target)
                    .into_iter()
                    .flatten()
                    .filter(|dep| set.contains(*dep))
                    .all(|dep| processed.contains(dep))
            })
            .cloned()
            .collect::<EvaluationSet>();

        if card.is_empty() {
            return Err(EvaluationError::UnresolvedDeck(todo));
        }

        for target in &card {
            todo.remove(target);
            processed.insert(target.clone());
        }

        deck.push(card);
    }

    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::engine::BuildTaskDecider;
    use crate::log::{Journal, Level as Line};
    use crate::resolver::{Attributes, Injector, Provider};
    use crate::task::{Actionable, Task};

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        edges
            .iter()
            .map(|(name, deps)| {
                let deps = deps.iter().map(|dep| dep.to_string()).collect();
                (name.to_string(), deps)
            })
            .collect()
    }

    /// ```text
    ///     A
    ///     |\
    ///     | C  L
    ///     |  \  \
    ///  K  B   M  F
    ///   \  \ /__/|
    ///    D  E    |
    ///   /  / \   |
    ///  G  H   I  J
    /// ```
    fn sample_graph() -> DependencyGraph {
        graph(&[
            ("A", &["C", "B"]),
            ("B", &["D", "E"]),
            ("C", &["M", "F"]),
            ("D", &["G"]),
            ("E", &["H", "I"]),
            ("F", &["E", "J"]),
            ("G", &[]),
            ("H", &[]),
            ("I", &[]),
            ("J", &[]),
            ("K", &["D"]),
            ("L", &["F"]),
            ("M", &[]),
        ])
    }

    fn names(card: &EvaluationSet) -> Vec<&str> {
        card.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_deck_levels_sample_graph() {
        let graph = sample_graph();
        let set = graph.keys().cloned().collect::<EvaluationSet>();

        let deck = evaluation_deck(&graph, &set).unwrap();

        let cards = deck.iter().map(names).collect::<Vec<_>>();
        assert_eq!(
            cards,
            vec![
                vec!["G", "H", "I", "J", "M"],
                vec!["D", "E"],
                vec!["B", "F", "K"],
                vec!["C", "L"],
                vec!["A"],
            ]
        );
    }

    #[test]
    fn test_deck_is_a_valid_partition() {
        let graph = sample_graph();
        let set = ["A", "C", "F", "J", "K", "G", "D"]
            .into_iter()
            .map(String::from)
            .collect::<EvaluationSet>();

        let deck = evaluation_deck(&graph, &set).unwrap();

        let mut seen = EvaluationSet::new();
        for card in &deck {
            assert!(!card.is_empty());
            for name in card {
                for dep in graph[name].iter().filter(|dep| set.contains(*dep)) {
                    assert!(seen.contains(dep), "{dep} must come before {name}");
                }
            }
            for name in card {
                assert!(seen.insert(name.clone()), "{name} appears twice");
            }
        }
        assert_eq!(seen, set);
    }

    #[test]
    fn test_deck_reports_cycle() {
        let mut graph = sample_graph();
        graph.insert("M".into(), ["C".to_string()].into());
        let set = graph.keys().cloned().collect::<EvaluationSet>();

        let err = evaluation_deck(&graph, &set).unwrap_err();

        match err {
            EvaluationError::UnresolvedDeck(rest) => {
                assert_eq!(names(&rest), vec!["A", "C", "M"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_set_gives_empty_deck() {
        let deck = evaluation_deck(&sample_graph(), &EvaluationSet::new()).unwrap();

        assert!(deck.is_empty());
    }

    fn recording(name: &str, order: &Arc<Mutex<Vec<String>>>) -> Task {
        let order = order.clone();
        let label = name.to_string();
        Task::call(name, move || {
            order.lock().unwrap().push(label.clone());
            Ok(Resource::Text(label.clone()))
        })
    }

    #[test]
    fn test_evaluate_runs_dependencies_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let attributes = Attributes {
            singleton: true,
            target: true,
            ..Attributes::default()
        };

        let mut injector = Injector::new();
        for (name, deps) in [("app", vec!["lib", "gen"]), ("lib", vec!["gen"]), ("gen", vec![])] {
            let task = recording(name, &order);
            let provider = Provider::new(move |_| Ok(Resource::Task(task.clone())))
                .depends_on(deps)
                .with_attributes(attributes);
            injector.register(name, provider).unwrap();
        }

        let journal = Journal::new();
        let evaluator = Evaluator::new(BuildTaskDecider, &journal);
        let results = evaluator
            .evaluate(&mut injector, &["app".to_string()])
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["gen", "lib", "app"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].1.as_str(), Some("app"));
        assert!(journal.contains(Line::Target, "Building target 'lib'..."));
    }

    #[test]
    fn test_evaluate_stops_at_first_failure() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let attributes = Attributes {
            singleton: true,
            target: true,
            ..Attributes::default()
        };

        let broken = Task::call("broken", || anyhow::bail!("no compiler"));
        let after = recording("after", &order);

        let mut injector = Injector::new();
        injector
            .register(
                "broken",
                Provider::new(move |_| Ok(Resource::Task(broken.clone())))
                    .with_attributes(attributes),
            )
            .unwrap();
        injector
            .register(
                "after",
                Provider::new(move |_| Ok(Resource::Task(after.clone())))
                    .depends_on(["broken"])
                    .with_attributes(attributes),
            )
            .unwrap();

        let journal = Journal::new();
        let err = Evaluator::new(BuildTaskDecider, &journal)
            .evaluate(&mut injector, &["after".to_string()])
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Evaluation(EvaluationError::Target { ref target, .. }) if target == "broken"
        ));
        assert!(order.lock().unwrap().is_empty());
    }

    #[test]
    fn test_done_targets_are_not_rerun() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let task = recording("once", &order);
        task.run().unwrap();

        let mut injector = Injector::new();
        injector
            .register(
                "once",
                Provider::new(move |_| Ok(Resource::Task(task.clone()))).with_attributes(
                    Attributes {
                        singleton: true,
                        target: true,
                        ..Attributes::default()
                    },
                ),
            )
            .unwrap();

        let journal = Journal::new();
        let results = Evaluator::new(BuildTaskDecider, &journal)
            .evaluate(&mut injector, &["once".to_string()])
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(order.lock().unwrap().len(), 1);
    }
}
