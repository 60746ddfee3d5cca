//! Dependency-graph helpers: cycle detection and start ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::SupervisorError;

/// Service name → names it depends on.
pub(crate) type DependencyMap<'a> = HashMap<&'a str, &'a BTreeSet<String>>;

/// Return a dependency path `start -> … -> start` if one exists.
///
/// The registry is acyclic before every registration, so any new cycle must
/// pass through the service being added; searching from it is enough.
pub(crate) fn cycle_through(start: &str, graph: &DependencyMap<'_>) -> Option<Vec<String>> {
    let mut path = vec![start.to_string()];
    let mut visited = HashSet::new();
    if visit(start, start, graph, &mut path, &mut visited) {
        Some(path)
    } else {
        None
    }
}

fn visit(
    node: &str,
    target: &str,
    graph: &DependencyMap<'_>,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    let Some(deps) = graph.get(node) else {
        return false;
    };
    for dep in deps.iter() {
        path.push(dep.clone());
        if dep == target {
            return true;
        }
        if visited.insert(dep.clone()) && visit(dep, target, graph, path, visited) {
            return true;
        }
        path.pop();
    }
    false
}

/// Order services so each appears after all of its dependencies.
///
/// Among services that are ready at the same time, the one registered first
/// wins, which keeps start order stable between runs.
///
/// # Errors
///
/// - [`SupervisorError::UnknownDependency`] when a dependency was never
///   registered.
/// - [`SupervisorError::CyclicDependency`] if no order exists.
pub(crate) fn topological_order(
    registration_order: &[String],
    graph: &DependencyMap<'_>,
) -> Result<Vec<String>, SupervisorError> {
    for name in registration_order {
        if let Some(deps) = graph.get(name.as_str()) {
            if let Some(missing) = deps.iter().find(|d| !graph.contains_key(d.as_str())) {
                return Err(SupervisorError::UnknownDependency {
                    service: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(registration_order.len());
    while ordered.len() < registration_order.len() {
        let next = registration_order.iter().find(|name| {
            !placed.contains(name.as_str())
                && graph
                    .get(name.as_str())
                    .is_none_or(|deps| deps.iter().all(|d| placed.contains(d.as_str())))
        });
        match next {
            Some(name) => {
                placed.insert(name.as_str());
                ordered.push(name.clone());
            }
            None => {
                let stuck: Vec<String> = registration_order
                    .iter()
                    .filter(|n| !placed.contains(n.as_str()))
                    .cloned()
                    .collect();
                return Err(SupervisorError::CyclicDependency {
                    service: stuck.first().cloned().unwrap_or_default(),
                    cycle: stuck,
                });
            }
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_self_dependency() {
        let a = deps(&["a"]);
        let graph: DependencyMap = [("a", &a)].into_iter().collect();
        assert_eq!(cycle_through("a", &graph), Some(names(&["a", "a"])));
    }

    #[test]
    fn detects_indirect_cycle() {
        let a = deps(&["b"]);
        let b = deps(&["c"]);
        let c = deps(&["a"]);
        let graph: DependencyMap = [("a", &a), ("b", &b), ("c", &c)].into_iter().collect();
        assert_eq!(cycle_through("a", &graph), Some(names(&["a", "b", "c", "a"])));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let top = deps(&["left", "right"]);
        let left = deps(&["base"]);
        let right = deps(&["base"]);
        let base = deps(&[]);
        let graph: DependencyMap = [("top", &top), ("left", &left), ("right", &right), ("base", &base)]
            .into_iter()
            .collect();
        assert!(cycle_through("top", &graph).is_none());
    }

    #[test]
    fn dangling_reference_is_not_a_cycle() {
        let a = deps(&["later"]);
        let graph: DependencyMap = [("a", &a)].into_iter().collect();
        assert!(cycle_through("a", &graph).is_none());
    }

    #[test]
    fn orders_dependencies_first_and_keeps_registration_ties() {
        let ui = deps(&["backend"]);
        let listener = deps(&["backend"]);
        let backend = deps(&[]);
        let watchdog = deps(&[]);
        let graph: DependencyMap = [
            ("ui", &ui),
            ("listener", &listener),
            ("backend", &backend),
            ("watchdog", &watchdog),
        ]
        .into_iter()
        .collect();

        let order = topological_order(&names(&["ui", "listener", "backend", "watchdog"]), &graph).unwrap();
        assert_eq!(order, names(&["backend", "ui", "listener", "watchdog"]));
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let listener = deps(&["backend"]);
        let graph: DependencyMap = [("listener", &listener)].into_iter().collect();
        let err = topological_order(&names(&["listener"]), &graph).unwrap_err();
        assert_eq!(
            err,
            SupervisorError::UnknownDependency {
                service: "listener".into(),
                dependency: "backend".into(),
            }
        );
    }
}
