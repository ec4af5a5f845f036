//! # Dependency-graph compilation helpers.
//!
//! A plan's flat task list is split into disjoint connected components over
//! the union of the dependency and dependent edge sets, each becoming a
//! [`TaskGraph`]. Execution order inside a graph is Kahn's algorithm with the
//! ready set sorted ascending by id, so ties break deterministically.

use std::collections::{HashMap, VecDeque};

use crate::error::RegistryError;
use crate::model::{Task, TaskGraph};

/// Splits the task set into disjoint connected graphs.
///
/// Roots are the ids with no dependencies (sorted for determinism). When every
/// task depends on something (legal only if a cycle is present, caught later),
/// one unvisited task seeds the walk. Each graph carries the dependency and
/// dependent maps restricted to its node set.
///
/// # Errors
/// `Disconnected` when a task ends up in no graph.
pub(crate) fn build_disjoint_graphs(
    tasks: &HashMap<String, Task>,
    dependencies: &HashMap<String, Vec<String>>,
    dependents: &HashMap<String, Vec<String>>,
) -> Result<Vec<TaskGraph>, RegistryError> {
    let mut roots: Vec<&String> = tasks
        .keys()
        .filter(|id| dependencies.get(*id).map_or(true, Vec::is_empty))
        .collect();
    roots.sort();

    if roots.is_empty() {
        let mut ids: Vec<&String> = tasks.keys().collect();
        ids.sort();
        roots.extend(ids.first().copied());
    }

    let mut visited: HashMap<&str, bool> = HashMap::with_capacity(tasks.len());
    let mut graphs = Vec::new();

    for root in roots {
        if visited.get(root.as_str()).copied().unwrap_or(false) {
            continue;
        }

        let mut graph = TaskGraph {
            root_task_id: root.clone(),
            tasks: HashMap::new(),
            dependencies: HashMap::new(),
            dependents: HashMap::new(),
        };

        let mut queue = VecDeque::from([root.clone()]);
        visited.insert(root.as_str(), true);

        while let Some(current) = queue.pop_front() {
            if let Some(task) = tasks.get(&current) {
                graph.tasks.insert(current.clone(), task.clone());
            }
            let deps = dependencies.get(&current).cloned().unwrap_or_default();
            let reqs = dependents.get(&current).cloned().unwrap_or_default();

            // Walk both edge directions so the whole connected component lands
            // in one graph.
            for next in deps.iter().chain(reqs.iter()) {
                if !visited.get(next.as_str()).copied().unwrap_or(false) {
                    if let Some((id, _)) = tasks.get_key_value(next) {
                        visited.insert(id.as_str(), true);
                        queue.push_back(next.clone());
                    }
                }
            }

            graph.dependencies.insert(current.clone(), deps);
            graph.dependents.insert(current.clone(), reqs);
        }

        graphs.push(graph);
    }

    if visited.len() != tasks.len() {
        return Err(RegistryError::Disconnected);
    }
    Ok(graphs)
}

/// Returns the graph's tasks with every task's dependencies before it, or
/// `None` when the dependency map contains a cycle.
///
/// Kahn's algorithm over the `task → dependsOn` map walks from the most
/// depended-upon end; the output is reversed so execution starts at tasks with
/// no dependencies. The ready set is kept sorted ascending by id.
pub(crate) fn execution_order(dependencies: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        dependencies.keys().map(|id| (id.as_str(), 0)).collect();
    for deps in dependencies.values() {
        for dep in deps {
            if let Some(degree) = in_degree.get_mut(dep.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_unstable();

    let mut order = Vec::with_capacity(dependencies.len());
    while !ready.is_empty() {
        ready.sort_unstable();
        let id = ready.remove(0);
        order.push(id.to_string());

        if let Some(deps) = dependencies.get(id) {
            for dep in deps {
                if let Some(degree) = in_degree.get_mut(dep.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dep.as_str());
                    }
                }
            }
        }
    }

    if order.len() != dependencies.len() {
        return None;
    }
    order.reverse();
    Some(order)
}
