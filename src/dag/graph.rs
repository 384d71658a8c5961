// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

use crate::task::Task;
use crate::types::TaskId;

/// Structural problems found while building or ordering a graph. All of
/// these are detected before any work is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(TaskId),

    #[error("{path:?} is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        path: PathBuf,
        first: TaskId,
        second: TaskId,
    },

    #[error("cycle detected between tasks: {}", join_ids(.0))]
    CyclicDependency(Vec<TaskId>),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("target '{0}' names no task and no produced file")]
    UnknownTarget(String),
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::as_str).collect::<Vec<_>>().join(" -> ")
}

/// Something a caller asks to have built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A file; resolves to the task producing it.
    Path(PathBuf),
    /// A task by id.
    Task(TaskId),
}

impl Target {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Target::Path(path.into())
    }

    pub fn task(id: impl Into<TaskId>) -> Self {
        Target::Task(id.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(p) => write!(f, "{}", p.display()),
            Target::Task(id) => write!(f, "{id}"),
        }
    }
}

/// The tasks of one job plus the indices needed to derive their
/// dependencies.
///
/// Tasks keep their insertion order, which doubles as the tie-break for
/// topological ordering. A graph is built once per submission and then
/// shared read-only.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    producers: HashMap<PathBuf, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph by adding every task in order.
    pub fn from_tasks<I>(tasks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut graph = Self::new();
        for task in tasks {
            graph.add(task)?;
        }
        Ok(graph)
    }

    /// Add a task. Fails if its id is taken or if one of its outputs already
    /// has a producer; the graph is unchanged on error.
    pub fn add(&mut self, task: Task) -> Result<(), GraphError> {
        if self.index.contains_key(task.id()) {
            return Err(GraphError::DuplicateTaskId(task.id().clone()));
        }
        for path in task.produces() {
            if let Some(&owner) = self.producers.get(path) {
                return Err(GraphError::DuplicateProducer {
                    path: path.clone(),
                    first: self.tasks[owner].id().clone(),
                    second: task.id().clone(),
                });
            }
        }

        let idx = self.tasks.len();
        for path in task.produces() {
            self.producers.insert(path.clone(), idx);
        }
        self.index.insert(task.id().clone(), idx);
        self.tasks.push(task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn producer_of(&self, path: &Path) -> Option<&Task> {
        self.producers.get(path).map(|&i| &self.tasks[i])
    }

    /// Interpret a CLI-style target string: a task id wins over a path.
    pub fn resolve_target(&self, raw: &str) -> Target {
        let id = TaskId::from(raw);
        if self.index.contains_key(&id) {
            Target::Task(id)
        } else {
            Target::path(raw)
        }
    }

    /// Direct dependencies of a task: producers of its consumed files plus
    /// its `after` entries.
    pub fn dependencies_of(&self, id: &TaskId) -> Result<Vec<&Task>, GraphError> {
        let Some(&idx) = self.index.get(id) else {
            return Err(GraphError::UnknownTarget(id.to_string()));
        };
        Ok(self
            .deps_of_index(idx)?
            .into_iter()
            .map(|d| &self.tasks[d])
            .collect())
    }

    /// Topological order of every task; ready tasks are taken in insertion
    /// order.
    pub fn order(&self) -> Result<Vec<&Task>, GraphError> {
        Ok(self
            .order_indices()?
            .into_iter()
            .map(|i| &self.tasks[i])
            .collect())
    }

    /// The minimal set of tasks needed for `targets`, in topological order.
    /// An empty target list selects every task.
    pub fn subgraph_for(&self, targets: &[Target]) -> Result<Vec<&Task>, GraphError> {
        Ok(self
            .subgraph_indices(targets)?
            .into_iter()
            .map(|i| &self.tasks[i])
            .collect())
    }

    pub(crate) fn task_at(&self, idx: usize) -> &Task {
        &self.tasks[idx]
    }

    pub(crate) fn subgraph_indices(&self, targets: &[Target]) -> Result<Vec<usize>, GraphError> {
        let deps = self.dependency_lists()?;
        let order = self.kahn(&deps)?;
        if targets.is_empty() {
            return Ok(order);
        }

        let mut selected = vec![false; self.tasks.len()];
        let mut stack = Vec::with_capacity(targets.len());
        for target in targets {
            let root = match target {
                Target::Path(p) => self.producers.get(p),
                Target::Task(id) => self.index.get(id),
            };
            let root = root.ok_or_else(|| GraphError::UnknownTarget(target.to_string()))?;
            stack.push(*root);
        }

        while let Some(i) = stack.pop() {
            if selected[i] {
                continue;
            }
            selected[i] = true;
            stack.extend(deps[i].iter().copied().filter(|&d| !selected[d]));
        }

        Ok(order.into_iter().filter(|&i| selected[i]).collect())
    }

    fn order_indices(&self) -> Result<Vec<usize>, GraphError> {
        let deps = self.dependency_lists()?;
        self.kahn(&deps)
    }

    /// Dependency list per task index, deduplicated and sorted.
    pub(crate) fn dependency_lists(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        (0..self.tasks.len()).map(|i| self.deps_of_index(i)).collect()
    }

    fn deps_of_index(&self, idx: usize) -> Result<Vec<usize>, GraphError> {
        let task = &self.tasks[idx];
        let mut deps: Vec<usize> = task
            .consumes()
            .iter()
            .filter_map(|p| self.producers.get(p).copied())
            .collect();

        for dep in task.after() {
            match self.index.get(dep) {
                Some(&d) => deps.push(d),
                None => {
                    return Err(GraphError::UnknownDependency {
                        task: task.id().clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        deps.sort_unstable();
        deps.dedup();
        Ok(deps)
    }

    fn kahn(&self, deps: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
        let n = self.tasks.len();
        let mut indegree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); n];
        for (task, task_deps) in deps.iter().enumerate() {
            for &d in task_deps {
                dependents[d].push(task);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() < n {
            return Err(self.cycle_error(deps));
        }
        Ok(order)
    }

    /// Name the tasks of one cycle, using petgraph's SCC search.
    fn cycle_error(&self, deps: &[Vec<usize>]) -> GraphError {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..self.tasks.len() {
            graph.add_node(i);
        }
        for (task, task_deps) in deps.iter().enumerate() {
            for &d in task_deps {
                graph.add_edge(d, task, ());
            }
        }

        let mut members = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .unwrap_or_default();
        members.sort_unstable();

        GraphError::CyclicDependency(
            members
                .into_iter()
                .map(|i| self.tasks[i].id().clone())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;

    fn step(id: &str, consumes: &[&str], produces: &[&str]) -> Task {
        TaskBuilder::new(id)
            .consumes_all(consumes.iter().copied())
            .produces_all(produces.iter().copied())
            .shell("true")
            .build()
            .unwrap()
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id().to_string()).collect()
    }

    #[test]
    fn orders_by_file_dependencies() {
        let graph = TaskGraph::from_tasks([
            step("c", &["b.out"], &["c.out"]),
            step("b", &["a.out"], &["b.out"]),
            step("a", &["in"], &["a.out"]),
        ])
        .unwrap();

        assert_eq!(ids(&graph.order().unwrap()), ["a", "b", "c"]);
    }

    #[test]
    fn independent_tasks_keep_insertion_order() {
        let graph = TaskGraph::from_tasks([
            step("z", &[], &["z.out"]),
            step("y", &[], &["y.out"]),
            step("join", &["z.out", "y.out"], &["j.out"]),
            step("x", &[], &["x.out"]),
        ])
        .unwrap();

        assert_eq!(ids(&graph.order().unwrap()), ["z", "y", "join", "x"]);
    }

    #[test]
    fn duplicate_id_and_producer_are_rejected() {
        let mut graph = TaskGraph::new();
        graph.add(step("a", &[], &["a.out"])).unwrap();

        let err = graph.add(step("a", &[], &["other"])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTaskId("a".into()));

        let err = graph.add(step("b", &[], &["a.out"])).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateProducer { ref first, .. } if first.as_str() == "a"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn cycle_names_its_members() {
        let graph = TaskGraph::from_tasks([
            step("root", &[], &["r"]),
            step("a", &["r", "b.out"], &["a.out"]),
            step("b", &["a.out"], &["b.out"]),
        ])
        .unwrap();

        let err = graph.order().unwrap_err();
        assert_eq!(err, GraphError::CyclicDependency(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn task_consuming_its_own_output_is_a_cycle() {
        let graph = TaskGraph::from_tasks([step("loop", &["x"], &["x"])]).unwrap();
        assert_eq!(
            graph.order().unwrap_err(),
            GraphError::CyclicDependency(vec!["loop".into()])
        );
    }

    #[test]
    fn unknown_after_is_reported() {
        let group = TaskBuilder::group("all", ["missing"]).build().unwrap();
        let graph = TaskGraph::from_tasks([group]).unwrap();
        assert!(matches!(
            graph.order(),
            Err(GraphError::UnknownDependency { ref dependency, .. }) if dependency.as_str() == "missing"
        ));
    }

    #[test]
    fn subgraph_contains_only_the_closure_of_targets() {
        let graph = TaskGraph::from_tasks([
            step("a", &["in"], &["a.out"]),
            step("b", &["a.out"], &["b.out"]),
            step("c", &["b.out"], &["c.out"]),
            step("side", &["in"], &["side.out"]),
        ])
        .unwrap();

        let sub = graph.subgraph_for(&[Target::path("b.out")]).unwrap();
        assert_eq!(ids(&sub), ["a", "b"]);

        let sub = graph
            .subgraph_for(&[Target::task("side"), Target::task("a")])
            .unwrap();
        assert_eq!(ids(&sub), ["a", "side"]);

        assert_eq!(graph.subgraph_for(&[]).unwrap().len(), 4);
    }

    #[test]
    fn unknown_target_fails() {
        let graph = TaskGraph::from_tasks([step("a", &["in"], &["a.out"])]).unwrap();
        let err = graph.subgraph_for(&[Target::path("in")]).unwrap_err();
        assert_eq!(err, GraphError::UnknownTarget("in".into()));
    }

    #[test]
    fn resolve_target_prefers_task_ids() {
        let graph = TaskGraph::from_tasks([step("a", &[], &["a.out"])]).unwrap();
        assert_eq!(graph.resolve_target("a"), Target::task("a"));
        assert_eq!(graph.resolve_target("a.out"), Target::path("a.out"));
    }
}
