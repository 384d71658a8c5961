// tests/dag_properties.rs

use std::collections::{HashMap, HashSet};

use pipedag::dag::{TaskGraph, plan};
use pipedag::fs::MockFileSystem;
use pipedag::task::{Task, TaskBuilder};
use proptest::prelude::*;

/// Task i consumes the outputs of some tasks below i, so every generated
/// graph is acyclic. Also returns the dependency sets.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = (Vec<Task>, Vec<HashSet<usize>>)> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut tasks = Vec::new();
            let mut deps = Vec::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let valid: HashSet<usize> = if i == 0 {
                    HashSet::new()
                } else {
                    potential.into_iter().map(|d| d % i).collect()
                };

                let mut builder = TaskBuilder::new(format!("task_{i}"))
                    .consumes(format!("src_{i}.txt"))
                    .produces(format!("out_{i}.txt"))
                    .shell("true");
                for d in &valid {
                    builder = builder.consumes(format!("out_{d}.txt"));
                }
                tasks.push(builder.build().unwrap());
                deps.push(valid);
            }
            // Insert dependents first; ordering must not rely on insertion order.
            tasks.reverse();
            deps.reverse();
            (tasks, deps)
        })
    })
}

fn index_of(name: &str) -> usize {
    name.trim_start_matches("task_").parse().unwrap()
}

proptest! {
    #[test]
    fn order_respects_every_dependency((tasks, deps) in dag_strategy(12)) {
        let n = tasks.len();
        let graph = TaskGraph::from_tasks(tasks).unwrap();
        let order = graph.order().unwrap();
        prop_assert_eq!(order.len(), n);

        let position: HashMap<usize, usize> = order
            .iter()
            .enumerate()
            .map(|(pos, t)| (index_of(t.id().as_str()), pos))
            .collect();

        // `deps` was reversed along with the tasks.
        for (slot, task_deps) in deps.iter().enumerate() {
            let task = n - 1 - slot;
            for d in task_deps {
                prop_assert!(position[d] < position[&task]);
            }
        }
    }

    #[test]
    fn touching_a_source_reruns_exactly_its_downstream(
        (tasks, deps) in dag_strategy(10),
        touched in any::<prop::sample::Index>(),
    ) {
        let n = tasks.len();
        let graph = TaskGraph::from_tasks(tasks).unwrap();

        let fs = MockFileSystem::new();
        for i in 0..n {
            fs.add_file(format!("src_{i}.txt"), "");
        }
        for i in 0..n {
            fs.add_file(format!("out_{i}.txt"), "");
        }
        prop_assert!(plan(&graph, &[], &fs).unwrap().is_empty());

        let root = touched.index(n);
        fs.touch(format!("src_{root}.txt"));

        // Expected: root plus everything transitively depending on it.
        let mut by_task = vec![HashSet::new(); n];
        for (slot, task_deps) in deps.iter().enumerate() {
            by_task[n - 1 - slot] = task_deps.clone();
        }
        let mut expected = HashSet::from([root]);
        for i in 0..n {
            if by_task[i].iter().any(|d| expected.contains(d)) {
                expected.insert(i);
            }
        }

        let runs: HashSet<usize> = plan(&graph, &[], &fs)
            .unwrap()
            .to_run()
            .map(|t| index_of(t.id().as_str()))
            .collect();
        prop_assert_eq!(runs, expected);
    }
}
