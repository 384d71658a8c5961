// src/dag/plan.rs

use std::fmt;

use tracing::debug;

use super::filter::{Freshness, freshness};
use super::graph::{GraphError, Target, TaskGraph};
use crate::fs::FileSystem;
use crate::task::Task;
use crate::types::TaskId;

/// What the planner decided for one task, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Its own file state requires a run.
    Run(Freshness),
    /// A task it depends on is about to run, so its inputs will change.
    Upstream(TaskId),
    /// Outputs are current.
    Skip(Freshness),
    /// A group none of whose dependencies run.
    SkipGroup,
}

impl Decision {
    pub fn runs(&self) -> bool {
        matches!(self, Decision::Run(_) | Decision::Upstream(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Run(reason) => write!(f, "run: {reason}"),
            Decision::Upstream(dep) => write!(f, "run: upstream '{dep}' runs"),
            Decision::Skip(reason) => write!(f, "skip: {reason}"),
            Decision::SkipGroup => f.write_str("skip: nothing beneath it runs"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanStep {
    pub task: Task,
    pub decision: Decision,
}

/// Every task selected for a submission, in topological order, with the
/// decision made for each. Computed once per submission.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Tasks that must run, in execution order.
    pub fn to_run(&self) -> impl Iterator<Item = &Task> {
        self.steps
            .iter()
            .filter(|s| s.decision.runs())
            .map(|s| &s.task)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskId> {
        self.steps
            .iter()
            .filter(|s| !s.decision.runs())
            .map(|s| s.task.id())
    }

    /// True when nothing needs to run.
    pub fn is_empty(&self) -> bool {
        !self.steps.iter().any(|s| s.decision.runs())
    }
}

/// Select the tasks needed for `targets` and decide which of them run.
///
/// A task runs when its own freshness says so, or when any task it depends
/// on runs. Always-fresh tasks whose outputs exist stay skipped even then,
/// and a group runs only when one of its dependencies does.
pub fn plan(
    graph: &TaskGraph,
    targets: &[Target],
    fs: &dyn FileSystem,
) -> Result<ExecutionPlan, GraphError> {
    let deps = graph.dependency_lists()?;
    let selected = graph.subgraph_indices(targets)?;

    let mut runs = vec![false; graph.len()];
    let mut steps = Vec::with_capacity(selected.len());

    for idx in selected {
        let task = graph.task_at(idx);
        let upstream = deps[idx]
            .iter()
            .find(|&&d| runs[d])
            .map(|&d| graph.task_at(d).id().clone());

        let decision = if task.is_group() {
            match upstream {
                Some(dep) => Decision::Upstream(dep),
                None => Decision::SkipGroup,
            }
        } else {
            let state = freshness(task, fs);
            match (state.needs_run(), upstream) {
                (true, _) => Decision::Run(state),
                (false, Some(_)) if state == Freshness::AlwaysFresh => Decision::Skip(state),
                (false, Some(dep)) => Decision::Upstream(dep),
                (false, None) => Decision::Skip(state),
            }
        };

        debug!(task = %task.id(), decision = %decision, "planned task");
        runs[idx] = decision.runs();
        steps.push(PlanStep {
            task: task.clone(),
            decision,
        });
    }

    Ok(ExecutionPlan { steps })
}
