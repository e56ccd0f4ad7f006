//! # Pipeline DAG
//!
//! An immutable, validated graph of tasks. Declarations go through
//! [`DagBuilder`], which rejects duplicate task ids, self edges and edges naming
//! unknown tasks as they are declared. [`DagBuilder::build`] then rejects cycles,
//! so every [`Dag`] in hand is acyclic.
//!
//! Edges live in a `BTreeSet`; declaring the same edge twice stores it once.
//!
//! ## Modules
//!
//! - [`sparkify`] - the concrete songplay pipeline
//! - [`run`] - per-run task instance bookkeeping
//! - [`runner`] - in-process host that executes a run

pub mod run;
pub mod runner;
pub mod sparkify;

use crate::error::{PipelineError, Result};
use crate::tasks::Task;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub use run::{DagRun, RunState, TaskInstanceState};
pub use runner::{DagRunReport, LocalRunner, TaskReport};
pub use sparkify::build_pipeline;

/// Collects task and edge declarations for a [`Dag`]
#[derive(Default)]
pub struct DagBuilder {
    dag_id: String,
    description: String,
    tasks: Vec<Arc<dyn Task>>,
    index: HashMap<String, usize>,
    edges: BTreeSet<(String, String)>,
}

impl DagBuilder {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_task(&mut self, task: Arc<dyn Task>) -> Result<&mut Self> {
        let task_id = task.task_id().to_string();
        if self.index.contains_key(&task_id) {
            return Err(PipelineError::DuplicateTask { task_id });
        }

        self.index.insert(task_id, self.tasks.len());
        self.tasks.push(task);
        Ok(self)
    }

    /// Declare that `downstream` runs only after `upstream` succeeded
    pub fn add_edge(&mut self, upstream: &str, downstream: &str) -> Result<&mut Self> {
        for task_id in [upstream, downstream] {
            if !self.index.contains_key(task_id) {
                return Err(PipelineError::UnknownTask {
                    task_id: task_id.to_string(),
                });
            }
        }

        if upstream == downstream {
            return Err(PipelineError::SelfDependency {
                task_id: upstream.to_string(),
            });
        }

        self.edges
            .insert((upstream.to_string(), downstream.to_string()));
        Ok(self)
    }

    /// Fan out: `upstream >> [downstreams]`
    pub fn set_downstream(&mut self, upstream: &str, downstreams: &[&str]) -> Result<&mut Self> {
        for downstream in downstreams {
            self.add_edge(upstream, downstream)?;
        }
        Ok(self)
    }

    /// Fan in: `[upstreams] >> downstream`
    pub fn set_upstream(&mut self, downstream: &str, upstreams: &[&str]) -> Result<&mut Self> {
        for upstream in upstreams {
            self.add_edge(upstream, downstream)?;
        }
        Ok(self)
    }

    /// Linear chain `a >> b >> c`
    pub fn chain(&mut self, task_ids: &[&str]) -> Result<&mut Self> {
        for pair in task_ids.windows(2) {
            self.add_edge(pair[0], pair[1])?;
        }
        Ok(self)
    }

    /// Check for cycles and freeze the graph
    pub fn build(self) -> Result<Dag> {
        let mut graph = DiGraph::<usize, ()>::with_capacity(self.tasks.len(), self.edges.len());
        let nodes: Vec<NodeIndex> = (0..self.tasks.len()).map(|i| graph.add_node(i)).collect();

        for (upstream, downstream) in &self.edges {
            graph.add_edge(nodes[self.index[upstream]], nodes[self.index[downstream]], ());
        }

        let order = toposort(&graph, None).map_err(|cycle| PipelineError::CycleDetected {
            task_id: self.tasks[graph[cycle.node_id()]].task_id().to_string(),
        })?;

        let topological_order = order
            .into_iter()
            .map(|node| self.tasks[graph[node]].task_id().to_string())
            .collect();

        Ok(Dag {
            dag_id: self.dag_id,
            description: self.description,
            tasks: self.tasks,
            index: self.index,
            edges: self.edges,
            topological_order,
        })
    }
}

/// Validated, acyclic pipeline definition
#[derive(Clone)]
pub struct Dag {
    dag_id: String,
    description: String,
    tasks: Vec<Arc<dyn Task>>,
    index: HashMap<String, usize>,
    edges: BTreeSet<(String, String)>,
    topological_order: Vec<String>,
}

impl Dag {
    pub fn builder(dag_id: impl Into<String>) -> DagBuilder {
        DagBuilder::new(dag_id)
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Arc<dyn Task>> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.index.contains_key(task_id)
    }

    pub fn has_edge(&self, upstream: &str, downstream: &str) -> bool {
        self.edges
            .contains(&(upstream.to_string(), downstream.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(u, d)| (u.as_str(), d.as_str()))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct upstream task ids, sorted
    pub fn upstream(&self, task_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, d)| d == task_id)
            .map(|(u, _)| u.as_str())
            .collect()
    }

    /// Direct downstream task ids, sorted
    pub fn downstream(&self, task_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(u, _)| u == task_id)
            .map(|(_, d)| d.as_str())
            .collect()
    }

    pub fn in_degree(&self, task_id: &str) -> usize {
        self.edges.iter().filter(|(_, d)| d == task_id).count()
    }

    pub fn out_degree(&self, task_id: &str) -> usize {
        self.edges.iter().filter(|(u, _)| u == task_id).count()
    }

    /// Every task reachable downstream of `task_id`, excluding itself
    pub fn descendants(&self, task_id: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut pending = self.downstream(task_id);

        while let Some(next) = pending.pop() {
            if seen.insert(next) {
                pending.extend(self.downstream(next));
            }
        }
        seen
    }

    /// Tasks without upstreams, in declaration order
    pub fn roots(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .map(|t| t.task_id())
            .filter(|id| self.in_degree(id) == 0)
            .collect()
    }

    /// Tasks without downstreams, in declaration order
    pub fn leaves(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .map(|t| t.task_id())
            .filter(|id| self.out_degree(id) == 0)
            .collect()
    }

    /// An order in which every task follows all of its upstreams
    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    /// Render the graph as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut mermaid = String::from("flowchart LR\n");

        for task in &self.tasks {
            mermaid.push_str(&format!(
                "    {}[\"{} ({})\"]\n",
                task.task_id(),
                task.task_id(),
                task.kind()
            ));
        }

        for (upstream, downstream) in &self.edges {
            mermaid.push_str(&format!("    {upstream} --> {downstream}\n"));
        }

        mermaid
    }
}

impl fmt::Debug for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag")
            .field("dag_id", &self.dag_id)
            .field("tasks", &self.tasks.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}
