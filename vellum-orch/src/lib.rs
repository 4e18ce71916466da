#![deny(missing_docs)]
//! Typed orchestration DAG.
//!
//! A [`Plan`] owns its nodes in an arena keyed by [`NodeId`] and its
//! edges as plain id pairs, so the graph carries no reference cycles.
//! Edges type-check at connect time (source output type = target input
//! type), cycles are caught by depth-first validation, and execution
//! runs Kahn's algorithm to schedule whole dependency levels
//! concurrently.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;
use vellum_types::LlmError;

/// Arena index of a node within one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A JSON-in/JSON-out unit of work (usually an agent run).
#[async_trait]
pub trait OrchAgent: Send + Sync {
    /// Execute with the resolved input.
    async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value, LlmError>;
}

/// A node in the plan.
struct Node {
    name: String,
    input_type: String,
    output_type: String,
    agent: std::sync::Arc<dyn OrchAgent>,
}

/// A dependency edge: `from`'s output feeds `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Producing node.
    pub from: NodeId,
    /// Consuming node.
    pub to: NodeId,
}

/// Why a plan failed.
#[derive(Debug)]
pub struct PlanFailure {
    /// The node that failed (or the structural problem's description
    /// under [`PlanFailure::error`]).
    pub node: Option<NodeId>,
    /// The underlying error.
    pub error: LlmError,
    /// Outputs of nodes that completed before the failure.
    pub completed: HashMap<NodeId, serde_json::Value>,
}

impl std::fmt::Display for PlanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plan failed: {}", self.error)?;
        if !self.completed.is_empty() {
            write!(f, " ({} nodes completed)", self.completed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanFailure {}

/// An executable DAG of agents.
#[derive(Default)]
pub struct Plan {
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    next_id: usize,
    insertion_order: Vec<NodeId>,
}

impl Plan {
    /// Create an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with declared input/output type names.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        agent: std::sync::Arc<dyn OrchAgent>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                name: name.into(),
                input_type: input_type.into(),
                output_type: output_type.into(),
                agent,
            },
        );
        self.insertion_order.push(id);
        id
    }

    /// Connect two nodes.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] for unknown ids or when the source's
    /// output type does not equal the target's input type.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), LlmError> {
        let source = self
            .nodes
            .get(&from)
            .ok_or_else(|| LlmError::Validation(format!("unknown source node {from:?}")))?;
        let target = self
            .nodes
            .get(&to)
            .ok_or_else(|| LlmError::Validation(format!("unknown target node {to:?}")))?;
        if source.output_type != target.input_type {
            return Err(LlmError::Validation(format!(
                "edge type mismatch: '{}' produces {} but '{}' consumes {}",
                source.name, source.output_type, target.name, target.input_type
            )));
        }
        self.edges.push(Edge { from, to });
        Ok(())
    }

    /// Check the plan is a DAG via three-color depth-first search.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] naming a node on a cycle.
    pub fn validate(&self) -> Result<(), LlmError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: HashMap<NodeId, Color> =
            self.nodes.keys().map(|&id| (id, Color::White)).collect();

        fn visit(
            id: NodeId,
            edges: &[Edge],
            colors: &mut HashMap<NodeId, Color>,
            names: &HashMap<NodeId, &str>,
        ) -> Result<(), LlmError> {
            colors.insert(id, Color::Gray);
            for edge in edges.iter().filter(|e| e.from == id) {
                match colors[&edge.to] {
                    Color::Gray => {
                        return Err(LlmError::Validation(format!(
                            "cycle through node '{}'",
                            names[&edge.to]
                        )));
                    }
                    Color::White => visit(edge.to, edges, colors, names)?,
                    Color::Black => {}
                }
            }
            colors.insert(id, Color::Black);
            Ok(())
        }

        let names: HashMap<NodeId, &str> = self
            .nodes
            .iter()
            .map(|(&id, n)| (id, n.name.as_str()))
            .collect();
        for &id in &self.insertion_order {
            if colors[&id] == Color::White {
                visit(id, &self.edges, &mut colors, &names)?;
            }
        }
        Ok(())
    }

    /// Topological batches via Kahn's algorithm: every node in a batch
    /// has all dependencies satisfied by earlier batches.
    ///
    /// # Errors
    ///
    /// [`LlmError::Validation`] when a cycle prevents completion.
    pub fn batches(&self) -> Result<Vec<Vec<NodeId>>, LlmError> {
        let mut in_degree: HashMap<NodeId, usize> =
            self.nodes.keys().map(|&id| (id, 0)).collect();
        for edge in &self.edges {
            *in_degree.get_mut(&edge.to).expect("edge target exists") += 1;
        }

        let mut ready: Vec<NodeId> = self
            .insertion_order
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();
        let mut batches = Vec::new();
        let mut seen = 0usize;

        while !ready.is_empty() {
            let batch = std::mem::take(&mut ready);
            seen += batch.len();
            for &id in &batch {
                for edge in self.edges.iter().filter(|e| e.from == id) {
                    let degree = in_degree.get_mut(&edge.to).expect("edge target exists");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(edge.to);
                    }
                }
            }
            batches.push(batch);
        }

        if seen != self.nodes.len() {
            return Err(LlmError::Validation("plan contains a cycle".into()));
        }
        Ok(batches)
    }

    /// Execute the plan.
    ///
    /// `initial_inputs` feeds nodes with no incoming edges. A node with
    /// incoming edges takes the first upstream output that is
    /// available, in edge insertion order - fan-in tolerates upstream
    /// nodes that other branches supplied. Nodes in the same batch run
    /// concurrently.
    ///
    /// # Errors
    ///
    /// The first node failure aborts the plan; the failure carries
    /// every already-completed output.
    pub async fn execute(
        &self,
        initial_inputs: HashMap<NodeId, serde_json::Value>,
    ) -> Result<HashMap<NodeId, serde_json::Value>, PlanFailure> {
        self.validate().map_err(|error| PlanFailure {
            node: None,
            error,
            completed: HashMap::new(),
        })?;
        let batches = self.batches().map_err(|error| PlanFailure {
            node: None,
            error,
            completed: HashMap::new(),
        })?;

        let mut outputs: HashMap<NodeId, serde_json::Value> = HashMap::new();

        for batch in batches {
            let mut join_set: JoinSet<(NodeId, Result<serde_json::Value, LlmError>)> =
                JoinSet::new();

            for id in batch {
                let input = match self.resolve_input(id, &initial_inputs, &outputs) {
                    Ok(input) => input,
                    Err(error) => {
                        return Err(PlanFailure {
                            node: Some(id),
                            error,
                            completed: outputs,
                        });
                    }
                };
                let agent = std::sync::Arc::clone(&self.nodes[&id].agent);
                let name = self.nodes[&id].name.clone();
                join_set.spawn(async move {
                    debug!(node = %name, "running plan node");
                    (id, agent.run(input).await)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, Ok(output))) => {
                        outputs.insert(id, output);
                    }
                    Ok((id, Err(error))) => {
                        join_set.abort_all();
                        return Err(PlanFailure {
                            node: Some(id),
                            error,
                            completed: outputs,
                        });
                    }
                    Err(join_err) => {
                        join_set.abort_all();
                        return Err(PlanFailure {
                            node: None,
                            error: LlmError::Unknown {
                                message: format!("plan task failed: {join_err}"),
                                source: Some(Box::new(join_err)),
                            },
                            completed: outputs,
                        });
                    }
                }
            }
        }

        Ok(outputs)
    }

    fn resolve_input(
        &self,
        id: NodeId,
        initial_inputs: &HashMap<NodeId, serde_json::Value>,
        outputs: &HashMap<NodeId, serde_json::Value>,
    ) -> Result<serde_json::Value, LlmError> {
        let incoming: Vec<&Edge> = self.edges.iter().filter(|e| e.to == id).collect();
        if incoming.is_empty() {
            return initial_inputs.get(&id).cloned().ok_or_else(|| {
                LlmError::Validation(format!(
                    "no initial input for root node '{}'",
                    self.nodes[&id].name
                ))
            });
        }
        incoming
            .iter()
            .find_map(|e| outputs.get(&e.from).cloned())
            .ok_or_else(|| {
                LlmError::Validation(format!(
                    "no upstream output available for node '{}'",
                    self.nodes[&id].name
                ))
            })
    }
}
