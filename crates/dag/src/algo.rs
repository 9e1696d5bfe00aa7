//! DAG validation and traversal — run this before persisting or executing a
//! workflow.
//!
//! Rules enforced by [`validate`]:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success. Start/end
//! sentinel nodes, when present, are treated like any other node — they
//! simply need to appear in the `nodes` slice for their edges to validate.

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::error::DagError;
use crate::models::DagEdge;
use crate::source::DagSource;

/// Validate a node/edge set and return nodes in topological execution order.
///
/// # Errors
/// - [`DagError::DuplicateNodeId`] if two nodes share an ID.
/// - [`DagError::UnknownNodeReference`] if an edge references a missing node.
/// - [`DagError::CycleDetected`] if the graph is not acyclic.
pub fn validate(nodes: &[String], edges: &[DagEdge]) -> Result<Vec<String>, DagError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique.
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for id in nodes {
        if !seen_ids.insert(id.as_str()) {
            return Err(DagError::DuplicateNodeId(id.clone()));
        }
    }

    let node_set: HashSet<&str> = nodes.iter().map(|n| n.as_str()).collect();

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints.
    // -----------------------------------------------------------------------
    for edge in edges {
        if !node_set.contains(edge.from.as_str()) {
            return Err(DagError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !node_set.contains(edge.to.as_str()) {
            return Err(DagError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm).
    // -----------------------------------------------------------------------
    let sorted = kahn_sort(nodes, edges)?;
    Ok(sorted)
}

/// Kahn's algorithm over an explicit node/edge set, shared by [`validate`]
/// and [`downstream_closure`] (the latter runs it over an induced subgraph).
fn kahn_sort(nodes: &[String], edges: &[DagEdge]) -> Result<Vec<String>, DagError> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for id in nodes {
        adjacency.entry(id.as_str()).or_default();
        in_degree.entry(id.as_str()).or_insert(0);
    }

    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    // Deterministic ordering among independent roots: sort the initial frontier.
    let mut initial: Vec<&str> = queue.drain(..).collect();
    initial.sort_unstable();
    queue.extend(initial);

    let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            let mut ready: Vec<&str> = Vec::new();
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    ready.push(neighbour);
                }
            }
            ready.sort_unstable();
            queue.extend(ready);
        }
    }

    if sorted.len() != nodes.len() {
        return Err(DagError::CycleDetected);
    }

    Ok(sorted)
}

/// Load a workflow's DAG from `source` and validate it, same semantics as
/// [`validate`].
pub async fn topo_sort(
    workflow_id: Uuid,
    source: &dyn DagSource,
) -> Result<Vec<String>, DagError> {
    let (nodes, edges) = source.nodes_and_edges(workflow_id).await?;
    validate(&nodes, &edges)
}

/// All nodes reachable forward from `job_id` within `workflow_id`, in
/// dependency order (parents before children). Used by "rerun from node" to
/// know what to reset.
pub async fn downstream_closure(
    job_id: &str,
    workflow_id: Uuid,
    source: &dyn DagSource,
) -> Result<Vec<String>, DagError> {
    let (nodes, edges) = source.nodes_and_edges(workflow_id).await?;

    if !nodes.iter().any(|n| n == job_id) {
        return Err(DagError::UnknownNodeReference {
            node_id: job_id.to_owned(),
            side: "from",
        });
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    // Iterative DFS to find the reachable set (including job_id itself).
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![job_id];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(neighbours) = adjacency.get(current) {
            for &n in neighbours {
                if !visited.contains(n) {
                    stack.push(n);
                }
            }
        }
    }

    // Order the reachable set with parents before children by running Kahn's
    // algorithm over the induced subgraph.
    let reachable_nodes: Vec<String> = nodes
        .iter()
        .filter(|n| visited.contains(n.as_str()))
        .cloned()
        .collect();
    let reachable_edges: Vec<DagEdge> = edges
        .into_iter()
        .filter(|e| visited.contains(e.from.as_str()) && visited.contains(e.to.as_str()))
        .collect();

    kahn_sort(&reachable_nodes, &reachable_edges)
}

/// Batch-evaluate whether all of `job_id`'s dependencies are satisfied for
/// `workflow_run_id`, per the predicate table:
///
/// - `SUCCESS`  <-> parent `completed`
/// - `FAILURE`  <-> parent `failed`
/// - `COMPLETE` <-> parent `completed | failed | skipped`
///
/// Each edge's predicate is evaluated independently (the conservative
/// reading of mixed `FAILURE`/`SUCCESS` edges from the same parent — see
/// DESIGN.md); all must hold for the job to be eligible.
pub async fn dependencies_satisfied(
    job_id: &str,
    workflow_run_id: Uuid,
    source: &dyn DagSource,
) -> Result<bool, DagError> {
    let parents = source.parent_outcomes(job_id, workflow_run_id).await?;

    if parents.is_empty() {
        return Ok(true);
    }

    for (edge, outcome) in parents {
        match outcome {
            Some(outcome) if edge.dependency_type.is_satisfied_by(outcome) => continue,
            _ => return Ok(false),
        }
    }

    Ok(true)
}
