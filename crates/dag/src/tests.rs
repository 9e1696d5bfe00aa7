use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DagError;
use crate::models::{DagEdge, DependencyType, ParentOutcome};
use crate::source::DagSource;
use crate::{dependencies_satisfied, downstream_closure, topo_sort, validate};

fn edge(from: &str, to: &str, dep: DependencyType) -> DagEdge {
    DagEdge {
        from: from.into(),
        to: to.into(),
        dependency_type: dep,
    }
}

fn success(from: &str, to: &str) -> DagEdge {
    edge(from, to, DependencyType::Success)
}

// ---------------------------------------------------------------------------
// validate / topo_sort
// ---------------------------------------------------------------------------

#[test]
fn valid_linear_dag_returns_sorted_order() {
    let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let edges = vec![success("a", "b"), success("b", "c")];
    let sorted = validate(&nodes, &edges).expect("should be valid");
    assert_eq!(sorted, vec!["a", "b", "c"]);
}

#[test]
fn valid_diamond_dag() {
    let nodes = vec!["a".into(), "b".into(), "c".into(), "d".into()];
    let edges = vec![
        success("a", "b"),
        success("a", "c"),
        success("b", "d"),
        success("c", "d"),
    ];
    let sorted = validate(&nodes, &edges).expect("should be valid");
    assert_eq!(sorted.first().unwrap(), "a");
    assert_eq!(sorted.last().unwrap(), "d");
    assert_eq!(sorted.len(), 4);
}

#[test]
fn duplicate_node_id_is_rejected() {
    let nodes = vec!["a".to_string(), "a".to_string()];
    assert!(matches!(
        validate(&nodes, &[]),
        Err(DagError::DuplicateNodeId(id)) if id == "a"
    ));
}

#[test]
fn edge_referencing_missing_node_is_rejected() {
    let nodes = vec!["a".to_string()];
    let edges = vec![success("a", "ghost")];
    assert!(matches!(
        validate(&nodes, &edges),
        Err(DagError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
    ));
}

#[test]
fn cycle_is_detected() {
    let nodes = vec!["a".into(), "b".into(), "c".into()];
    let edges = vec![success("a", "b"), success("b", "c"), success("c", "a")];
    assert!(matches!(validate(&nodes, &edges), Err(DagError::CycleDetected)));
    // No partial order is ever returned on a cycle.
}

#[test]
fn single_node_no_edges_is_valid() {
    let nodes = vec!["solo".to_string()];
    let sorted = validate(&nodes, &[]).expect("single node should be valid");
    assert_eq!(sorted, vec!["solo"]);
}

// ---------------------------------------------------------------------------
// An in-memory DagSource for the async traversal/predicate tests.
// ---------------------------------------------------------------------------

struct InMemoryDag {
    nodes: Vec<String>,
    edges: Vec<DagEdge>,
    /// workflow_run_id -> job_id -> terminal outcome
    outcomes: HashMap<Uuid, HashMap<String, ParentOutcome>>,
}

#[async_trait]
impl DagSource for InMemoryDag {
    async fn nodes_and_edges(
        &self,
        _workflow_id: Uuid,
    ) -> Result<(Vec<String>, Vec<DagEdge>), DagError> {
        Ok((self.nodes.clone(), self.edges.clone()))
    }

    async fn parent_outcomes(
        &self,
        job_id: &str,
        workflow_run_id: Uuid,
    ) -> Result<Vec<(DagEdge, Option<ParentOutcome>)>, DagError> {
        let run_outcomes = self.outcomes.get(&workflow_run_id);
        let parents: Vec<(DagEdge, Option<ParentOutcome>)> = self
            .edges
            .iter()
            .filter(|e| e.to == job_id)
            .map(|e| {
                let outcome = run_outcomes.and_then(|m| m.get(&e.from)).copied();
                (e.clone(), outcome)
            })
            .collect();
        Ok(parents)
    }
}

#[tokio::test]
async fn topo_sort_from_source_matches_pure_validate() {
    let source = InMemoryDag {
        nodes: vec!["a".into(), "b".into(), "c".into()],
        edges: vec![success("a", "b"), success("b", "c")],
        outcomes: HashMap::new(),
    };
    let sorted = topo_sort(Uuid::new_v4(), &source).await.unwrap();
    assert_eq!(sorted, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn downstream_closure_returns_parents_before_children() {
    // a -> b -> d, a -> c -> d, and an unrelated node e.
    let source = InMemoryDag {
        nodes: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
        edges: vec![
            success("a", "b"),
            success("a", "c"),
            success("b", "d"),
            success("c", "d"),
        ],
        outcomes: HashMap::new(),
    };

    let closure = downstream_closure("b", Uuid::new_v4(), &source).await.unwrap();
    assert_eq!(closure.first().unwrap(), "b");
    assert_eq!(closure.last().unwrap(), "d");
    assert!(!closure.contains(&"e".to_string()));
    assert!(!closure.contains(&"a".to_string()));
}

#[tokio::test]
async fn dependencies_satisfied_true_when_no_parents() {
    let source = InMemoryDag {
        nodes: vec!["a".into()],
        edges: vec![],
        outcomes: HashMap::new(),
    };
    assert!(dependencies_satisfied("a", Uuid::new_v4(), &source)
        .await
        .unwrap());
}

#[tokio::test]
async fn dependencies_satisfied_respects_success_predicate() {
    let run_id = Uuid::new_v4();
    let mut outcomes = HashMap::new();
    outcomes.insert(run_id, HashMap::from([("a".to_string(), ParentOutcome::Failed)]));

    let source = InMemoryDag {
        nodes: vec!["a".into(), "b".into()],
        edges: vec![success("a", "b")],
        outcomes,
    };

    // Parent failed, but child requires SUCCESS -> not satisfied.
    assert!(!dependencies_satisfied("b", run_id, &source).await.unwrap());
}

#[tokio::test]
async fn dependencies_satisfied_with_complete_predicate_accepts_any_terminal() {
    let run_id = Uuid::new_v4();
    let mut outcomes = HashMap::new();
    outcomes.insert(run_id, HashMap::from([("a".to_string(), ParentOutcome::Failed)]));

    let source = InMemoryDag {
        nodes: vec!["a".into(), "b".into()],
        edges: vec![edge("a", "b", DependencyType::Complete)],
        outcomes,
    };

    assert!(dependencies_satisfied("b", run_id, &source).await.unwrap());
}

#[tokio::test]
async fn dependencies_satisfied_requires_all_parents() {
    let run_id = Uuid::new_v4();
    let mut outcomes = HashMap::new();
    outcomes.insert(
        run_id,
        HashMap::from([
            ("a".to_string(), ParentOutcome::Completed),
            ("b".to_string(), ParentOutcome::Failed),
        ]),
    );

    let source = InMemoryDag {
        nodes: vec!["a".into(), "b".into(), "c".into()],
        edges: vec![success("a", "c"), success("b", "c")],
        outcomes,
    };

    // 'b' satisfies SUCCESS only if completed; it failed, so 'c' is not eligible.
    assert!(!dependencies_satisfied("c", run_id, &source).await.unwrap());
}
