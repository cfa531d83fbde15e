//! DAG validation and level scheduling
//!
//! Admission rules enforced before any dispatch:
//! 1. `nodes` is non-empty and node ids are unique.
//! 2. Every edge references declared node ids.
//! 3. The directed graph is acyclic.
//!
//! The schedule is Kahn layering over in-degrees: level 0 holds every source,
//! and each next level holds the nodes whose in-degree reaches zero once the
//! previous level is removed. Every node lands in exactly one level, and all
//! of a node's dependencies sit in strictly earlier levels — the maximum
//! parallelism the DAG permits, with a deterministic failure boundary.

use std::collections::{HashMap, HashSet};

use reflux_contracts::FlowSpec;

use crate::error::EngineError;

/// Compute the level schedule for a spec, validating it along the way.
pub fn level_schedule(spec: &FlowSpec) -> Result<Vec<Vec<String>>, EngineError> {
    if spec.nodes.is_empty() {
        return Err(EngineError::Validation(
            "Workflow must declare at least one node".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &spec.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate node id: {}",
                node.id
            )));
        }
    }

    for edge in &spec.edges {
        if !seen.contains(edge.from.as_str()) {
            return Err(EngineError::Validation(format!(
                "Edge references unknown node: {}",
                edge.from
            )));
        }
        if !seen.contains(edge.to.as_str()) {
            return Err(EngineError::Validation(format!(
                "Edge references unknown node: {}",
                edge.to
            )));
        }
    }

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in &spec.nodes {
        successors.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }
    for edge in &spec.edges {
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut remaining = spec.nodes.len();

    // Iterate spec order within a level so scheduling is deterministic even
    // though intra-level ordering is irrelevant to correctness.
    while remaining > 0 {
        let ready: Vec<&str> = spec
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        if ready.is_empty() {
            return Err(EngineError::Validation(
                "Workflow contains a cycle".to_string(),
            ));
        }

        for id in &ready {
            in_degree.remove(id);
            for succ in &successors[id] {
                if let Some(deg) = in_degree.get_mut(succ) {
                    *deg -= 1;
                }
            }
        }

        remaining -= ready.len();
        levels.push(ready.into_iter().map(str::to_owned).collect());
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflux_contracts::{EdgeSpec, NodeSpec};

    fn node(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            node_type: "nodes.test".to_string(),
            params: serde_json::Value::Null,
            version: None,
        }
    }

    fn edge(from: &str, to: &str) -> EdgeSpec {
        EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn spec(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> FlowSpec {
        FlowSpec { nodes, edges }
    }

    #[test]
    fn linear_chain_yields_one_node_per_level() {
        let s = spec(
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );
        let levels = level_schedule(&s).unwrap();
        assert_eq!(levels, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_yields_three_levels_with_parallel_middle() {
        let s = spec(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![
                edge("a", "b"),
                edge("a", "c"),
                edge("b", "d"),
                edge("c", "d"),
            ],
        );
        let levels = level_schedule(&s).unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a"]);
        assert_eq!(levels[1], vec!["b", "c"]);
        assert_eq!(levels[2], vec!["d"]);
    }

    #[test]
    fn independent_nodes_share_level_zero() {
        let s = spec(vec![node("x"), node("y"), node("z")], vec![]);
        let levels = level_schedule(&s).unwrap();
        assert_eq!(levels, vec![vec!["x", "y", "z"]]);
    }

    #[test]
    fn every_edge_crosses_levels_forward() {
        let s = spec(
            vec![node("a"), node("b"), node("c"), node("d"), node("e")],
            vec![
                edge("a", "c"),
                edge("b", "c"),
                edge("c", "d"),
                edge("a", "e"),
                edge("d", "e"),
            ],
        );
        let levels = level_schedule(&s).unwrap();

        let level_of = |id: &str| -> usize {
            levels
                .iter()
                .position(|l| l.iter().any(|n| n == id))
                .unwrap()
        };
        // Each node appears exactly once
        assert_eq!(levels.iter().map(Vec::len).sum::<usize>(), 5);
        for (from, to) in [("a", "c"), ("b", "c"), ("c", "d"), ("a", "e"), ("d", "e")] {
            assert!(level_of(from) < level_of(to), "{from} -> {to}");
        }
    }

    #[test]
    fn empty_spec_is_rejected() {
        let s = spec(vec![], vec![]);
        let err = level_schedule(&s).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let s = spec(vec![node("a")], vec![edge("a", "ghost")]);
        let err = level_schedule(&s).unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let s = spec(vec![node("a"), node("a")], vec![]);
        let err = level_schedule(&s).unwrap_err();
        assert!(err.to_string().contains("Duplicate node id"));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let s = spec(
            vec![node("a"), node("b")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        let err = level_schedule(&s).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_loop_is_rejected() {
        let s = spec(vec![node("a")], vec![edge("a", "a")]);
        let err = level_schedule(&s).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
