//! Property tests for wave layering.
//!
//! Random acyclic edge sets must always layer so that every node is placed
//! exactly once and every edge crosses from an earlier wave to a later one;
//! adding a back edge must always surface a cycle.

#[macro_use]
extern crate proptest;

use proptest::prelude::{Strategy, prop};
use pulseline::graph::{GraphError, plan_waves};
use rustc_hash::FxHashMap;

/// Node names n0..n{count-1} in registration order.
fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("n{i}")).collect()
}

/// Random forward-only edge sets over `count` nodes: an edge (i, j) with
/// i < j can never form a cycle.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|count| {
        let edges = prop::collection::vec(
            (0..count - 1).prop_flat_map(move |i| ((i + 1)..count).prop_map(move |j| (i, j))),
            0..20,
        );
        edges.prop_map(move |mut edges| {
            edges.sort_unstable();
            edges.dedup();
            (count, edges)
        })
    })
}

fn children_map(count: usize, edges: &[(usize, usize)]) -> FxHashMap<String, Vec<String>> {
    let names = names(count);
    let mut map: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for (i, j) in edges {
        map.entry(names[*i].clone())
            .or_default()
            .push(names[*j].clone());
    }
    map
}

proptest! {
    /// Every node is placed exactly once, and every edge goes from a
    /// strictly earlier wave to a later one.
    #[test]
    fn prop_waves_cover_all_nodes_and_respect_edges((count, edges) in dag_strategy()) {
        let order = names(count);
        let children = children_map(count, &edges);
        let waves = plan_waves(&order, &children).unwrap();

        let mut wave_of: FxHashMap<&str, usize> = FxHashMap::default();
        for (index, wave) in waves.iter().enumerate() {
            for name in wave {
                let previous = wave_of.insert(name.as_str(), index);
                prop_assert!(previous.is_none(), "node {} placed twice", name);
            }
        }
        prop_assert_eq!(wave_of.len(), count);

        let order_names = names(count);
        for (i, j) in &edges {
            let parent = wave_of[order_names[*i].as_str()];
            let child = wave_of[order_names[*j].as_str()];
            prop_assert!(parent < child, "edge ({}, {}) not layered", i, j);
        }
    }

    /// Nodes with no incoming edges always land in wave zero.
    #[test]
    fn prop_roots_land_in_wave_zero((count, edges) in dag_strategy()) {
        let order = names(count);
        let children = children_map(count, &edges);
        let waves = plan_waves(&order, &children).unwrap();

        let has_parent: Vec<bool> = (0..count)
            .map(|j| edges.iter().any(|(_, child)| *child == j))
            .collect();
        for (index, is_child) in has_parent.iter().enumerate() {
            if !is_child {
                prop_assert!(waves[0].contains(&order[index]));
            }
        }
    }

    /// Closing any forward chain with a back edge produces a cycle error.
    #[test]
    fn prop_back_edge_is_reported_as_cycle(
        (count, mut edges) in dag_strategy(),
        chain_len in 2usize..5,
    ) {
        let chain_len = chain_len.min(count);
        // Forward chain 0 -> 1 -> ... -> chain_len-1, closed back to 0.
        for i in 0..chain_len - 1 {
            edges.push((i, i + 1));
        }
        edges.sort_unstable();
        edges.dedup();

        let order = names(count);
        let mut children = children_map(count, &edges);
        children
            .entry(order[chain_len - 1].clone())
            .or_default()
            .push(order[0].clone());

        let err = plan_waves(&order, &children).unwrap_err();
        prop_assert!(
            matches!(err, GraphError::CycleDetected { .. }),
            "expected a cycle, got {:?}",
            err
        );
    }
}
