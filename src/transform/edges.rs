/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::graph::{Automaton, Edge, NodeId};
use crate::utils::ByteSet;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Canonicalizes the edge list of one node.
///
/// All edges with the same `(target, advance)` pair are merged into a
/// single edge carrying the union of their value sets (an epsilon edge
/// counts as all 256 values). Each union is stored in the cheaper
/// representation — vector below 32 values, bitmap from 32 up, an epsilon
/// edge at 256. When the edges jointly cover the whole alphabet with
/// pairwise-disjoint sets, the pair covering the most bytes is elided
/// entirely and becomes the node's default transition; the previous
/// default, unreachable at that point, is discarded.
///
/// The number of distinct `(target, advance)` pairs never increases. The
/// pass preserves per-byte transition semantics for deterministic
/// automata; overlapping value sets may see their match order change.
pub fn optimize_edges(automaton: &mut Automaton, node: NodeId) {
    if automaton.node(node).edges().is_empty() {
        return;
    }

    let mut order: Vec<(NodeId, bool)> = Vec::new();
    let mut sets: HashMap<(NodeId, bool), ByteSet> = HashMap::new();
    for edge in automaton.node(node).edges() {
        let key = (edge.target(), edge.advance());
        let set = if edge.is_epsilon() {
            ByteSet::full()
        } else {
            edge.byte_set()
        };
        match sets.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().union_with(&set),
            Entry::Vacant(entry) => {
                entry.insert(set);
                order.push(key);
            }
        }
    }

    let mut coverage = ByteSet::new();
    let mut total = 0;
    for key in &order {
        total += sets[key].len();
        coverage.union_with(&sets[key]);
    }

    // With disjoint full coverage the default never fires, so the largest
    // pair can move there and shed its value set.
    let mut default_key = None;
    if coverage.is_full() && total == 256 {
        let mut best: Option<((NodeId, bool), usize)> = None;
        for key in &order {
            let len = sets[key].len();
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((*key, len));
            }
        }
        default_key = best.map(|(key, _)| key);
    }

    let mut new_edges = Vec::new();
    for key in &order {
        if Some(*key) == default_key {
            continue;
        }
        let set = &sets[key];
        let edge = if set.is_full() {
            Edge::epsilon(key.0, key.1)
        } else {
            Edge::from_byte_set(key.0, key.1, set)
        };
        new_edges.push(edge);
    }

    let n = automaton.node_mut(node);
    *n.edges_mut() = new_edges;
    if let Some((target, advance)) = default_key {
        n.set_default(target, advance);
    }
}

/// Runs [`optimize_edges`] on every node of the automaton.
pub fn optimize_all_edges(automaton: &mut Automaton) {
    let nodes: Vec<_> = automaton.node_ids().collect();
    for node in nodes {
        optimize_edges(automaton, node);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_merges_same_pair() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        aut.node_mut(start).edges_mut().push(Edge::single(a, true, b'x'));
        aut.node_mut(start).edges_mut().push(Edge::single(a, true, b'y'));
        aut.node_mut(start).edges_mut().push(Edge::single(a, false, b'z'));

        optimize_edges(&mut aut, start);

        let edges = aut.node(start).edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].values().collect::<Vec<_>>(), vec![b'x', b'y']);
        assert!(edges[0].advance());
        assert_eq!(edges[1].values().collect::<Vec<_>>(), vec![b'z']);
        assert!(!edges[1].advance());
    }

    #[test]
    fn test_large_union_becomes_bitmap() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        for c in 0..40u8 {
            aut.node_mut(start).edges_mut().push(Edge::single(a, true, c));
        }
        optimize_edges(&mut aut, start);
        let edges = aut.node(start).edges();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].is_bitmap());
        assert_eq!(edges[0].size(), 40);
    }

    #[test]
    fn test_full_coverage_promotes_largest_to_default() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        let stale = aut.add_node();
        // b covers 0..=9, a covers everything else; a stale default that
        // can never fire is overwritten by the promotion.
        let mut big = ByteSet::full();
        for c in 0..10u8 {
            aut.node_mut(start).edges_mut().push(Edge::single(b, true, c));
            big.remove(c);
        }
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_byte_set(a, true, &big));
        aut.node_mut(start).set_default(stale, false);

        optimize_edges(&mut aut, start);

        let n = aut.node(start);
        assert_eq!(n.default_target(), Some(a));
        assert!(n.advance_on_default());
        assert_eq!(n.edges().len(), 1);
        assert_eq!(n.edges()[0].target(), b);
        assert_eq!(n.edges()[0].size(), 10);
        // Per-byte transitions are unchanged.
        for c in 0..=255u8 {
            let expected = if c < 10 { b } else { a };
            assert_eq!(aut.targets_for(start, c), vec![(expected, true)]);
        }
    }

    #[test]
    fn test_single_full_pair_becomes_default() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_byte_set(a, false, &ByteSet::full()));
        optimize_edges(&mut aut, start);
        let n = aut.node(start);
        assert!(n.edges().is_empty());
        assert_eq!(n.default_target(), Some(a));
        assert!(!n.advance_on_default());
    }

    #[test]
    fn test_overlapping_pairs_keep_default() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        let d = aut.add_node();
        // Both an epsilon edge and a labelled edge: coverage is full but
        // not disjoint, so nothing is promoted.
        aut.node_mut(start).edges_mut().push(Edge::epsilon(a, true));
        aut.node_mut(start).edges_mut().push(Edge::single(b, true, b'x'));
        aut.node_mut(start).set_default(d, false);

        optimize_edges(&mut aut, start);

        let n = aut.node(start);
        assert_eq!(n.default_target(), Some(d));
        assert_eq!(n.edges().len(), 2);
        assert!(n.edges()[0].is_epsilon());
    }
}
