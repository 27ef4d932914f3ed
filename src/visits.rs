/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Breadth-first traversal of the intermediate automaton.

use crate::graph::{Automaton, NodeId};
use itertools::Itertools;
use std::collections::VecDeque;
use sux::prelude::BitVec;

/// Visits every node reachable from the start node exactly once, in
/// breadth-first order.
///
/// The successors of a node are enqueued in edge-value order — an edge is
/// ranked by the smallest byte it matches, epsilon edges first — with the
/// default target last. This order is what gives the Eudoxus compiler its
/// deterministic identifier assignment.
pub fn breadth_first<F: FnMut(NodeId)>(automaton: &Automaton, mut callback: F) {
    let num_nodes = automaton.num_nodes();
    let mut visited = BitVec::new(num_nodes);
    let mut queue = VecDeque::new();

    let start = automaton.start();
    visited.set(start.index(), true);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        callback(current);

        let node = automaton.node(current);
        // Rank edges by their first matching byte, keeping insertion order
        // among ties; epsilon edges match byte 0.
        let order = node
            .edges()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let first = if e.is_epsilon() {
                    0
                } else {
                    e.values().next().unwrap() as u16
                };
                (first, i)
            })
            .sorted();

        for (_, i) in order {
            let target = node.edges()[i].target();
            if !visited[target.index()] {
                visited.set(target.index(), true);
                queue.push_back(target);
            }
        }
        if let Some(default) = node.default_target() {
            if !visited[default.index()] {
                visited.set(default.index(), true);
                queue.push_back(default);
            }
        }
    }
}

/// Returns the nodes reachable from the start node in breadth-first order.
pub fn bfs_order(automaton: &Automaton) -> Vec<NodeId> {
    let mut order = Vec::new();
    breadth_first(automaton, |node| order.push(node));
    order
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::Edge;

    #[test]
    fn test_bfs_order_values_then_default() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        let c = aut.add_node();
        let d = aut.add_node();
        // Insertion order deliberately differs from value order.
        aut.node_mut(start).edges_mut().push(Edge::single(b, true, b'z'));
        aut.node_mut(start).edges_mut().push(Edge::single(a, true, b'a'));
        aut.node_mut(start).set_default(c, false);
        aut.node_mut(a).edges_mut().push(Edge::single(d, true, b'x'));
        // A back edge must not revisit the start node.
        aut.node_mut(d).edges_mut().push(Edge::single(start, false, b'y'));

        assert_eq!(bfs_order(&aut), vec![start, a, b, c, d]);
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let mut aut = Automaton::new();
        let _orphan = aut.add_node();
        assert_eq!(bfs_order(&aut), vec![aut.start()]);
    }
}
