/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::graph::{Automaton, Edge, NodeId};
use crate::utils::ByteSet;

/// How aggressively [`translate_nonadvancing`] rewrites the automaton.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslateVariant {
    /// Retarget an existing non-advancing edge only when every one of its
    /// bytes resolves to the same advancing transition. No edge is ever
    /// added.
    Conservative,
    /// Additionally split edges whose bytes resolve to different targets
    /// and materialize the resolutions of a non-advancing default as new
    /// advancing edges, even where that inflates the graph.
    Aggressive,
    /// Apply the aggressive rewrite per node, but keep it only where the
    /// node does not grow.
    Structural,
}

/// Result of chasing a byte through non-advancing transitions.
enum Resolution {
    /// The engine eventually takes an advancing transition into this node.
    Advance(NodeId),
    /// The engine runs out of transitions without consuming the byte.
    DeadEnd,
    /// The chain cannot be elided: an intermediate node would emit
    /// outputs, or the chain never advances.
    Blocked,
}

/// Replaces non-advancing transitions with the advancing transitions the
/// engine would eventually take, returning the number of rewrites.
///
/// For a non-advancing transition on byte `c` into node `t`, the engine
/// next processes `c` at `t`, and keeps doing so through further
/// non-advancing hops until some transition consumes `c`; the rewrite
/// jumps to that final target directly. Eliding the intermediate hops is
/// legal only when they emit nothing — either the automaton suppresses
/// outputs after non-advancing transitions (`no_advance_no_output`, which
/// the Aho-Corasick generator always sets), or every intermediate node is
/// output-free. A hop count larger than the node count means the chain
/// cycles without consuming; such bytes are left untouched, which also
/// bounds the pass: one visit per node, at most `num_nodes` hops per
/// byte.
pub fn translate_nonadvancing(automaton: &mut Automaton, variant: TranslateVariant) -> usize {
    let nodes: Vec<_> = automaton.node_ids().collect();
    let mut rewrites = 0;
    for node in nodes {
        match variant {
            TranslateVariant::Conservative => rewrites += conservative_node(automaton, node),
            TranslateVariant::Aggressive => {
                let (edges, default, count) = aggressive_node(automaton, node);
                if count > 0 {
                    apply(automaton, node, edges, default);
                    rewrites += count;
                }
            }
            TranslateVariant::Structural => {
                let (edges, default, count) = aggressive_node(automaton, node);
                if count > 0 && !grows(automaton, node, &edges, default) {
                    apply(automaton, node, edges, default);
                    rewrites += count;
                }
            }
        }
    }
    if rewrites > 0 {
        log::info!(
            "translate_nonadvancing ({:?}) performed {} rewrites",
            variant,
            rewrites
        );
    }
    rewrites
}

fn resolve(automaton: &Automaton, entry: NodeId, c: u8, suppressed: bool) -> Resolution {
    let mut node = entry;
    let mut hops = 0;
    loop {
        if !suppressed && automaton.node(node).first_output().is_some() {
            return Resolution::Blocked;
        }
        hops += 1;
        if hops > automaton.num_nodes() {
            // A non-advancing cycle.
            return Resolution::Blocked;
        }
        let n = automaton.node(node);
        let step = n
            .edges()
            .iter()
            .find(|e| e.matches(c))
            .map(|e| (e.target(), e.advance()))
            .or_else(|| n.default_target().map(|d| (d, n.advance_on_default())));
        match step {
            None => return Resolution::DeadEnd,
            Some((target, true)) => return Resolution::Advance(target),
            Some((target, false)) => node = target,
        }
    }
}

/// The edge's value set, with epsilon meaning every byte.
fn edge_bytes(edge: &Edge) -> ByteSet {
    if edge.is_epsilon() {
        ByteSet::full()
    } else {
        edge.byte_set()
    }
}

fn conservative_node(automaton: &mut Automaton, node: NodeId) -> usize {
    let suppressed = automaton.no_advance_no_output();
    let mut rewrites = 0;
    for i in 0..automaton.node(node).edges().len() {
        let (target, advance, bytes) = {
            let edge = &automaton.node(node).edges()[i];
            (edge.target(), edge.advance(), edge_bytes(edge))
        };
        if advance {
            continue;
        }
        let mut resolved: Option<NodeId> = None;
        let mut uniform = true;
        for c in bytes.iter() {
            match resolve(automaton, target, c, suppressed) {
                Resolution::Advance(u) => match resolved {
                    None => resolved = Some(u),
                    Some(v) if v == u => {}
                    Some(_) => {
                        uniform = false;
                        break;
                    }
                },
                _ => {
                    uniform = false;
                    break;
                }
            }
        }
        if uniform {
            if let Some(u) = resolved {
                let edge = &mut automaton.node_mut(node).edges_mut()[i];
                edge.set_target(u);
                edge.set_advance(true);
                rewrites += 1;
            }
        }
    }
    rewrites
}

/// Computes the aggressive rewrite of one node without applying it.
fn aggressive_node(
    automaton: &Automaton,
    node: NodeId,
) -> (Vec<Edge>, Option<(NodeId, bool)>, usize) {
    let suppressed = automaton.no_advance_no_output();
    let n = automaton.node(node);
    let mut new_edges = Vec::new();
    let mut covered = ByteSet::new();
    let mut rewrites = 0;

    for edge in n.edges() {
        let bytes = edge_bytes(edge);
        covered.union_with(&bytes);
        if edge.advance() {
            new_edges.push(edge.clone());
            continue;
        }
        let mut groups: Vec<(NodeId, ByteSet)> = Vec::new();
        let mut untranslated = ByteSet::new();
        for c in bytes.iter() {
            match resolve(automaton, edge.target(), c, suppressed) {
                Resolution::Advance(u) => match groups.iter_mut().find(|(t, _)| *t == u) {
                    Some((_, set)) => {
                        set.insert(c);
                    }
                    None => {
                        let mut set = ByteSet::new();
                        set.insert(c);
                        groups.push((u, set));
                    }
                },
                _ => {
                    untranslated.insert(c);
                }
            }
        }
        if groups.is_empty() {
            new_edges.push(edge.clone());
            continue;
        }
        if !untranslated.is_empty() {
            new_edges.push(Edge::from_byte_set(edge.target(), false, &untranslated));
        }
        for (target, set) in groups {
            new_edges.push(Edge::from_byte_set(target, true, &set));
            rewrites += 1;
        }
    }

    let mut new_default = n.default_target().map(|d| (d, n.advance_on_default()));
    if let Some((default, false)) = new_default {
        let mut uncovered = covered;
        uncovered.invert();
        if !uncovered.is_empty() {
            let mut groups: Vec<(NodeId, ByteSet)> = Vec::new();
            let mut droppable = true;
            for c in uncovered.iter() {
                match resolve(automaton, default, c, suppressed) {
                    Resolution::Advance(u) => match groups.iter_mut().find(|(t, _)| *t == u) {
                        Some((_, set)) => {
                            set.insert(c);
                        }
                        None => {
                            let mut set = ByteSet::new();
                            set.insert(c);
                            groups.push((u, set));
                        }
                    },
                    // Dead bytes end the execution whether the default is
                    // followed or absent.
                    Resolution::DeadEnd => {}
                    Resolution::Blocked => droppable = false,
                }
            }
            for (target, set) in &groups {
                new_edges.push(Edge::from_byte_set(*target, true, set));
                rewrites += 1;
            }
            if droppable && !groups.is_empty() {
                new_default = None;
                rewrites += 1;
            }
        }
    }

    (new_edges, new_default, rewrites)
}

fn grows(
    automaton: &Automaton,
    node: NodeId,
    new_edges: &[Edge],
    new_default: Option<(NodeId, bool)>,
) -> bool {
    let n = automaton.node(node);
    let old = n.edges().len() + usize::from(n.default_target().is_some());
    let new = new_edges.len() + usize::from(new_default.is_some());
    new > old
}

fn apply(
    automaton: &mut Automaton,
    node: NodeId,
    new_edges: Vec<Edge>,
    new_default: Option<(NodeId, bool)>,
) {
    let n = automaton.node_mut(node);
    *n.edges_mut() = new_edges;
    match new_default {
        Some((target, advance)) => n.set_default(target, advance),
        None => n.clear_default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A three-node chain: `start --x,nonadv--> hop --x,adv--> end`, where
    /// the engine needs two steps for one byte.
    fn chain_automaton() -> (Automaton, NodeId, NodeId) {
        let mut aut = Automaton::new();
        aut.set_no_advance_no_output(true);
        let start = aut.start();
        let hop = aut.add_node();
        let end = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::single(hop, false, b'x'));
        aut.node_mut(hop).edges_mut().push(Edge::single(end, true, b'x'));
        (aut, hop, end)
    }

    #[test]
    fn test_conservative_retargets_uniform_edge() {
        let (mut aut, _hop, end) = chain_automaton();
        let start = aut.start();
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Conservative),
            1
        );
        let edge = &aut.node(start).edges()[0];
        assert_eq!(edge.target(), end);
        assert!(edge.advance());
        // Nothing left to do.
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Conservative),
            0
        );
    }

    #[test]
    fn test_conservative_respects_intermediate_outputs() {
        let (mut aut, hop, _end) = chain_automaton();
        // Without output suppression, the hop node's output makes the
        // rewrite illegal.
        aut.set_no_advance_no_output(false);
        aut.prepend_output(hop, b"hop".to_vec());
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Conservative),
            0
        );
    }

    #[test]
    fn test_conservative_leaves_split_edges_alone() {
        let mut aut = Automaton::new();
        aut.set_no_advance_no_output(true);
        let start = aut.start();
        let hop = aut.add_node();
        let left = aut.add_node();
        let right = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_values(hop, false, vec![b'a', b'b']));
        aut.node_mut(hop).edges_mut().push(Edge::single(left, true, b'a'));
        aut.node_mut(hop)
            .edges_mut()
            .push(Edge::single(right, true, b'b'));

        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Conservative),
            0
        );
        // Aggressive splits the edge into one advancing edge per target.
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Aggressive),
            2
        );
        assert_eq!(aut.targets_for(start, b'a'), vec![(left, true)]);
        assert_eq!(aut.targets_for(start, b'b'), vec![(right, true)]);
    }

    #[test]
    fn test_aggressive_materializes_default() {
        let mut aut = Automaton::new();
        aut.set_no_advance_no_output(true);
        let start = aut.start();
        let fallback = aut.add_node();
        let target = aut.add_node();
        // Non-advancing default into a node that consumes everything.
        aut.node_mut(start).set_default(fallback, false);
        aut.node_mut(fallback)
            .edges_mut()
            .push(Edge::from_byte_set(target, true, &ByteSet::full()));

        let rewrites = translate_nonadvancing(&mut aut, TranslateVariant::Aggressive);
        // One materialized edge group plus the dropped default.
        assert_eq!(rewrites, 2);
        let n = aut.node(start);
        assert_eq!(n.default_target(), None);
        assert_eq!(aut.targets_for(start, 0), vec![(target, true)]);
        assert_eq!(aut.targets_for(start, 255), vec![(target, true)]);
    }

    #[test]
    fn test_structural_rejects_growth() {
        let mut aut = Automaton::new();
        aut.set_no_advance_no_output(true);
        let start = aut.start();
        let hop = aut.add_node();
        let left = aut.add_node();
        let right = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_values(hop, false, vec![b'a', b'b']));
        aut.node_mut(hop).edges_mut().push(Edge::single(left, true, b'a'));
        aut.node_mut(hop)
            .edges_mut()
            .push(Edge::single(right, true, b'b'));

        // Splitting one edge into two grows the node: structural refuses.
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Structural),
            0
        );
        assert_eq!(aut.node(start).edges().len(), 1);

        // A uniform chain does not grow: structural rewrites it.
        let (mut aut, _hop, end) = chain_automaton();
        let start = aut.start();
        assert_eq!(
            translate_nonadvancing(&mut aut, TranslateVariant::Structural),
            1
        );
        assert_eq!(aut.targets_for(start, b'x'), vec![(end, true)]);
    }

    #[test]
    fn test_nonadvancing_cycle_is_left_alone() {
        let mut aut = Automaton::new();
        aut.set_no_advance_no_output(true);
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        aut.node_mut(start).edges_mut().push(Edge::single(a, false, b'x'));
        aut.node_mut(a).edges_mut().push(Edge::single(b, false, b'x'));
        aut.node_mut(b).edges_mut().push(Edge::single(a, false, b'x'));

        for variant in [
            TranslateVariant::Conservative,
            TranslateVariant::Aggressive,
            TranslateVariant::Structural,
        ] {
            assert_eq!(translate_nonadvancing(&mut aut, variant), 0);
        }
    }
}
