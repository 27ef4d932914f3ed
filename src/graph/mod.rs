/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The intermediate automaton graph.
//!
//! An [`Automaton`] owns its [`Node`]s and [`Output`]s in arenas and all
//! cross-references are typed indices. Failure links make the graph cyclic,
//! so index-based references replace any form of shared ownership: the
//! whole graph is dropped as one unit, and passes can never leave a
//! dangling pointer behind — at worst a dangling index, which the codec
//! validates when the graph crosses a process boundary.
//!
//! The graph is deliberately permissive: it can represent
//! non-deterministic transition relations (several edges of a node matching
//! the same byte) and nodes unreachable from the start node. Compilation
//! ignores unreachable nodes; the execution engine supports only
//! deterministic automata.

pub mod dot;
mod edge;

pub use edge::{Edge, EdgeValues, EdgeValuesIter, BITMAP_THRESHOLD};

use std::collections::BTreeMap;

/// Index of a node in its automaton's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the arena index.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an output in its automaton's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(pub(crate) u32);

impl OutputId {
    /// Returns the arena index.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for OutputId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An output record: opaque content plus an optional next output, forming
/// a forward chain.
///
/// Chains may share tails across nodes; the generator exploits this to
/// merge the outputs of a failure target into a node in constant time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    content: Vec<u8>,
    next: Option<OutputId>,
}

impl Output {
    /// Returns the content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns the next output in the chain.
    pub fn next(&self) -> Option<OutputId> {
        self.next
    }

    /// Sets the next output in the chain.
    pub fn set_next(&mut self, next: Option<OutputId>) {
        self.next = next;
    }
}

/// A node of the intermediate automaton.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    first_output: Option<OutputId>,
    default_target: Option<NodeId>,
    advance_on_default: bool,
    edges: Vec<Edge>,
}

impl Node {
    /// Returns the outgoing edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the outgoing edges for mutation.
    pub fn edges_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    /// Returns the head of the output chain.
    pub fn first_output(&self) -> Option<OutputId> {
        self.first_output
    }

    /// Sets the head of the output chain.
    pub fn set_first_output(&mut self, first: Option<OutputId>) {
        self.first_output = first;
    }

    /// Returns the default target, the transition taken when no edge
    /// matches.
    pub fn default_target(&self) -> Option<NodeId> {
        self.default_target
    }

    /// Returns whether the default transition consumes the input byte.
    pub fn advance_on_default(&self) -> bool {
        self.advance_on_default
    }

    /// Sets the default transition.
    pub fn set_default(&mut self, target: NodeId, advance: bool) {
        self.default_target = Some(target);
        self.advance_on_default = advance;
    }

    /// Removes the default transition.
    pub fn clear_default(&mut self) {
        self.default_target = None;
        self.advance_on_default = false;
    }
}

/// The intermediate automaton: a start node, global flags, metadata and
/// the node and output arenas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Automaton {
    nodes: Vec<Node>,
    outputs: Vec<Output>,
    start: NodeId,
    no_advance_no_output: bool,
    metadata: BTreeMap<String, String>,
}

impl Automaton {
    /// Creates an automaton with a fresh start node and no outputs.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            outputs: Vec::new(),
            start: NodeId(0),
            no_advance_no_output: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns the start node.
    #[inline(always)]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Returns the number of nodes, reachable or not.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of output records, referenced or not.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Returns whether outputs are suppressed after non-advancing
    /// transitions.
    pub fn no_advance_no_output(&self) -> bool {
        self.no_advance_no_output
    }

    /// Sets the output-suppression flag.
    pub fn set_no_advance_no_output(&mut self, value: bool) {
        self.no_advance_no_output = value;
    }

    /// Returns the automaton metadata.
    ///
    /// The key `"Output-Type"` is reserved: it declares how output content
    /// bytes are to be interpreted by generic consumers.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the automaton metadata for mutation.
    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        self.nodes.push(Node::default());
        id
    }

    /// Adds an output record and returns its id.
    pub fn add_output(&mut self, content: Vec<u8>, next: Option<OutputId>) -> OutputId {
        let id = OutputId(u32::try_from(self.outputs.len()).expect("output arena overflow"));
        self.outputs.push(Output { content, next });
        id
    }

    /// Returns a node by id.
    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a node by id, for mutation.
    #[inline(always)]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Returns an output by id.
    #[inline(always)]
    pub fn output(&self, id: OutputId) -> &Output {
        &self.outputs[id.index()]
    }

    /// Returns an output by id, for mutation.
    #[inline(always)]
    pub fn output_mut(&mut self, id: OutputId) -> &mut Output {
        &mut self.outputs[id.index()]
    }

    /// Returns an iterator over all node ids in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Returns an iterator over all output ids in arena order.
    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> {
        (0..self.outputs.len() as u32).map(OutputId)
    }

    /// Prepends a new output with the given content to a node's chain and
    /// returns its id.
    pub fn prepend_output(&mut self, node: NodeId, content: Vec<u8>) -> OutputId {
        let old = self.node(node).first_output();
        let id = self.add_output(content, old);
        self.node_mut(node).set_first_output(Some(id));
        id
    }

    /// Returns an iterator over the chain starting at `first`.
    pub fn output_chain(&self, first: Option<OutputId>) -> OutputChainIter<'_> {
        OutputChainIter {
            automaton: self,
            next: first,
        }
    }

    /// Returns the edges of `node` matching input byte `c`, in insertion
    /// order. Epsilon edges are included.
    pub fn edges_for(&self, node: NodeId, c: u8) -> impl Iterator<Item = &Edge> {
        self.node(node).edges().iter().filter(move |e| e.matches(c))
    }

    /// Returns `(target, advance)` for every edge of `node` matching `c`,
    /// falling back to the default transition when no edge matches.
    pub fn targets_for(&self, node: NodeId, c: u8) -> Vec<(NodeId, bool)> {
        let n = self.node(node);
        let targets: Vec<_> = n
            .edges()
            .iter()
            .filter(|e| e.matches(c))
            .map(|e| (e.target(), e.advance()))
            .collect();
        if targets.is_empty() {
            if let Some(default) = n.default_target() {
                return vec![(default, n.advance_on_default())];
            }
        }
        targets
    }

    /// Returns, for every input byte, the matching `(target, advance)`
    /// transitions of `node`.
    ///
    /// Semantically equivalent to 256 calls of
    /// [`targets_for`](Automaton::targets_for), but computed in a single
    /// pass over the edge list.
    pub fn targets_by_input(&self, node: NodeId) -> Vec<Vec<(NodeId, bool)>> {
        let n = self.node(node);
        let mut table: Vec<Vec<(NodeId, bool)>> = vec![Vec::new(); 256];
        for edge in n.edges() {
            let transition = (edge.target(), edge.advance());
            if edge.is_epsilon() {
                for entry in table.iter_mut() {
                    entry.push(transition);
                }
            } else {
                for c in edge.values() {
                    table[c as usize].push(transition);
                }
            }
        }
        if let Some(default) = n.default_target() {
            let transition = (default, n.advance_on_default());
            for entry in table.iter_mut() {
                if entry.is_empty() {
                    entry.push(transition);
                }
            }
        }
        table
    }
}

impl Default for Automaton {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over an output chain.
pub struct OutputChainIter<'a> {
    automaton: &'a Automaton,
    next: Option<OutputId>,
}

impl Iterator for OutputChainIter<'_> {
    type Item = OutputId;

    fn next(&mut self) -> Option<OutputId> {
        let id = self.next?;
        self.next = self.automaton.output(id).next();
        Some(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_targets_for_falls_back_to_default() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        aut.node_mut(start).edges_mut().push(Edge::single(a, true, b'x'));
        aut.node_mut(start).set_default(b, false);

        assert_eq!(aut.targets_for(start, b'x'), vec![(a, true)]);
        assert_eq!(aut.targets_for(start, b'y'), vec![(b, false)]);
    }

    #[test]
    fn test_targets_by_input_matches_targets_for() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        let b = aut.add_node();
        let c = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_values(a, true, vec![b'a', b'b']));
        aut.node_mut(start).edges_mut().push(Edge::epsilon(b, false));
        aut.node_mut(start).set_default(c, true);

        let table = aut.targets_by_input(start);
        assert_eq!(table.len(), 256);
        for input in 0..=255u8 {
            assert_eq!(table[input as usize], aut.targets_for(start, input));
        }
        // The epsilon edge matches everything, so the default is dead.
        assert_eq!(table[0], vec![(b, false)]);
        assert_eq!(table[b'a' as usize], vec![(a, true), (b, false)]);
    }

    #[test]
    fn test_output_chain_iteration() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let first = aut.prepend_output(start, b"one".to_vec());
        let second = aut.prepend_output(start, b"two".to_vec());
        let chain: Vec<_> = aut.output_chain(aut.node(start).first_output()).collect();
        assert_eq!(chain, vec![second, first]);
        assert_eq!(aut.output(chain[0]).content(), b"two");
        assert_eq!(aut.output(chain[1]).content(), b"one");
    }
}
