/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Aho-Corasick generator.
//!
//! [`AcBuilder`] constructs an intermediate automaton in two phases. The
//! add calls grow a goto trie: plain byte strings extend a path of
//! single-value advancing edges, while patterns (see [`pattern`]) carry a
//! byte set per position and may have to *split* existing edges whose
//! value sets only partially overlap a position. [`finish`](AcBuilder::finish)
//! then computes the failure transitions as non-advancing default targets
//! and merges output chains along them, producing an automaton that
//! reports, at every input position, all keywords ending there.
//!
//! Splitting an edge deep-copies the subtrie (outputs included) below it,
//! so that the two value subsets can evolve independently; the same
//! mechanism resolves pattern edges whose bytes disagree on a failure
//! target, which guarantees that after `finish` every tree edge has a
//! single failure target.

pub mod pattern;

use crate::graph::{Automaton, Edge, NodeId, OutputId};
use crate::utils::ByteSet;
use anyhow::{ensure, Result};
use dsi_progress_logger::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Builder for Aho-Corasick automata.
///
/// Construction is the *begin* step of the generator protocol; the add
/// calls may be freely interleaved, except that plain strings cannot be
/// added once a pattern has been added; [`finish`](AcBuilder::finish)
/// consumes the builder, so no call can follow it.
///
/// # Examples
///
/// ```
/// use ironautomata::ac::AcBuilder;
///
/// let mut builder = AcBuilder::new();
/// builder.add(b"he").unwrap();
/// builder.add(b"she").unwrap();
/// builder.add_pattern(r"h\dr", b"h-digit-r").unwrap();
/// let automaton = builder.finish().unwrap();
/// assert!(automaton.no_advance_no_output());
/// ```
pub struct AcBuilder {
    automaton: Automaton,
    /// Tail of each node's own output chain; needed to append a failure
    /// target's chain in O(1). Nodes sharing a whole chain have no entry,
    /// they never append.
    last_output: HashMap<NodeId, OutputId>,
    have_patterns: bool,
}

impl AcBuilder {
    /// Starts a new generation.
    pub fn new() -> Self {
        Self {
            automaton: Automaton::new(),
            last_output: HashMap::new(),
            have_patterns: false,
        }
    }

    /// Adds a keyword whose output content is the keyword itself.
    pub fn add(&mut self, keyword: &[u8]) -> Result<()> {
        self.add_string(keyword, keyword.to_vec())
    }

    /// Adds a keyword whose output content is the keyword length as a
    /// 4-byte little-endian integer.
    ///
    /// Little-endian is the canonical order for length outputs; consumers
    /// decoding them (such as the engine driver) rely on it regardless of
    /// the endianness the automaton was compiled with.
    pub fn add_length(&mut self, keyword: &[u8]) -> Result<()> {
        let length = u32::try_from(keyword.len())?;
        self.add_string(keyword, length.to_le_bytes().to_vec())
    }

    /// Adds a pattern (see [`pattern`] for the syntax) with caller-chosen
    /// output content.
    pub fn add_pattern(&mut self, pattern_text: &str, content: &[u8]) -> Result<()> {
        let positions = pattern::parse(pattern_text)?;
        ensure!(!positions.is_empty(), "empty pattern");
        for set in &positions {
            ensure!(!set.is_empty(), "pattern position matches no byte");
        }
        self.have_patterns = true;

        // Frontier of parallel traversals: a position matched by several
        // existing edges continues below each of them.
        let mut frontier = vec![self.automaton.start()];
        for set in &positions {
            let mut next = Vec::new();
            for k in 0..frontier.len() {
                self.extend_position(frontier[k], set, &mut next);
            }
            frontier = next;
        }
        for node in frontier {
            self.prepend(node, content.to_vec());
        }
        Ok(())
    }

    /// Finishes generation: computes failure transitions and merges
    /// outputs, returning the automaton.
    pub fn finish(mut self) -> Result<Automaton> {
        let start = self.automaton.start();
        self.automaton.node_mut(start).set_default(start, true);
        self.automaton.set_no_advance_no_output(true);

        let mut pl = progress_logger![item_name = "node"];
        pl.start("Computing failure transitions...");

        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(parent) = queue.pop_front() {
            pl.update();
            // Splits append edges past this count; their targets are
            // handled inline, so only the original edges are walked.
            let original_edges = self.automaton.node(parent).edges().len();
            for i in 0..original_edges {
                self.fail_edge(parent, i, &mut queue);
            }
        }
        pl.done();

        Ok(self.automaton)
    }

    /// Extends the trie below `node` by one pattern position, pushing the
    /// resulting frontier nodes onto `next`.
    fn extend_position(&mut self, node: NodeId, set: &ByteSet, next: &mut Vec<NodeId>) {
        let mut remaining = *set;
        let mut i = 0;
        while i < self.automaton.node(node).edges().len() && !remaining.is_empty() {
            let (values, target, advance) = {
                let edge = &self.automaton.node(node).edges()[i];
                let values = if edge.is_epsilon() {
                    ByteSet::full()
                } else {
                    edge.byte_set()
                };
                (values, edge.target(), edge.advance())
            };
            let overlap = remaining.intersection(&values);
            if overlap.is_empty() {
                i += 1;
                continue;
            }
            if overlap == values {
                // The position covers the whole edge: follow it as is.
                next.push(target);
            } else {
                // Partial overlap: the overlapping subset becomes a new
                // edge over a deep copy of the subtrie, the original edge
                // keeps the difference.
                let copy = self.deep_copy_subtrie(target);
                let mut kept = values;
                kept.difference_with(&overlap);
                self.automaton.node_mut(node).edges_mut()[i].assign_set(&kept);
                self.automaton
                    .node_mut(node)
                    .edges_mut()
                    .push(Edge::from_byte_set(copy, advance, &overlap));
                next.push(copy);
            }
            remaining.difference_with(&overlap);
            i += 1;
        }
        if !remaining.is_empty() {
            let new_node = self.automaton.add_node();
            self.automaton
                .node_mut(node)
                .edges_mut()
                .push(Edge::from_byte_set(new_node, true, &remaining));
            next.push(new_node);
        }
    }

    /// Resolves the failure transition of the node below edge `i` of
    /// `parent`, splitting the edge when its bytes disagree on the
    /// failure target.
    fn fail_edge(&mut self, parent: NodeId, i: usize, queue: &mut VecDeque<NodeId>) {
        let (values, child, advance) = {
            let edge = &self.automaton.node(parent).edges()[i];
            (edge.byte_set(), edge.target(), edge.advance())
        };

        // Group the edge's bytes by failure target, in first-byte order.
        let mut groups: Vec<(NodeId, ByteSet)> = Vec::new();
        for c in values.iter() {
            let target = self.failure_target(parent, c);
            match groups.iter_mut().find(|(t, _)| *t == target) {
                Some((_, set)) => {
                    set.insert(c);
                }
                None => {
                    let mut set = ByteSet::new();
                    set.insert(c);
                    groups.push((target, set));
                }
            }
        }

        let mut resolved: Vec<(NodeId, NodeId)> = Vec::new();
        if groups.len() == 1 {
            resolved.push((child, groups[0].0));
        } else {
            for (k, (fail_target, set)) in groups.iter().enumerate() {
                if k == 0 {
                    // The first group keeps the original edge and subtrie.
                    self.automaton.node_mut(parent).edges_mut()[i].assign_set(set);
                    resolved.push((child, *fail_target));
                } else {
                    let copy = self.deep_copy_subtrie(child);
                    self.automaton
                        .node_mut(parent)
                        .edges_mut()
                        .push(Edge::from_byte_set(copy, advance, set));
                    resolved.push((copy, *fail_target));
                }
            }
        }

        for (node, fail_target) in resolved {
            self.automaton.node_mut(node).set_default(fail_target, false);
            self.append_failure_outputs(node, fail_target);
            queue.push_back(node);
        }
    }

    /// Walks `parent`'s default chain for the node whose edges cover `c`;
    /// children of the start node fail to the start node itself.
    fn failure_target(&self, parent: NodeId, c: u8) -> NodeId {
        let start = self.automaton.start();
        if parent == start {
            return start;
        }
        let mut node = self.automaton.node(parent).default_target().unwrap_or(start);
        loop {
            if let Some(edge) = self
                .automaton
                .node(node)
                .edges()
                .iter()
                .find(|e| e.matches(c))
            {
                return edge.target();
            }
            if node == start {
                return start;
            }
            node = self.automaton.node(node).default_target().unwrap_or(start);
        }
    }

    /// Appends the failure target's output chain to `node`'s chain.
    ///
    /// Each node appends at most once, so chains stay acyclic even though
    /// tails end up shared across nodes.
    fn append_failure_outputs(&mut self, node: NodeId, fail_target: NodeId) {
        let Some(fail_first) = self.automaton.node(fail_target).first_output() else {
            return;
        };
        match self.automaton.node(node).first_output() {
            None => {
                // No chain of its own: share the failure chain outright.
                self.automaton
                    .node_mut(node)
                    .set_first_output(Some(fail_first));
            }
            Some(_) => {
                let last = self.last_output[&node];
                debug_assert!(self.automaton.output(last).next().is_none());
                self.automaton.output_mut(last).set_next(Some(fail_first));
            }
        }
    }

    /// Walks and extends the trie with a plain byte string.
    fn add_string(&mut self, keyword: &[u8], content: Vec<u8>) -> Result<()> {
        ensure!(
            !self.have_patterns,
            "cannot add a string after a pattern has been added"
        );
        ensure!(!keyword.is_empty(), "empty keyword");

        let mut node = self.automaton.start();
        let mut i = 0;
        while i < keyword.len() {
            let c = keyword[i];
            let existing = self
                .automaton
                .node(node)
                .edges()
                .iter()
                .find(|e| e.matches(c))
                .map(|e| e.target());
            match existing {
                Some(target) => {
                    node = target;
                    i += 1;
                }
                None => break,
            }
        }
        for &c in &keyword[i..] {
            let next = self.automaton.add_node();
            self.automaton
                .node_mut(node)
                .edges_mut()
                .push(Edge::single(next, true, c));
            node = next;
        }
        self.prepend(node, content);
        Ok(())
    }

    /// Prepends an output to a node's chain, tracking the chain tail.
    fn prepend(&mut self, node: NodeId, content: Vec<u8>) {
        let had_outputs = self.automaton.node(node).first_output().is_some();
        let id = self.automaton.prepend_output(node, content);
        if !had_outputs {
            self.last_output.insert(node, id);
        }
    }

    /// Deep-copies the subtrie rooted at `src`, outputs included, and
    /// returns the copy's root.
    fn deep_copy_subtrie(&mut self, src: NodeId) -> NodeId {
        let root = self.copy_node(src);
        let mut stack = vec![(src, root)];
        while let Some((old, new)) = stack.pop() {
            let edges = self.automaton.node(old).edges().to_vec();
            for edge in edges {
                let child = self.copy_node(edge.target());
                stack.push((edge.target(), child));
                let mut copied = edge;
                copied.set_target(child);
                self.automaton.node_mut(new).edges_mut().push(copied);
            }
        }
        root
    }

    /// Copies a single node with a fresh copy of its output chain, but
    /// without its edges.
    fn copy_node(&mut self, src: NodeId) -> NodeId {
        let new = self.automaton.add_node();
        let (first, default) = {
            let node = self.automaton.node(src);
            (
                node.first_output(),
                node.default_target().map(|d| (d, node.advance_on_default())),
            )
        };
        if let Some((target, advance)) = default {
            self.automaton.node_mut(new).set_default(target, advance);
        }
        if let Some(first) = first {
            let (head, tail) = self.copy_output_chain(first);
            self.automaton.node_mut(new).set_first_output(Some(head));
            self.last_output.insert(new, tail);
        }
        new
    }

    /// Copies an output chain, returning its new head and tail.
    fn copy_output_chain(&mut self, first: OutputId) -> (OutputId, OutputId) {
        let contents: Vec<Vec<u8>> = self
            .automaton
            .output_chain(Some(first))
            .map(|id| self.automaton.output(id).content().to_vec())
            .collect();
        let mut next = None;
        let mut tail = None;
        for content in contents.into_iter().rev() {
            let id = self.automaton.add_output(content, next);
            if tail.is_none() {
                tail = Some(id);
            }
            next = Some(id);
        }
        // The chain is non-empty, both ends exist.
        (next.unwrap(), tail.unwrap())
    }
}

impl Default for AcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Collects `(end_position, content)` matches by simulating the
    /// intermediate automaton directly.
    fn run(automaton: &Automaton, text: &[u8]) -> Vec<(usize, Vec<u8>)> {
        let mut matches = Vec::new();
        let mut node = automaton.start();
        let mut pos = 0;
        while pos < text.len() {
            let c = text[pos];
            let transitions = automaton.targets_for(node, c);
            let Some(&(target, advance)) = transitions.first() else {
                break;
            };
            if advance {
                pos += 1;
            }
            node = target;
            if !(automaton.no_advance_no_output() && !advance) {
                for id in automaton.output_chain(automaton.node(node).first_output()) {
                    matches.push((pos, automaton.output(id).content().to_vec()));
                }
            }
        }
        matches.sort();
        matches
    }

    #[test]
    fn test_classical_keywords() {
        let mut builder = AcBuilder::new();
        for word in ["he", "she", "his", "hers"] {
            builder.add(word.as_bytes()).unwrap();
        }
        let automaton = builder.finish().unwrap();
        let matches = run(&automaton, b"ushers");
        assert_eq!(
            matches,
            vec![
                (4, b"he".to_vec()),
                (4, b"she".to_vec()),
                (6, b"hers".to_vec()),
            ]
        );
    }

    #[test]
    fn test_overlapping_self_matches() {
        let mut builder = AcBuilder::new();
        for word in ["a", "aa", "aaa"] {
            builder.add(word.as_bytes()).unwrap();
        }
        let automaton = builder.finish().unwrap();
        let matches = run(&automaton, b"aaaa");
        let count = |needle: &[u8]| matches.iter().filter(|(_, m)| m == needle).count();
        assert_eq!(count(b"a"), 4);
        assert_eq!(count(b"aa"), 3);
        assert_eq!(count(b"aaa"), 2);
    }

    #[test]
    fn test_add_length_content() {
        let mut builder = AcBuilder::new();
        builder.add_length(b"word").unwrap();
        let automaton = builder.finish().unwrap();
        let matches = run(&automaton, b"word");
        assert_eq!(matches, vec![(4, 4u32.to_le_bytes().to_vec())]);
    }

    #[test]
    fn test_pattern_splits_shared_prefix() {
        let mut builder = AcBuilder::new();
        builder.add(b"ab").unwrap();
        builder.add_pattern(r"a\l", b"a-lower").unwrap();
        let automaton = builder.finish().unwrap();

        // "ab" matches both the plain keyword and the pattern.
        let matches = run(&automaton, b"ab");
        assert!(matches.contains(&(2, b"ab".to_vec())));
        assert!(matches.contains(&(2, b"a-lower".to_vec())));
        // "ac" matches only the pattern.
        let matches = run(&automaton, b"ac");
        assert_eq!(matches, vec![(2, b"a-lower".to_vec())]);
        // "aC" matches nothing.
        assert!(run(&automaton, b"aC").is_empty());
    }

    #[test]
    fn test_no_strings_after_patterns() {
        let mut builder = AcBuilder::new();
        builder.add(b"early").unwrap();
        builder.add_pattern(r"\d", b"digit").unwrap();
        assert!(builder.add(b"late").is_err());
        // More patterns are still fine.
        assert!(builder.add_pattern(r"\u", b"upper").is_ok());
    }

    #[test]
    fn test_start_node_self_default() {
        let automaton = AcBuilder::new().finish().unwrap();
        let start = automaton.start();
        assert_eq!(automaton.node(start).default_target(), Some(start));
        assert!(automaton.node(start).advance_on_default());
        assert!(automaton.no_advance_no_output());
    }
}
