/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Graphviz rendering of the intermediate graph, for debugging.

use super::{Automaton, Edge};
use std::io::{Result, Write};

/// Writes `automaton` as a Graphviz digraph.
///
/// Nodes are labelled with their identifier and output contents; labelled
/// edges show their byte sets (non-advancing ones annotated), and default
/// transitions are dashed. Unreachable nodes are rendered too, since the
/// point of the dump is to see what is actually in the graph.
pub fn write_dot<W: Write>(automaton: &Automaton, mut write: W) -> Result<()> {
    writeln!(write, "digraph automaton {{")?;
    writeln!(write, "  rankdir=LR;")?;
    for id in automaton.node_ids() {
        let node = automaton.node(id);
        let mut label = format!("{}", id);
        for output in automaton.output_chain(node.first_output()) {
            label.push_str("\\n");
            label.push_str(&escape(automaton.output(output).content()));
        }
        let shape = if node.first_output().is_some() {
            "doublecircle"
        } else {
            "circle"
        };
        writeln!(write, "  n{} [label=\"{}\", shape={}];", id, label, shape)?;
        for edge in node.edges() {
            let annotation = if edge.advance() { "" } else { " [-]" };
            writeln!(
                write,
                "  n{} -> n{} [label=\"{}{}\"];",
                id,
                edge.target(),
                edge_label(edge),
                annotation
            )?;
        }
        if let Some(default) = node.default_target() {
            let annotation = if node.advance_on_default() { "" } else { " [-]" };
            writeln!(
                write,
                "  n{} -> n{} [style=dashed, label=\"default{}\"];",
                id, default, annotation
            )?;
        }
    }
    writeln!(write, "}}")
}

/// Compact value-set label: consecutive values collapse into ranges.
fn edge_label(edge: &Edge) -> String {
    if edge.is_epsilon() {
        return "*".into();
    }
    let values: Vec<u8> = edge.values().collect();
    let mut label = String::new();
    let mut i = 0;
    while i < values.len() {
        let mut j = i;
        while j + 1 < values.len() && values[j + 1] == values[j] + 1 {
            j += 1;
        }
        label.push_str(&escape(&values[i..i + 1]));
        if j > i + 1 {
            label.push('-');
        }
        if j > i {
            label.push_str(&escape(&values[j..j + 1]));
        }
        i = j + 1;
    }
    label
}

fn escape(bytes: &[u8]) -> String {
    let mut escaped = String::new();
    for &byte in bytes {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7E => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\\\x{:02x}", byte)),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dot_output_shape() {
        let mut aut = Automaton::new();
        let start = aut.start();
        let a = aut.add_node();
        aut.node_mut(start)
            .edges_mut()
            .push(Edge::from_values(a, true, vec![b'a', b'b', b'c', b'x']));
        aut.node_mut(a).set_default(start, false);
        aut.prepend_output(a, b"abc".to_vec());

        let mut out = Vec::new();
        write_dot(&aut, &mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph automaton {"));
        assert!(dot.contains("n0 -> n1 [label=\"a-cx\"]"));
        assert!(dot.contains("n1 -> n0 [style=dashed, label=\"default [-]\"]"));
        assert!(dot.contains("doublecircle"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
