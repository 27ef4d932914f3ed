/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::graph::{Automaton, OutputId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Merges output records with identical `(content, next)` into a single
/// record, redirecting all references, and iterates to a fixed point.
///
/// Chains collapse bottom-up: once two tails are merged, the records
/// pointing at them become identical and merge in the next round. The
/// pass is idempotent, and merged-away records simply become unreferenced
/// (compilation never emits them).
///
/// Returns the number of records merged away.
pub fn deduplicate_outputs(automaton: &mut Automaton) -> usize {
    let mut merged = 0;
    loop {
        let mut canonical: HashMap<(Vec<u8>, Option<OutputId>), OutputId> = HashMap::new();
        let mut remap: Vec<Option<OutputId>> = vec![None; automaton.num_outputs()];
        let mut changed = false;
        for id in automaton.output_ids() {
            let output = automaton.output(id);
            let key = (output.content().to_vec(), output.next());
            match canonical.entry(key) {
                Entry::Occupied(entry) => {
                    remap[id.index()] = Some(*entry.get());
                    changed = true;
                    merged += 1;
                }
                Entry::Vacant(entry) => {
                    entry.insert(id);
                }
            }
        }
        if !changed {
            break;
        }

        let nodes: Vec<_> = automaton.node_ids().collect();
        for node in nodes {
            if let Some(first) = automaton.node(node).first_output() {
                if let Some(new) = remap[first.index()] {
                    automaton.node_mut(node).set_first_output(Some(new));
                }
            }
        }
        let outputs: Vec<_> = automaton.output_ids().collect();
        for id in outputs {
            if let Some(next) = automaton.output(id).next() {
                if let Some(new) = remap[next.index()] {
                    automaton.output_mut(id).set_next(Some(new));
                }
            }
        }
    }
    if merged > 0 {
        log::info!("deduplicate_outputs merged {} output records", merged);
    }
    merged
}

#[cfg(test)]
mod test {
    use super::*;

    /// Contents of a node's chain, in order.
    fn chain(automaton: &Automaton, node: crate::graph::NodeId) -> Vec<Vec<u8>> {
        automaton
            .output_chain(automaton.node(node).first_output())
            .map(|id| automaton.output(id).content().to_vec())
            .collect()
    }

    #[test]
    fn test_parallel_chains_collapse() {
        let mut aut = Automaton::new();
        let a = aut.add_node();
        let b = aut.add_node();
        // Two structurally identical chains built from separate records.
        let tail_a = aut.add_output(b"tail".to_vec(), None);
        let head_a = aut.add_output(b"head".to_vec(), Some(tail_a));
        let tail_b = aut.add_output(b"tail".to_vec(), None);
        let head_b = aut.add_output(b"head".to_vec(), Some(tail_b));
        aut.node_mut(a).set_first_output(Some(head_a));
        aut.node_mut(b).set_first_output(Some(head_b));

        let merged = deduplicate_outputs(&mut aut);
        assert_eq!(merged, 2);
        assert_eq!(
            aut.node(a).first_output(),
            aut.node(b).first_output(),
            "both nodes must share one canonical chain"
        );
        assert_eq!(chain(&aut, a), vec![b"head".to_vec(), b"tail".to_vec()]);
    }

    #[test]
    fn test_idempotent() {
        let mut aut = Automaton::new();
        let a = aut.add_node();
        let t1 = aut.add_output(b"x".to_vec(), None);
        let t2 = aut.add_output(b"x".to_vec(), None);
        let h = aut.add_output(b"y".to_vec(), Some(t1));
        aut.node_mut(a).set_first_output(Some(h));
        let _ = t2;

        assert!(deduplicate_outputs(&mut aut) > 0);
        let snapshot = aut.clone();
        assert_eq!(deduplicate_outputs(&mut aut), 0);
        assert_eq!(aut, snapshot);
    }

    #[test]
    fn test_distinct_contents_survive() {
        let mut aut = Automaton::new();
        let a = aut.add_node();
        let t = aut.add_output(b"one".to_vec(), None);
        let h = aut.add_output(b"two".to_vec(), Some(t));
        aut.node_mut(a).set_first_output(Some(h));
        assert_eq!(deduplicate_outputs(&mut aut), 0);
        assert_eq!(chain(&aut, a), vec![b"two".to_vec(), b"one".to_vec()]);
    }
}
