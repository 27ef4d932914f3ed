/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{TAG_AUTOMATON, TAG_END, TAG_METADATA, TAG_NODE, TAG_OUTPUT};
use crate::graph::{Automaton, NodeId, OutputId};
use anyhow::{ensure, Context, Result};
use dsi_bitstream::prelude::*;
use std::io::Write;

/// Writes an automaton as a chunked intermediate stream.
///
/// The writer assumes a structurally valid graph and aborts on dangling
/// references. Node and output identifiers are the arena indices plus one
/// (identifier 0 is reserved), so writing and re-reading a graph
/// reproduces it arena-for-arena.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    chunk_size: Option<usize>,
}

/// One record of the stream, in emission order.
enum Record {
    Automaton,
    Metadata(String, String),
    Node(NodeId),
    Output(OutputId),
}

type PayloadWriter<'a> = BufBitWriter<BE, WordAdapter<u32, &'a mut Vec<u8>>>;

impl Writer {
    pub fn new() -> Self {
        Self { chunk_size: None }
    }

    /// Bounds the number of node plus output records per chunk.
    ///
    /// The automaton and metadata records always travel in the first
    /// chunk and do not count towards the bound.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// Writes `automaton` to `write` as one or more chunks.
    pub fn write<W: Write>(&self, automaton: &Automaton, mut write: W) -> Result<()> {
        self.check_references(automaton)?;

        let mut records = Vec::with_capacity(
            1 + automaton.metadata().len() + automaton.num_nodes() + automaton.num_outputs(),
        );
        records.push(Record::Automaton);
        for (key, value) in automaton.metadata() {
            records.push(Record::Metadata(key.clone(), value.clone()));
        }
        for node in automaton.node_ids() {
            records.push(Record::Node(node));
        }
        for output in automaton.output_ids() {
            records.push(Record::Output(output));
        }

        let mut iter = records.into_iter().peekable();
        while iter.peek().is_some() {
            let mut payload = Vec::new();
            {
                let mut bits = <BufBitWriter<BE, _>>::new(<WordAdapter<u32, _>>::new(&mut payload));
                let mut in_chunk = 0;
                while let Some(record) = iter.peek() {
                    let counted = matches!(record, Record::Node(_) | Record::Output(_));
                    if counted && self.chunk_size.is_some_and(|bound| in_chunk >= bound) {
                        break;
                    }
                    match iter.next().unwrap() {
                        Record::Automaton => self.write_automaton(&mut bits, automaton)?,
                        Record::Metadata(key, value) => {
                            self.write_metadata(&mut bits, &key, &value)?
                        }
                        Record::Node(node) => self.write_node(&mut bits, automaton, node)?,
                        Record::Output(output) => {
                            self.write_output(&mut bits, automaton, output)?
                        }
                    }
                    if counted {
                        in_chunk += 1;
                    }
                }
                bits.write_gamma(TAG_END)?;
                dsi_bitstream::traits::BitWrite::flush(&mut bits)
                    .context("Could not flush chunk payload")?;
            }
            let length = u32::try_from(payload.len()).context("chunk payload too large")?;
            write.write_all(&length.to_be_bytes())?;
            write.write_all(&payload)?;
        }
        Ok(())
    }

    fn check_references(&self, automaton: &Automaton) -> Result<()> {
        let num_nodes = automaton.num_nodes();
        let num_outputs = automaton.num_outputs();
        for id in automaton.node_ids() {
            let node = automaton.node(id);
            if let Some(first) = node.first_output() {
                ensure!(
                    first.index() < num_outputs,
                    "node {} references dangling output {}",
                    id,
                    first
                );
            }
            if let Some(default) = node.default_target() {
                ensure!(
                    default.index() < num_nodes,
                    "node {} has dangling default target {}",
                    id,
                    default
                );
            }
            for edge in node.edges() {
                ensure!(
                    edge.target().index() < num_nodes,
                    "node {} has an edge to dangling node {}",
                    id,
                    edge.target()
                );
            }
        }
        for id in automaton.output_ids() {
            if let Some(next) = automaton.output(id).next() {
                ensure!(
                    next.index() < num_outputs,
                    "output {} references dangling output {}",
                    id,
                    next
                );
            }
        }
        Ok(())
    }

    fn write_automaton(&self, bits: &mut PayloadWriter<'_>, automaton: &Automaton) -> Result<()> {
        bits.write_gamma(TAG_AUTOMATON)?;
        bits.write_bits(u64::from(automaton.no_advance_no_output()), 1)?;
        bits.write_gamma(node_id(automaton.start()))?;
        Ok(())
    }

    fn write_metadata(&self, bits: &mut PayloadWriter<'_>, key: &str, value: &str) -> Result<()> {
        bits.write_gamma(TAG_METADATA)?;
        for part in [key, value] {
            bits.write_gamma(part.len() as u64)?;
            for &byte in part.as_bytes() {
                bits.write_bits(u64::from(byte), 8)?;
            }
        }
        Ok(())
    }

    fn write_node(&self, bits: &mut PayloadWriter<'_>, automaton: &Automaton, id: NodeId) -> Result<()> {
        let node = automaton.node(id);
        bits.write_gamma(TAG_NODE)?;
        bits.write_gamma(node_id(id))?;
        match node.first_output() {
            Some(first) => {
                bits.write_bits(1, 1)?;
                bits.write_gamma(output_id(first))?;
            }
            None => {
                bits.write_bits(0, 1)?;
            }
        }
        match node.default_target() {
            Some(default) => {
                bits.write_bits(1, 1)?;
                bits.write_gamma(node_id(default))?;
                bits.write_bits(u64::from(node.advance_on_default()), 1)?;
            }
            None => {
                bits.write_bits(0, 1)?;
            }
        }
        bits.write_gamma(node.edges().len() as u64)?;
        for edge in node.edges() {
            bits.write_gamma(node_id(edge.target()))?;
            bits.write_bits(u64::from(edge.advance()), 1)?;
            if edge.is_bitmap() {
                bits.write_bits(1, 1)?;
                for word in edge.byte_set().as_bytes().chunks(8) {
                    bits.write_bits(u64::from_be_bytes(word.try_into().unwrap()), 64)?;
                }
            } else {
                bits.write_bits(0, 1)?;
                bits.write_gamma(edge.size() as u64)?;
                for value in edge.values() {
                    bits.write_bits(u64::from(value), 8)?;
                }
            }
        }
        Ok(())
    }

    fn write_output(
        &self,
        bits: &mut PayloadWriter<'_>,
        automaton: &Automaton,
        id: OutputId,
    ) -> Result<()> {
        let output = automaton.output(id);
        bits.write_gamma(TAG_OUTPUT)?;
        bits.write_gamma(output_id(id))?;
        bits.write_gamma(output.next().map_or(0, output_id))?;
        bits.write_gamma(output.content().len() as u64)?;
        for &byte in output.content() {
            bits.write_bits(u64::from(byte), 8)?;
        }
        Ok(())
    }
}

/// External identifier of a node: arena index plus one.
fn node_id(id: NodeId) -> u64 {
    id.index() as u64 + 1
}

/// External identifier of an output: arena index plus one.
fn output_id(id: OutputId) -> u64 {
    id.index() as u64 + 1
}
