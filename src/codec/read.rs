/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    DecodeError, TAG_AUTOMATON, TAG_END, TAG_METADATA, TAG_NODE, TAG_OUTPUT,
};
use crate::graph::{Automaton, Edge, NodeId, OutputId, BITMAP_THRESHOLD};
use crate::reporter::{Reporter, Severity};
use crate::utils::ByteSet;
use dsi_bitstream::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

/// Reads an automaton from a chunked intermediate stream.
///
/// The reader keeps two bits of state queryable after a read: `success`
/// (the stream decoded into a graph) and `clean` (it did so without
/// warnings). Warnings and errors are also delivered through the
/// [`Reporter`] passed to [`read`](Reader::read).
#[derive(Clone, Debug)]
pub struct Reader {
    success: bool,
    clean: bool,
}

struct NodeRec {
    first_output: Option<u64>,
    default: Option<(u64, bool)>,
    edges: Vec<EdgeRec>,
}

struct EdgeRec {
    target: u64,
    advance: bool,
    values: ValuesRec,
}

enum ValuesRec {
    Vector(Vec<u8>),
    Bitmap(ByteSet),
}

struct OutRec {
    next: Option<u64>,
    content: Vec<u8>,
}

/// All records of a stream, keyed by external identifier.
#[derive(Default)]
struct Records {
    automaton: Option<(bool, u64)>,
    metadata: BTreeMap<String, String>,
    nodes: BTreeMap<u64, NodeRec>,
    outputs: BTreeMap<u64, OutRec>,
}

impl Reader {
    pub fn new() -> Self {
        Self {
            success: true,
            clean: true,
        }
    }

    /// Returns true if the last read decoded a graph.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Returns true if the last read decoded a graph without warnings.
    pub fn clean(&self) -> bool {
        self.clean
    }

    /// Reads a stream of chunks until end of input and materializes the
    /// automaton, reporting anomalies through `reporter`.
    pub fn read<R: Read>(
        &mut self,
        read: R,
        reporter: &mut dyn Reporter,
    ) -> Result<Automaton, DecodeError> {
        self.success = true;
        self.clean = true;
        match self.read_inner(read, reporter) {
            Ok(automaton) => Ok(automaton),
            Err(error) => {
                self.success = false;
                self.clean = false;
                reporter.report(Severity::Error, "reader", &error.to_string());
                Err(error)
            }
        }
    }

    fn read_inner<R: Read>(
        &mut self,
        mut read: R,
        reporter: &mut dyn Reporter,
    ) -> Result<Automaton, DecodeError> {
        let mut records = Records::default();
        loop {
            let mut length_bytes = [0u8; 4];
            let mut got = 0;
            while got < 4 {
                let n = read.read(&mut length_bytes[got..])?;
                if n == 0 {
                    break;
                }
                got += n;
            }
            if got == 0 {
                break;
            }
            if got < 4 {
                return Err(DecodeError::TruncatedChunk { expected: 4 });
            }
            let length = u32::from_be_bytes(length_bytes) as usize;
            let mut payload = vec![0u8; length];
            read.read_exact(&mut payload)
                .map_err(|_| DecodeError::TruncatedChunk { expected: length })?;
            self.parse_chunk(&payload, &mut records, reporter)?;
        }
        self.materialize(records, reporter)
    }

    fn parse_chunk(
        &mut self,
        payload: &[u8],
        records: &mut Records,
        reporter: &mut dyn Reporter,
    ) -> Result<(), DecodeError> {
        let mut bits = BufBitReader::<BE, _>::new(<WordAdapter<u32, _>>::new(payload));
        loop {
            match read_gamma(&mut bits)? {
                TAG_END => return Ok(()),
                TAG_AUTOMATON => {
                    if records.automaton.is_some() {
                        return Err(DecodeError::DuplicateAutomaton);
                    }
                    let no_advance_no_output = read_bool(&mut bits)?;
                    let start = read_id(&mut bits)?;
                    records.automaton = Some((no_advance_no_output, start));
                }
                TAG_METADATA => {
                    let key = read_string(&mut bits)?;
                    let value = read_string(&mut bits)?;
                    records.metadata.insert(key, value);
                }
                TAG_NODE => {
                    let id = read_id(&mut bits)?;
                    let record = self.parse_node(&mut bits, id, reporter)?;
                    if records.nodes.contains_key(&id) {
                        self.warn(reporter, &format!("duplicate definition of node {}", id));
                    } else {
                        records.nodes.insert(id, record);
                    }
                }
                TAG_OUTPUT => {
                    let id = read_id(&mut bits)?;
                    let next = match read_gamma(&mut bits)? {
                        0 => None,
                        next => Some(next),
                    };
                    let content = read_bytes(&mut bits)?;
                    if records.outputs.contains_key(&id) {
                        self.warn(reporter, &format!("duplicate definition of output {}", id));
                    } else {
                        records.outputs.insert(id, OutRec { next, content });
                    }
                }
                tag => return Err(DecodeError::UnknownTag(tag)),
            }
        }
    }

    fn parse_node(
        &mut self,
        bits: &mut PayloadReader<'_>,
        id: u64,
        reporter: &mut dyn Reporter,
    ) -> Result<NodeRec, DecodeError> {
        let first_output = if read_bool(bits)? {
            Some(read_id(bits)?)
        } else {
            None
        };
        let default = if read_bool(bits)? {
            let target = read_id(bits)?;
            let advance = read_bool(bits)?;
            Some((target, advance))
        } else {
            None
        };
        let num_edges = read_gamma(bits)? as usize;
        let mut edges = Vec::with_capacity(num_edges);
        for _ in 0..num_edges {
            let target = read_id(bits)?;
            let advance = read_bool(bits)?;
            let values = if read_bool(bits)? {
                let mut bytes = [0u8; 32];
                for word in bytes.chunks_mut(8) {
                    word.copy_from_slice(&bits.read_bits(64).map_err(payload_error)?.to_be_bytes());
                }
                ValuesRec::Bitmap(ByteSet::from_bytes(bytes))
            } else {
                let length = read_gamma(bits)? as usize;
                if length >= BITMAP_THRESHOLD {
                    self.warn(
                        reporter,
                        &format!("node {} has a {}-value vector", id, length),
                    );
                }
                let mut values = Vec::with_capacity(length.min(256));
                for _ in 0..length {
                    values.push(bits.read_bits(8).map_err(payload_error)? as u8);
                }
                ValuesRec::Vector(values)
            };
            edges.push(EdgeRec {
                target,
                advance,
                values,
            });
        }
        Ok(NodeRec {
            first_output,
            default,
            edges,
        })
    }

    fn materialize(
        &mut self,
        records: Records,
        reporter: &mut dyn Reporter,
    ) -> Result<Automaton, DecodeError> {
        let (no_advance_no_output, start_external) = records.automaton.unwrap_or((false, 1));
        if !records.nodes.contains_key(&start_external) {
            return Err(DecodeError::Undefined {
                kind: "node",
                id: start_external,
            });
        }

        let mut automaton = Automaton::new();
        automaton.set_no_advance_no_output(no_advance_no_output);
        *automaton.metadata_mut() = records.metadata;

        let mut node_map: HashMap<u64, NodeId> = HashMap::new();
        node_map.insert(start_external, automaton.start());
        for &external in records.nodes.keys() {
            if external != start_external {
                node_map.insert(external, automaton.add_node());
            }
        }
        let mut output_map: HashMap<u64, OutputId> = HashMap::new();
        for (&external, record) in &records.outputs {
            output_map.insert(external, automaton.add_output(record.content.clone(), None));
        }

        let mut referenced_nodes: HashSet<u64> = HashSet::new();
        let mut referenced_outputs: HashSet<u64> = HashSet::new();

        for (&external, record) in &records.outputs {
            if let Some(next) = record.next {
                let target = *output_map.get(&next).ok_or(DecodeError::Undefined {
                    kind: "output",
                    id: next,
                })?;
                automaton
                    .output_mut(output_map[&external])
                    .set_next(Some(target));
                referenced_outputs.insert(next);
            }
        }

        for (&external, record) in &records.nodes {
            let id = node_map[&external];
            if let Some(first) = record.first_output {
                let target = *output_map.get(&first).ok_or(DecodeError::Undefined {
                    kind: "output",
                    id: first,
                })?;
                automaton.node_mut(id).set_first_output(Some(target));
                referenced_outputs.insert(first);
            }
            if let Some((default, advance)) = record.default {
                let target = *node_map.get(&default).ok_or(DecodeError::Undefined {
                    kind: "node",
                    id: default,
                })?;
                automaton.node_mut(id).set_default(target, advance);
                referenced_nodes.insert(default);
            }
            for edge in &record.edges {
                let target = *node_map.get(&edge.target).ok_or(DecodeError::Undefined {
                    kind: "node",
                    id: edge.target,
                })?;
                referenced_nodes.insert(edge.target);
                // Build the edge in the representation the stream used.
                let mut built = Edge::epsilon(target, edge.advance);
                match &edge.values {
                    ValuesRec::Vector(values) => {
                        for &value in values {
                            built.add(value);
                        }
                    }
                    ValuesRec::Bitmap(set) => {
                        built.switch_to_bitmap();
                        for value in set.iter() {
                            built.add(value);
                        }
                    }
                }
                automaton.node_mut(id).edges_mut().push(built);
            }
        }

        for &external in records.nodes.keys() {
            if external != start_external && !referenced_nodes.contains(&external) {
                self.warn(
                    reporter,
                    &format!("node {} is defined but never referenced", external),
                );
            }
        }
        for &external in records.outputs.keys() {
            if !referenced_outputs.contains(&external) {
                self.warn(
                    reporter,
                    &format!("output {} is defined but never referenced", external),
                );
            }
        }

        Ok(automaton)
    }

    fn warn(&mut self, reporter: &mut dyn Reporter, message: &str) {
        self.clean = false;
        reporter.report(Severity::Warning, "reader", message);
    }
}

impl Default for Reader {
    fn default() -> Self {
        Self::new()
    }
}

type PayloadReader<'a> = BufBitReader<BE, WordAdapter<u32, &'a [u8]>>;

fn payload_error(error: impl core::fmt::Display) -> DecodeError {
    DecodeError::Payload(error.to_string())
}

fn read_gamma(bits: &mut PayloadReader<'_>) -> Result<u64, DecodeError> {
    bits.read_gamma().map_err(payload_error)
}

fn read_bool(bits: &mut PayloadReader<'_>) -> Result<bool, DecodeError> {
    Ok(bits.read_bits(1).map_err(payload_error)? != 0)
}

fn read_id(bits: &mut PayloadReader<'_>) -> Result<u64, DecodeError> {
    match read_gamma(bits)? {
        0 => Err(DecodeError::ReservedId),
        id => Ok(id),
    }
}

fn read_bytes(bits: &mut PayloadReader<'_>) -> Result<Vec<u8>, DecodeError> {
    let length = read_gamma(bits)? as usize;
    // Bound the allocation by what the stream can actually hold.
    let mut bytes = Vec::with_capacity(length.min(1 << 20));
    for _ in 0..length {
        bytes.push(bits.read_bits(8).map_err(payload_error)? as u8);
    }
    Ok(bytes)
}

fn read_string(bits: &mut PayloadReader<'_>) -> Result<String, DecodeError> {
    String::from_utf8(read_bytes(bits)?)
        .map_err(|_| DecodeError::Payload("metadata is not UTF-8".into()))
}
