/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    CompileError, Header, FLAG_ADVANCE_ON_DEFAULT, FLAG_HAS_DEFAULT, FLAG_HAS_NONADVANCING,
    FLAG_HAS_OUTPUT, HEADER_LEN, TYPE_HIGH, TYPE_LOW, TYPE_PC, VERSION,
};
use crate::graph::{Automaton, NodeId, OutputId};
use crate::utils::{id_fits, BufferAssembler, ByteSet};
use crate::visits::bfs_order;
use anyhow::Context;
use dsi_progress_logger::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Compiler configuration.
#[derive(Clone, Copy, Debug)]
pub struct CompileConfig {
    /// Identifier width in bytes: 1, 2, 4 or 8, or 0 to pick the smallest
    /// width that can address the compiled buffer.
    pub id_width: usize,
    /// Node records are padded so their data-section index is a multiple
    /// of this value; must be at least 1.
    pub align_to: usize,
    /// Multiplier on the high-degree record size in the per-node cost
    /// model: below 1 favours high-degree nodes, above 1 low-degree ones.
    pub high_node_weight: f64,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            id_width: 0,
            align_to: 1,
            high_node_weight: 1.0,
        }
    }
}

/// Statistics of a compilation.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileStats {
    /// Whole buffer, header and metadata included.
    pub total_bytes: usize,
    /// Data section only.
    pub data_bytes: usize,
    /// The identifier width used.
    pub id_width: usize,
    /// Number of identifier fields written.
    pub ids_used: usize,
    /// Alignment padding inserted before node records.
    pub padding_bytes: usize,
    pub low_nodes: usize,
    pub low_bytes: usize,
    pub high_nodes: usize,
    pub high_bytes: usize,
    pub pc_nodes: usize,
    pub pc_bytes: usize,
    pub outputs: usize,
    pub output_bytes: usize,
}

impl CompileStats {
    /// Node records of all types.
    pub fn nodes(&self) -> usize {
        self.low_nodes + self.high_nodes + self.pc_nodes
    }
}

impl core::fmt::Display for CompileStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "bytes: {}", self.total_bytes)?;
        writeln!(f, "id width: {}", self.id_width)?;
        writeln!(f, "ids used: {}", self.ids_used)?;
        writeln!(f, "padding: {}", self.padding_bytes)?;
        writeln!(
            f,
            "low nodes: {} ({} bytes)",
            self.low_nodes, self.low_bytes
        )?;
        writeln!(
            f,
            "high nodes: {} ({} bytes)",
            self.high_nodes, self.high_bytes
        )?;
        writeln!(
            f,
            "path-compressed nodes: {} ({} bytes)",
            self.pc_nodes, self.pc_bytes
        )?;
        write!(f, "outputs: {} ({} bytes)", self.outputs, self.output_bytes)
    }
}

/// Per-node planning data: the effective transition table and the fields
/// shared by all record types.
struct NodeInfo {
    /// `(value, target, advance)`, ascending by value: the first matching
    /// edge per byte, with epsilon edges matching everything.
    entries: Vec<(u8, NodeId, bool)>,
    first_output: Option<OutputId>,
    default: Option<(NodeId, bool)>,
}

impl NodeInfo {
    fn has_nonadvancing(&self) -> bool {
        self.entries.iter().any(|&(_, _, advance)| !advance)
    }
}

/// Chosen record representation for one emitted node.
enum Rep {
    Low,
    High,
    /// A collapsed chain: the path bytes and the node entered after the
    /// last one.
    Pc { path: Vec<u8>, target: NodeId },
}

enum PatchRef {
    Node(NodeId),
    Output(OutputId),
}

/// Compiles a frozen automaton into a Eudoxus buffer.
///
/// Nodes and outputs unreachable from the start node are not emitted. The
/// layout is deterministic: output records first, in breadth-first
/// discovery order, then node records in breadth-first order, each padded
/// to the configured alignment.
pub fn compile(
    automaton: &Automaton,
    config: &CompileConfig,
) -> Result<(Vec<u8>, CompileStats), CompileError> {
    if !matches!(config.id_width, 0 | 1 | 2 | 4 | 8) {
        return Err(CompileError::InvalidConfig(format!(
            "id width must be 0, 1, 2, 4 or 8, got {}",
            config.id_width
        )));
    }
    if config.align_to == 0 {
        return Err(CompileError::InvalidConfig("align_to must be at least 1".into()));
    }
    if !(config.high_node_weight.is_finite() && config.high_node_weight > 0.0) {
        return Err(CompileError::InvalidConfig(format!(
            "high_node_weight must be positive, got {}",
            config.high_node_weight
        )));
    }

    let width = if config.id_width == 0 {
        // Measure with the widest identifiers, then pick the smallest
        // width addressing that length.
        let (_, measured) = layout(automaton, 8, config)?;
        let minimal = [1usize, 2, 4, 8]
            .into_iter()
            .find(|&w| id_fits(measured.data_bytes as u64, w))
            .unwrap();
        log::info!(
            "id width 0: measured {} data bytes, selected width {}",
            measured.data_bytes,
            minimal
        );
        minimal
    } else {
        config.id_width
    };

    layout(automaton, width, config)
}

/// Compiles and writes the buffer to `path`.
pub fn compile_to_file(
    automaton: &Automaton,
    config: &CompileConfig,
    path: impl AsRef<Path>,
) -> anyhow::Result<CompileStats> {
    let (buffer, stats) = compile(automaton, config)?;
    std::fs::write(path.as_ref(), &buffer)
        .with_context(|| format!("Could not write {}", path.as_ref().display()))?;
    Ok(stats)
}

fn layout(
    automaton: &Automaton,
    width: usize,
    config: &CompileConfig,
) -> Result<(Vec<u8>, CompileStats), CompileError> {
    let order = bfs_order(automaton);
    let mut info: HashMap<NodeId, NodeInfo> = HashMap::with_capacity(order.len());
    let mut references: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
    *references.entry(automaton.start()).or_insert(0) += 1;
    for &node in &order {
        let node_info = node_info(automaton, node);
        for &(_, target, _) in &node_info.entries {
            *references.entry(target).or_insert(0) += 1;
        }
        if let Some((target, _)) = node_info.default {
            *references.entry(target).or_insert(0) += 1;
        }
        info.insert(node, node_info);
    }

    let plan = plan_representations(automaton, &order, &info, &references, width, config);

    // Live outputs, in discovery order over the emitted nodes.
    let mut live_outputs = Vec::new();
    let mut seen_outputs = HashSet::new();
    for &(node, _) in &plan {
        let mut next = info[&node].first_output;
        while let Some(id) = next {
            if !seen_outputs.insert(id) {
                break;
            }
            live_outputs.push(id);
            next = automaton.output(id).next();
        }
    }

    let mut stats = CompileStats {
        id_width: width,
        ..CompileStats::default()
    };
    let mut assembler = BufferAssembler::new();
    let mut patches: Vec<(usize, PatchRef)> = Vec::new();
    // Index 0 is reserved to mean "no referent".
    assembler.append_byte(0);

    let mut output_index: HashMap<OutputId, u64> = HashMap::with_capacity(live_outputs.len());
    for &id in &live_outputs {
        let at = assembler.len();
        output_index.insert(id, at as u64);
        let output = automaton.output(id);
        let length = u32::try_from(output.content().len()).map_err(|_| {
            CompileError::InvalidConfig(format!(
                "output content of {} bytes does not fit a record",
                output.content().len()
            ))
        })?;
        assembler.append(&length.to_ne_bytes());
        let next_at = assembler.reserve(width);
        if let Some(next) = output.next() {
            patches.push((next_at, PatchRef::Output(next)));
        }
        assembler.append(output.content());
        stats.output_bytes += assembler.len() - at;
    }
    stats.outputs = live_outputs.len();

    let mut pl = progress_logger![item_name = "node", expected_updates = Some(plan.len())];
    pl.start("Laying out node records...");
    let mut node_index: HashMap<NodeId, u64> = HashMap::with_capacity(plan.len());
    for (node, rep) in &plan {
        while assembler.len() % config.align_to != 0 {
            assembler.append_byte(0);
            stats.padding_bytes += 1;
        }
        let at = assembler.len();
        node_index.insert(*node, at as u64);
        emit_node(&mut assembler, &mut patches, &info[node], rep, width);
        let record_bytes = assembler.len() - at;
        match rep {
            Rep::Low => {
                stats.low_nodes += 1;
                stats.low_bytes += record_bytes;
            }
            Rep::High => {
                stats.high_nodes += 1;
                stats.high_bytes += record_bytes;
            }
            Rep::Pc { .. } => {
                stats.pc_nodes += 1;
                stats.pc_bytes += record_bytes;
            }
        }
        pl.update();
    }
    pl.done();

    stats.ids_used = patches.len();
    for (at, reference) in &patches {
        let value = match reference {
            PatchRef::Node(id) => node_index[id],
            PatchRef::Output(id) => output_index[id],
        };
        if !id_fits(value, width) {
            return Err(CompileError::IdTooSmall { width });
        }
        assembler.write_id_at(*at, width, value);
    }
    stats.data_bytes = assembler.len();

    let header = Header {
        version: VERSION,
        id_width: width,
        flags: Header::native_flags(automaton.no_advance_no_output()),
        num_nodes: plan.len() as u64,
        num_outputs: live_outputs.len() as u64,
        data_length: assembler.len() as u64,
        start_index: node_index[&automaton.start()],
    };

    let mut buffer = Vec::with_capacity(HEADER_LEN + assembler.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&(automaton.metadata().len() as u32).to_ne_bytes());
    for (key, value) in automaton.metadata() {
        for part in [key, value] {
            buffer.extend_from_slice(&(part.len() as u32).to_ne_bytes());
            buffer.extend_from_slice(part.as_bytes());
        }
    }
    buffer.extend_from_slice(assembler.as_slice());
    stats.total_bytes = buffer.len();
    Ok((buffer, stats))
}

/// Computes a node's effective transition table: the first matching edge
/// per input byte, which is exactly the tie-breaking the engine applies.
fn node_info(automaton: &Automaton, node: NodeId) -> NodeInfo {
    let n = automaton.node(node);
    let mut table: Vec<Option<(NodeId, bool)>> = vec![None; 256];
    for edge in n.edges() {
        if edge.is_epsilon() {
            for entry in table.iter_mut() {
                entry.get_or_insert((edge.target(), edge.advance()));
            }
        } else {
            for value in edge.values() {
                table[value as usize].get_or_insert((edge.target(), edge.advance()));
            }
        }
    }
    let entries = table
        .iter()
        .enumerate()
        .filter_map(|(value, entry)| entry.map(|(target, advance)| (value as u8, target, advance)))
        .collect();
    NodeInfo {
        entries,
        first_output: n.first_output(),
        default: n.default_target().map(|d| (d, n.advance_on_default())),
    }
}

fn low_size(width: usize, info: &NodeInfo) -> Option<usize> {
    let degree = info.entries.len();
    if degree > u8::MAX as usize {
        return None;
    }
    Some(
        2 + usize::from(info.first_output.is_some()) * width
            + usize::from(info.default.is_some()) * width
            + if info.has_nonadvancing() {
                degree.div_ceil(8)
            } else {
                0
            }
            + degree * (1 + width),
    )
}

fn high_size(width: usize, info: &NodeInfo) -> usize {
    1 + usize::from(info.first_output.is_some()) * width
        + usize::from(info.default.is_some()) * width
        + 32
        + if info.has_nonadvancing() { 32 } else { 0 }
        + info.entries.len() * width
}

fn pc_size(width: usize, path_len: usize, info: &NodeInfo) -> usize {
    2 + usize::from(info.first_output.is_some()) * width
        + usize::from(info.default.is_some()) * width
        + path_len
        + width
}

/// The representation a node gets when it is not part of a chain, and its
/// size in bytes.
fn basic_choice(width: usize, info: &NodeInfo, high_node_weight: f64) -> (Rep, usize) {
    let high = high_size(width, info);
    match low_size(width, info) {
        Some(low) if low as f64 <= high as f64 * high_node_weight => (Rep::Low, low),
        _ => (Rep::High, high),
    }
}

/// Chooses a representation for every emitted node, collapsing profitable
/// chains into path-compressed records.
fn plan_representations(
    automaton: &Automaton,
    order: &[NodeId],
    info: &HashMap<NodeId, NodeInfo>,
    references: &HashMap<NodeId, usize>,
    width: usize,
    config: &CompileConfig,
) -> Vec<(NodeId, Rep)> {
    let start = automaton.start();
    let mut consumed: HashSet<NodeId> = HashSet::new();
    let mut plan = Vec::with_capacity(order.len());

    for &head in order {
        if consumed.contains(&head) {
            continue;
        }
        // Grow the longest chain rooted here: every member has a single
        // advancing byte entry; members past the first must be
        // output-free, referenced only by their chain predecessor, and
        // share the head's default behaviour.
        let mut members = Vec::new();
        let mut current = head;
        while members.len() < u8::MAX as usize {
            let i = &info[&current];
            if !(i.entries.len() == 1 && i.entries[0].2) {
                break;
            }
            if current != head {
                let interior = references.get(&current).copied().unwrap_or(0) == 1
                    && i.first_output.is_none()
                    && current != start
                    && i.default == info[&head].default
                    && !consumed.contains(&current);
                if !interior {
                    break;
                }
            }
            members.push(current);
            let next = i.entries[0].1;
            if members.contains(&next) {
                members.pop();
                break;
            }
            current = next;
        }

        if members.len() >= 2 {
            let last = *members.last().unwrap();
            let target = info[&last].entries[0].1;
            let path: Vec<u8> = members.iter().map(|m| info[m].entries[0].0).collect();
            let collapsed = pc_size(width, path.len(), &info[&head]);
            let individual: usize = members
                .iter()
                .map(|m| basic_choice(width, &info[m], config.high_node_weight).1)
                .sum();
            if collapsed < individual {
                for &member in &members[1..] {
                    consumed.insert(member);
                }
                plan.push((head, Rep::Pc { path, target }));
                continue;
            }
        }

        let (rep, _) = basic_choice(width, &info[&head], config.high_node_weight);
        plan.push((head, rep));
    }
    plan
}

fn emit_node(
    assembler: &mut BufferAssembler,
    patches: &mut Vec<(usize, PatchRef)>,
    info: &NodeInfo,
    rep: &Rep,
    width: usize,
) {
    let mut header = match rep {
        Rep::Low => TYPE_LOW,
        Rep::High => TYPE_HIGH,
        Rep::Pc { .. } => TYPE_PC,
    };
    if info.first_output.is_some() {
        header |= FLAG_HAS_OUTPUT;
    }
    let has_nonadvancing =
        !matches!(rep, Rep::Pc { .. }) && info.has_nonadvancing() && !info.entries.is_empty();
    if has_nonadvancing {
        header |= FLAG_HAS_NONADVANCING;
    }
    if let Some((_, advance)) = info.default {
        header |= FLAG_HAS_DEFAULT;
        if advance {
            header |= FLAG_ADVANCE_ON_DEFAULT;
        }
    }
    assembler.append_byte(header);

    if let Rep::Low = rep {
        assembler.append_byte(info.entries.len() as u8);
    }
    if let Some(first) = info.first_output {
        let at = assembler.reserve(width);
        patches.push((at, PatchRef::Output(first)));
    }
    if let Some((target, _)) = info.default {
        let at = assembler.reserve(width);
        patches.push((at, PatchRef::Node(target)));
    }

    match rep {
        Rep::Low => {
            if has_nonadvancing {
                let mut bitmap = vec![0u8; info.entries.len().div_ceil(8)];
                for (i, &(_, _, advance)) in info.entries.iter().enumerate() {
                    if advance {
                        bitmap[i / 8] |= 1 << (i % 8);
                    }
                }
                assembler.append(&bitmap);
            }
            for &(value, target, _) in &info.entries {
                assembler.append_byte(value);
                let at = assembler.reserve(width);
                patches.push((at, PatchRef::Node(target)));
            }
        }
        Rep::High => {
            let membership: ByteSet = info.entries.iter().map(|&(value, _, _)| value).collect();
            assembler.append(membership.as_bytes());
            if has_nonadvancing {
                let advancing: ByteSet = info
                    .entries
                    .iter()
                    .filter(|&&(_, _, advance)| advance)
                    .map(|&(value, _, _)| value)
                    .collect();
                assembler.append(advancing.as_bytes());
            }
            for &(_, target, _) in &info.entries {
                let at = assembler.reserve(width);
                patches.push((at, PatchRef::Node(target)));
            }
        }
        Rep::Pc { path, target } => {
            assembler.append_byte(path.len() as u8);
            assembler.append(path);
            let at = assembler.reserve(width);
            patches.push((at, PatchRef::Node(*target)));
        }
    }
}
