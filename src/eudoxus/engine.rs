/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    EudoxusError, Header, HeaderFlags, FLAG_ADVANCE_ON_DEFAULT, FLAG_HAS_DEFAULT,
    FLAG_HAS_NONADVANCING, FLAG_HAS_OUTPUT, HEADER_LEN, TYPE_HIGH, TYPE_LOW, TYPE_MASK, TYPE_PC,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::ControlFlow;
use std::path::Path;

/// A loaded compiled automaton.
///
/// The handle owns the buffer — heap bytes from
/// [`from_bytes`](Eudoxus::from_bytes) or a read-only memory mapping from
/// [`load`](Eudoxus::load) — and validates the header once. Executions
/// borrow the handle, so the buffer outlives every execution by
/// construction, and any number of executions may run concurrently over
/// one handle: the buffer is never written after load.
pub struct Eudoxus {
    data: Data,
    header: Header,
    metadata: BTreeMap<String, String>,
    data_start: usize,
}

enum Data {
    Owned(Vec<u8>),
    Mapped(mmap_rs::Mmap),
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        match self {
            Data::Owned(bytes) => bytes,
            Data::Mapped(mmap) => unsafe {
                std::slice::from_raw_parts(mmap.as_ptr(), mmap.len())
            },
        }
    }
}

/// Verdict a callback returns through [`ControlFlow::Break`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// Suspend the execution; [`resume`](Execution::resume) continues it.
    Stop,
    /// Suspend the execution, flagging an error on the caller's side.
    Error,
}

/// Where an [`execute`](Execution::execute) or
/// [`resume`](Execution::resume) call left the execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The input block is exhausted; feed more.
    NeedsInput,
    /// No transition exists for the current byte: the automaton is done.
    Ended,
    /// The callback returned [`Interrupt::Stop`]; resumable.
    Stopped,
    /// The callback returned [`Interrupt::Error`]; resumable.
    CallbackError,
}

impl Eudoxus {
    /// Validates and wraps an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EudoxusError> {
        Self::from_data(Data::Owned(bytes))
    }

    /// Memory-maps a compiled automaton read-only and validates it.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let file_len: usize = path
            .as_ref()
            .metadata()
            .with_context(|| format!("Cannot stat {}", path.as_ref().display()))?
            .len()
            .try_into()
            .with_context(|| "Cannot convert file length to usize")?;
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Cannot open {}", path.as_ref().display()))?;
        let mmap = unsafe {
            // Length must be > 0, or we get a panic.
            mmap_rs::MmapOptions::new(file_len.max(1))
                .with_context(|| format!("Cannot initialize mmap of size {file_len}"))?
                .with_file(&file, 0)
                .map()
                .with_context(|| format!("Cannot mmap {}", path.as_ref().display()))?
        };
        Self::from_data(Data::Mapped(mmap))
            .with_context(|| format!("Cannot load {}", path.as_ref().display()))
    }

    fn from_data(data: Data) -> Result<Self, EudoxusError> {
        let bytes = data.as_ref();
        let header = Header::parse(bytes)?;

        let truncated = || EudoxusError::Incompatible("truncated metadata block".into());
        let mut pos = HEADER_LEN;
        let read_u32 = |pos: &mut usize| -> Result<usize, EudoxusError> {
            let end = pos.checked_add(4).filter(|&end| end <= bytes.len());
            let end = end.ok_or_else(truncated)?;
            let value = u32::from_ne_bytes(bytes[*pos..end].try_into().unwrap());
            *pos = end;
            Ok(value as usize)
        };
        let read_string = |pos: &mut usize| -> Result<String, EudoxusError> {
            let length = read_u32(pos)?;
            let end = pos.checked_add(length).filter(|&end| end <= bytes.len());
            let end = end.ok_or_else(truncated)?;
            let value = String::from_utf8(bytes[*pos..end].to_vec())
                .map_err(|_| EudoxusError::Incompatible("metadata is not UTF-8".into()))?;
            *pos = end;
            Ok(value)
        };

        let pairs = read_u32(&mut pos)?;
        let mut metadata = BTreeMap::new();
        for _ in 0..pairs {
            let key = read_string(&mut pos)?;
            let value = read_string(&mut pos)?;
            metadata.insert(key, value);
        }
        let data_start = pos;
        if bytes.len() < data_start + header.data_length as usize {
            return Err(EudoxusError::Incompatible(
                "buffer shorter than declared data length".into(),
            ));
        }

        Ok(Self {
            data,
            header,
            metadata,
            data_start,
        })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the automaton metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns whether outputs are suppressed after non-advancing
    /// transitions.
    pub fn no_advance_no_output(&self) -> bool {
        self.header
            .flags
            .contains(HeaderFlags::NO_ADVANCE_NO_OUTPUT)
    }

    /// Starts an execution over this automaton.
    ///
    /// The callback receives each emitted output's content and the input
    /// location — the number of bytes consumed so far, i.e. the 1-based
    /// end position of a match.
    pub fn execution<F>(&self, callback: F) -> Execution<'_, F>
    where
        F: FnMut(&[u8], u64) -> ControlFlow<Interrupt>,
    {
        Execution {
            eudoxus: self,
            callback,
            node: self.header.start_index,
            path_pos: 0,
            consumed: 0,
            ended: false,
            pending: None,
        }
    }

    /// Returns the content of every output reachable from the start node,
    /// in breadth-first discovery order.
    ///
    /// Each record is listed once no matter how many chains share it, so
    /// the result is the multiset of live output contents of the compiled
    /// graph.
    pub fn outputs(&self) -> Result<Vec<&[u8]>, EudoxusError> {
        let mut visited = HashSet::new();
        let mut seen_outputs = HashSet::new();
        let mut contents = Vec::new();
        let mut queue = VecDeque::new();
        visited.insert(self.header.start_index);
        queue.push_back(self.header.start_index);
        while let Some(at) = queue.pop_front() {
            let record = self.parse_node(at)?;
            let mut output = record.first_output;
            let mut guard = 0u64;
            while output != 0 && seen_outputs.insert(output) {
                guard += 1;
                if guard > self.header.data_length {
                    return Err(EudoxusError::Insane("output chain cycle".into()));
                }
                let (content, next) = self.read_output(output)?;
                contents.push(content);
                output = next;
            }
            for successor in record.successors(self.header.id_width)? {
                if successor != 0 && visited.insert(successor) {
                    queue.push_back(successor);
                }
            }
        }
        Ok(contents)
    }

    fn data(&self) -> &[u8] {
        &self.data.as_ref()[self.data_start..self.data_start + self.header.data_length as usize]
    }

    /// Parses the node record at data-section index `at`.
    fn parse_node(&self, at: u64) -> Result<ParsedNode<'_>, EudoxusError> {
        let width = self.header.id_width;
        let mut cursor = Cursor::new(self.data(), at)?;
        let header = cursor.u8()?;
        let type_code = header & TYPE_MASK;
        let degree = if type_code == TYPE_LOW {
            cursor.u8()? as usize
        } else {
            0
        };
        let first_output = if header & FLAG_HAS_OUTPUT != 0 {
            cursor.id(width)?
        } else {
            0
        };
        let (default, advance_on_default) = if header & FLAG_HAS_DEFAULT != 0 {
            (cursor.id(width)?, header & FLAG_ADVANCE_ON_DEFAULT != 0)
        } else {
            (0, false)
        };
        let payload = match type_code {
            TYPE_LOW => {
                let advance_bitmap = if header & FLAG_HAS_NONADVANCING != 0 {
                    Some(cursor.bytes(degree.div_ceil(8))?)
                } else {
                    None
                };
                let entries = cursor.bytes(degree * (1 + width))?;
                NodePayload::Low {
                    advance_bitmap,
                    entries,
                }
            }
            TYPE_HIGH => {
                let membership = cursor.bytes(32)?;
                let advance_bitmap = if header & FLAG_HAS_NONADVANCING != 0 {
                    Some(cursor.bytes(32)?)
                } else {
                    None
                };
                let degree: usize = membership.iter().map(|b| b.count_ones() as usize).sum();
                let ids = cursor.bytes(degree * width)?;
                NodePayload::High {
                    membership,
                    advance_bitmap,
                    ids,
                }
            }
            TYPE_PC => {
                let length = cursor.u8()? as usize;
                if length == 0 {
                    return Err(EudoxusError::Insane(format!(
                        "empty path in record at {}",
                        at
                    )));
                }
                let path = cursor.bytes(length)?;
                let target = cursor.id(width)?;
                NodePayload::Pc { path, target }
            }
            code => {
                return Err(EudoxusError::Insane(format!(
                    "invalid node type {} at {}",
                    code, at
                )))
            }
        };
        Ok(ParsedNode {
            first_output,
            default: if header & FLAG_HAS_DEFAULT != 0 {
                Some((default, advance_on_default))
            } else {
                None
            },
            payload,
        })
    }

    /// Reads the output record at data-section index `at`, returning its
    /// content and the index of the next output (0 at chain end).
    fn read_output(&self, at: u64) -> Result<(&[u8], u64), EudoxusError> {
        let width = self.header.id_width;
        let mut cursor = Cursor::new(self.data(), at)?;
        let length = cursor.u32()? as usize;
        let next = cursor.id(width)?;
        let content = cursor.bytes(length)?;
        Ok((content, next))
    }
}

/// A decoded node record; slices borrow the underlying buffer.
struct ParsedNode<'a> {
    /// 0 when the node has no outputs.
    first_output: u64,
    default: Option<(u64, bool)>,
    payload: NodePayload<'a>,
}

enum NodePayload<'a> {
    Low {
        advance_bitmap: Option<&'a [u8]>,
        /// `degree` records of (value byte, id), ascending by value.
        entries: &'a [u8],
    },
    High {
        membership: &'a [u8],
        advance_bitmap: Option<&'a [u8]>,
        ids: &'a [u8],
    },
    Pc {
        path: &'a [u8],
        target: u64,
    },
}

impl ParsedNode<'_> {
    /// Looks up the labelled transition for `c`; path-compressed records
    /// are matched positionally by the engine instead.
    fn lookup(&self, c: u8, width: usize) -> Option<(u64, bool)> {
        match &self.payload {
            NodePayload::Low {
                advance_bitmap,
                entries,
            } => {
                for (i, entry) in entries.chunks_exact(1 + width).enumerate() {
                    if entry[0] == c {
                        let advance = advance_bitmap
                            .is_none_or(|bitmap| bitmap[i / 8] & (1 << (i % 8)) != 0);
                        return Some((read_id(&entry[1..], width), advance));
                    }
                    if entry[0] > c {
                        break;
                    }
                }
                None
            }
            NodePayload::High {
                membership,
                advance_bitmap,
                ids,
            } => {
                let byte = (c >> 3) as usize;
                let bit = 1u8 << (c & 7);
                if membership[byte] & bit == 0 {
                    return None;
                }
                let rank: usize = membership[..byte]
                    .iter()
                    .map(|b| b.count_ones() as usize)
                    .sum::<usize>()
                    + (membership[byte] & (bit - 1)).count_ones() as usize;
                let advance = advance_bitmap.is_none_or(|bitmap| bitmap[byte] & bit != 0);
                Some((read_id(&ids[rank * width..(rank + 1) * width], width), advance))
            }
            NodePayload::Pc { .. } => None,
        }
    }

    /// All node indices this record references, default included.
    fn successors(&self, width: usize) -> Result<Vec<u64>, EudoxusError> {
        let mut successors = Vec::new();
        match &self.payload {
            NodePayload::Low { entries, .. } => {
                for entry in entries.chunks_exact(1 + width) {
                    successors.push(read_id(&entry[1..], width));
                }
            }
            NodePayload::High { ids, .. } => {
                for id in ids.chunks_exact(width) {
                    successors.push(read_id(id, width));
                }
            }
            NodePayload::Pc { target, .. } => successors.push(*target),
        }
        if let Some((default, _)) = self.default {
            successors.push(default);
        }
        Ok(successors)
    }
}

/// Bounds-checked cursor over the data section.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], at: u64) -> Result<Self, EudoxusError> {
        let pos = usize::try_from(at)
            .ok()
            .filter(|&pos| pos > 0 && pos < data.len())
            .ok_or_else(|| EudoxusError::Insane(format!("index {} out of bounds", at)))?;
        Ok(Self { data, pos })
    }

    fn u8(&mut self) -> Result<u8, EudoxusError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| EudoxusError::Insane("truncated record".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], EudoxusError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| EudoxusError::Insane("truncated record".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, EudoxusError> {
        Ok(u32::from_ne_bytes(self.bytes(4)?.try_into().unwrap()))
    }

    fn id(&mut self, width: usize) -> Result<u64, EudoxusError> {
        Ok(read_id(self.bytes(width)?, width))
    }
}

/// Decodes a native-endian identifier of `width` bytes.
fn read_id(bytes: &[u8], width: usize) -> u64 {
    let mut buffer = [0u8; 8];
    #[cfg(target_endian = "little")]
    buffer[..width].copy_from_slice(&bytes[..width]);
    #[cfg(target_endian = "big")]
    buffer[8 - width..].copy_from_slice(&bytes[..width]);
    u64::from_ne_bytes(buffer)
}

/// A callback decision waiting to be replayed.
struct Pending {
    output: u64,
    location: u64,
    remainder: Vec<u8>,
}

/// A streaming execution over a compiled automaton.
///
/// At most one callback decision is pending at any time: when the
/// callback breaks with an [`Interrupt`], the execution suspends and
/// [`resume`](Execution::resume) replays the callback from that very
/// output before continuing with the input the suspension interrupted.
pub struct Execution<'a, F> {
    eudoxus: &'a Eudoxus,
    callback: F,
    /// Data-section index of the current node record.
    node: u64,
    /// Position inside a path-compressed record's path.
    path_pos: usize,
    /// Total input bytes consumed; the location passed to the callback.
    consumed: u64,
    ended: bool,
    pending: Option<Pending>,
}

impl<'a, F: FnMut(&[u8], u64) -> ControlFlow<Interrupt>> Execution<'a, F> {
    /// Streams a block of input through the automaton.
    ///
    /// Returns [`Status::NeedsInput`] when the block is exhausted,
    /// [`Status::Ended`] when the automaton has no transition left, or a
    /// suspension status when the callback broke; in the latter case the
    /// unconsumed tail of `input` is retained and replayed by
    /// [`resume`](Execution::resume).
    pub fn execute(&mut self, input: &[u8]) -> Result<Status, EudoxusError> {
        if self.pending.is_some() {
            return Err(EudoxusError::Suspended);
        }
        if self.ended {
            return Ok(Status::Ended);
        }
        self.run(input)
    }

    /// Resumes a suspended execution: replays the callback from the
    /// pending output, finishes the output chain, then continues with the
    /// retained input.
    pub fn resume(&mut self) -> Result<Status, EudoxusError> {
        let pending = self.pending.take().ok_or(EudoxusError::NotSuspended)?;
        match self.emit_chain(pending.output, pending.location)? {
            ControlFlow::Break((interrupt, output)) => {
                let status = interrupt_status(interrupt);
                self.pending = Some(Pending { output, ..pending });
                Ok(status)
            }
            ControlFlow::Continue(()) => {
                let remainder = pending.remainder;
                self.run(&remainder)
            }
        }
    }

    /// Returns the number of input bytes consumed so far.
    pub fn location(&self) -> u64 {
        self.consumed
    }

    /// Returns true if a callback decision is pending.
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns true if the automaton ran out of transitions.
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    fn run(&mut self, input: &[u8]) -> Result<Status, EudoxusError> {
        let width = self.eudoxus.header.id_width;
        let suppress = self.eudoxus.no_advance_no_output();
        let mut i = 0;
        while i < input.len() {
            let c = input[i];
            let mut hops = 0u64;
            // One iteration per transition; non-advancing transitions keep
            // the loop on the same input byte.
            loop {
                hops += 1;
                if hops > self.eudoxus.header.data_length {
                    return Err(EudoxusError::Insane(
                        "cycle of non-advancing transitions".into(),
                    ));
                }
                let record = self.eudoxus.parse_node(self.node)?;
                if let NodePayload::Pc { path, target } = &record.payload {
                    if path[self.path_pos] == c {
                        self.path_pos += 1;
                        i += 1;
                        self.consumed += 1;
                        if self.path_pos == path.len() {
                            // The chain is fully matched: enter the target.
                            let target = *target;
                            self.path_pos = 0;
                            self.node = target;
                            if let Some(status) = self.enter(true, suppress, i, input)? {
                                return Ok(status);
                            }
                        }
                        break;
                    }
                    // Mismatch inside the path falls through to the
                    // record's default below.
                }
                let transition = record
                    .lookup(c, width)
                    .or(record.default);
                let Some((target, advance)) = transition else {
                    self.ended = true;
                    return Ok(Status::Ended);
                };
                if target == 0 {
                    return Err(EudoxusError::Insane("transition to reserved index 0".into()));
                }
                if advance {
                    i += 1;
                    self.consumed += 1;
                }
                self.node = target;
                self.path_pos = 0;
                if let Some(status) = self.enter(advance, suppress, i, input)? {
                    return Ok(status);
                }
                if advance {
                    break;
                }
            }
        }
        Ok(Status::NeedsInput)
    }

    /// Emits the freshly entered node's outputs, honouring suppression;
    /// suspends on a callback break, retaining `input[i..]`.
    fn enter(
        &mut self,
        advance: bool,
        suppress: bool,
        i: usize,
        input: &[u8],
    ) -> Result<Option<Status>, EudoxusError> {
        if suppress && !advance {
            return Ok(None);
        }
        let first = self.eudoxus.parse_node(self.node)?.first_output;
        if first == 0 {
            return Ok(None);
        }
        match self.emit_chain(first, self.consumed)? {
            ControlFlow::Continue(()) => Ok(None),
            ControlFlow::Break((interrupt, output)) => {
                self.pending = Some(Pending {
                    output,
                    location: self.consumed,
                    remainder: input[i..].to_vec(),
                });
                Ok(Some(interrupt_status(interrupt)))
            }
        }
    }

    /// Invokes the callback along an output chain; breaks with the output
    /// whose callback interrupted.
    fn emit_chain(
        &mut self,
        first: u64,
        location: u64,
    ) -> Result<ControlFlow<(Interrupt, u64)>, EudoxusError> {
        let mut output = first;
        let mut guard = 0u64;
        while output != 0 {
            guard += 1;
            if guard > self.eudoxus.header.data_length {
                return Err(EudoxusError::Insane("output chain cycle".into()));
            }
            let (content, next) = self.eudoxus.read_output(output)?;
            match (self.callback)(content, location) {
                ControlFlow::Continue(()) => output = next,
                ControlFlow::Break(interrupt) => {
                    return Ok(ControlFlow::Break((interrupt, output)))
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn interrupt_status(interrupt: Interrupt) -> Status {
    match interrupt {
        Interrupt::Stop => Status::Stopped,
        Interrupt::Error => Status::CallbackError,
    }
}
