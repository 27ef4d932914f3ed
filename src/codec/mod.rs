/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The chunked intermediate interchange format.
//!
//! An automaton crosses process boundaries as a sequence of *chunks*. Each
//! chunk is framed by a 32-bit network-order byte length and carries a
//! big-endian bitstream of γ-coded records, terminated by an end tag:
//!
//! - an **automaton record** (at most one per stream) declaring the
//!   `no_advance_no_output` flag and the start-node identifier — when
//!   absent, the start node is implicit as identifier 1;
//! - **metadata records**, one key/value pair each;
//! - **node records**: identifier, optional first-output identifier,
//!   optional default target with its advance flag, and the edge list —
//!   each edge a target identifier, an advance bit, and its value set as
//!   either a length-prefixed vector or a 256-bit bitmap;
//! - **output records**: identifier, next-output identifier (0 when the
//!   chain ends), and the content bytes.
//!
//! Identifier 0 is never assigned; node and output identifiers live in
//! separate spaces. Chunks may arrive in any order and records may
//! reference identifiers defined in later chunks: the [`Reader`] resolves
//! references only at end of stream. Inconsistencies that make the graph
//! meaningless (an unparsable chunk, a reference never defined) are
//! [errors](DecodeError); redundancies (duplicate definitions, a defined
//! but never referenced identifier, a value vector long enough that a
//! bitmap would be smaller) are warnings: the read still succeeds but is
//! reported as not clean.

mod read;
mod write;

pub use read::Reader;
pub use write::Writer;

use thiserror::Error;

/// Record tags of the chunk payload bitstream.
pub(crate) const TAG_END: u64 = 0;
pub(crate) const TAG_AUTOMATON: u64 = 1;
pub(crate) const TAG_METADATA: u64 = 2;
pub(crate) const TAG_NODE: u64 = 3;
pub(crate) const TAG_OUTPUT: u64 = 4;

/// Errors raised while decoding an intermediate stream.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error reading stream")]
    Io(#[from] std::io::Error),
    #[error("truncated chunk: expected {expected} payload bytes")]
    TruncatedChunk { expected: usize },
    #[error("cannot parse chunk: {0}")]
    Payload(String),
    #[error("unknown record tag {0}")]
    UnknownTag(u64),
    #[error("identifier 0 is reserved")]
    ReservedId,
    #[error("duplicate automaton record")]
    DuplicateAutomaton,
    #[error("{kind} {id} is referenced but never defined")]
    Undefined { kind: &'static str, id: u64 },
}
