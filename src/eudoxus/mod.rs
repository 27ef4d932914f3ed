/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Eudoxus compiled automaton format and its execution engine.
//!
//! A compiled automaton is one contiguous, position-independent buffer:
//!
//! 1. a fixed 36-byte **header**: `u8` format version, `u8` identifier
//!    width ∈ {1, 2, 4, 8}, `u8` flags ([`HeaderFlags`]), one reserved
//!    byte, then `u64` node count, output count, data length and
//!    start-node index;
//! 2. a **metadata block**: `u32` pair count, then for each pair a
//!    `u32`-length-prefixed key and value;
//! 3. the **data section**: one reserved zero byte followed by
//!    interleaved node and output records.
//!
//! Every multi-byte integer is stored in the byte order the automaton was
//! compiled with, declared by [`HeaderFlags::BIG_ENDIAN`] and rejected on
//! mismatch at load time. Cross-references are byte indices into the data
//! section, stored in the identifier width; index 0 means "no referent" —
//! the reserved leading byte guarantees no record lives there. Whether an
//! index names a node or an output follows from where the reference
//! appears.
//!
//! Node records open with one byte: a 3-bit type code ([`TYPE_LOW`],
//! [`TYPE_HIGH`], [`TYPE_PC`]) and five type-specific flag bits.
//!
//! - **Low-degree** — `u8` out-degree, optional first-output index,
//!   optional default index, optional advance bitmap (⌈degree/8⌉ bytes,
//!   bit *i* clear = entry *i* non-advancing), then degree × (value byte,
//!   target index) in strictly ascending value order.
//! - **High-degree** — optional first-output index, optional default
//!   index, a 32-byte membership bitmap, an optional 32-byte advance
//!   bitmap indexed by byte value, then one target index per member in
//!   ascending value order (a dense table indexed by bitmap rank).
//! - **Path-compressed** — optional first-output index, optional default
//!   index, `u8` path length, the path bytes, and the index of the node
//!   entered after the last path byte. Path steps always advance; only
//!   the collapsed chain's first node may carry outputs, and the whole
//!   chain shares the default recorded here.
//!
//! Bitmaps map byte value `c` to bit `c & 7` of byte `c >> 3`.
//!
//! An **output record** is a `u32` content length, the index of the next
//! output (0 at the end of the chain), and the content bytes.

mod compiler;
mod engine;

pub use compiler::{compile, compile_to_file, CompileConfig, CompileStats};
pub use engine::{Eudoxus, Execution, Interrupt, Status};

use bitflags::bitflags;
use thiserror::Error;

/// Current format version.
pub const VERSION: u8 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 36;

bitflags! {
    /// Flag byte of the header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// All integers in the buffer are big-endian.
        const BIG_ENDIAN = 1;
        /// Outputs are suppressed after non-advancing transitions.
        const NO_ADVANCE_NO_OUTPUT = 2;
    }
}

/// Node type codes (low 3 bits of the record's first byte).
pub const TYPE_LOW: u8 = 1;
pub const TYPE_HIGH: u8 = 2;
pub const TYPE_PC: u8 = 3;

pub(crate) const TYPE_MASK: u8 = 0b0000_0111;
pub(crate) const FLAG_HAS_OUTPUT: u8 = 1 << 3;
pub(crate) const FLAG_HAS_NONADVANCING: u8 = 1 << 4;
pub(crate) const FLAG_HAS_DEFAULT: u8 = 1 << 5;
pub(crate) const FLAG_ADVANCE_ON_DEFAULT: u8 = 1 << 6;

/// Errors raised by the compiler.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The identifier width cannot address the compiled buffer; retry
    /// with a larger width.
    #[error("id width {width} is too small for the compiled automaton")]
    IdTooSmall { width: usize },
    #[error("invalid compiler configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the engine.
#[derive(Error, Debug)]
pub enum EudoxusError {
    /// The buffer is not a loadable automaton (bad version, foreign
    /// endianness, malformed header).
    #[error("incompatible automaton: {0}")]
    Incompatible(String),
    /// The buffer is self-inconsistent; aborting execution.
    #[error("insane automaton: {0}")]
    Insane(String),
    /// `execute` was called while a callback decision is pending.
    #[error("execution is suspended; call resume()")]
    Suspended,
    /// `resume` was called with no callback decision pending.
    #[error("execution is not suspended")]
    NotSuspended,
}

/// The fixed header of a compiled automaton.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub id_width: usize,
    pub flags: HeaderFlags,
    pub num_nodes: u64,
    pub num_outputs: u64,
    pub data_length: u64,
    pub start_index: u64,
}

impl Header {
    /// Serializes the header in native byte order.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.version;
        bytes[1] = self.id_width as u8;
        bytes[2] = self.flags.bits();
        bytes[4..12].copy_from_slice(&self.num_nodes.to_ne_bytes());
        bytes[12..20].copy_from_slice(&self.num_outputs.to_ne_bytes());
        bytes[20..28].copy_from_slice(&self.data_length.to_ne_bytes());
        bytes[28..36].copy_from_slice(&self.start_index.to_ne_bytes());
        bytes
    }

    /// Parses and validates a header against this build's capabilities.
    pub fn parse(bytes: &[u8]) -> Result<Self, EudoxusError> {
        if bytes.len() < HEADER_LEN {
            return Err(EudoxusError::Incompatible("buffer shorter than header".into()));
        }
        let version = bytes[0];
        if version != VERSION {
            return Err(EudoxusError::Incompatible(format!(
                "unsupported version {}",
                version
            )));
        }
        let id_width = bytes[1] as usize;
        if !matches!(id_width, 1 | 2 | 4 | 8) {
            return Err(EudoxusError::Incompatible(format!(
                "invalid id width {}",
                id_width
            )));
        }
        let Some(flags) = HeaderFlags::from_bits(bytes[2]) else {
            return Err(EudoxusError::Incompatible(format!(
                "unknown flag bits 0x{:02x}",
                bytes[2]
            )));
        };
        if flags.contains(HeaderFlags::BIG_ENDIAN) != cfg!(target_endian = "big") {
            return Err(EudoxusError::Incompatible(
                "automaton was compiled for the other endianness".into(),
            ));
        }
        let u64_at = |at: usize| u64::from_ne_bytes(bytes[at..at + 8].try_into().unwrap());
        let header = Self {
            version,
            id_width,
            flags,
            num_nodes: u64_at(4),
            num_outputs: u64_at(12),
            data_length: u64_at(20),
            start_index: u64_at(28),
        };
        if header.data_length == 0 {
            return Err(EudoxusError::Incompatible("zero data length".into()));
        }
        if header.start_index == 0 || header.start_index >= header.data_length {
            return Err(EudoxusError::Incompatible(format!(
                "start index {} out of bounds",
                header.start_index
            )));
        }
        Ok(header)
    }

    /// The native-order flag byte for automata compiled by this build.
    pub fn native_flags(no_advance_no_output: bool) -> HeaderFlags {
        let mut flags = HeaderFlags::empty();
        if cfg!(target_endian = "big") {
            flags |= HeaderFlags::BIG_ENDIAN;
        }
        if no_advance_no_output {
            flags |= HeaderFlags::NO_ADVANCE_NO_OUTPUT;
        }
        flags
    }
}
