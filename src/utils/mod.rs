/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Low-level building blocks shared by the pipeline stages.

mod assembler;
mod byte_set;

pub use assembler::{id_fits, BufferAssembler};
pub use byte_set::{ByteSet, ByteSetIter};
