/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod ac;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod eudoxus;
pub mod graph;
pub mod reporter;
pub mod transform;
pub mod utils;
pub mod visits;

pub mod prelude {
    pub use crate::ac::AcBuilder;
    pub use crate::codec::{Reader, Writer};
    pub use crate::eudoxus::{compile, CompileConfig, Eudoxus, Interrupt, Status};
    pub use crate::graph::{Automaton, Edge, Node, NodeId, Output, OutputId};
    pub use crate::reporter::{FnReporter, LogReporter, NopReporter, Reporter, Severity};
    pub use crate::transform::{
        deduplicate_outputs, optimize_all_edges, optimize_edges, translate_nonadvancing,
        TranslateVariant,
    };
    pub use crate::utils::{BufferAssembler, ByteSet};
    pub use crate::visits::breadth_first;
}
