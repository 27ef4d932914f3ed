/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::codec::Reader;
use crate::graph::dot::write_dot;
use crate::reporter::LogReporter;
use anyhow::Result;
use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct CliArgs {}

/// Reads an intermediate stream on standard input and writes a Graphviz
/// rendering of the graph to standard output.
pub fn main(_args: CliArgs) -> Result<()> {
    let mut reporter = LogReporter;
    let automaton = Reader::new().read(std::io::stdin().lock(), &mut reporter)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_dot(&automaton, &mut out)?;
    out.flush()?;
    Ok(())
}
