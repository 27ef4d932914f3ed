/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::ac::AcBuilder;
use crate::codec::Writer;
use anyhow::{Context, Result};
use clap::Args;
use std::io::{BufRead, Write};

#[derive(Args, Debug)]
pub struct CliArgs {
    /// Treat input lines as patterns instead of literal keywords.
    #[arg(long)]
    pub pattern: bool,

    /// Emit each keyword's length instead of the keyword itself.
    #[arg(long, conflicts_with = "pattern")]
    pub length: bool,

    /// Value of the reserved Output-Type metadata key; defaults to
    /// "length" with --length and "string" otherwise.
    #[arg(long)]
    pub output_type: Option<String>,

    /// Bound the number of records per chunk of the output stream.
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

/// Reads one keyword (or pattern) per line from standard input and writes
/// the generated automaton to standard output as an intermediate stream.
pub fn main(args: CliArgs) -> Result<()> {
    let mut builder = AcBuilder::new();
    let mut keywords = 0usize;
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Could not read standard input")?;
        if line.is_empty() {
            continue;
        }
        if args.pattern {
            builder
                .add_pattern(&line, line.as_bytes())
                .with_context(|| format!("Could not add pattern {:?}", line))?;
        } else if args.length {
            builder
                .add_length(line.as_bytes())
                .with_context(|| format!("Could not add keyword {:?}", line))?;
        } else {
            builder
                .add(line.as_bytes())
                .with_context(|| format!("Could not add keyword {:?}", line))?;
        }
        keywords += 1;
    }

    let mut automaton = builder.finish()?;
    let output_type = match &args.output_type {
        Some(value) => value.clone(),
        None if args.length => "length".into(),
        None => "string".into(),
    };
    automaton
        .metadata_mut()
        .insert("Output-Type".into(), output_type);
    log::info!(
        "generated automaton: {} keywords, {} nodes, {} outputs",
        keywords,
        automaton.num_nodes(),
        automaton.num_outputs()
    );

    let mut writer = Writer::new();
    if let Some(chunk_size) = args.chunk_size {
        writer = writer.with_chunk_size(chunk_size);
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writer.write(&automaton, &mut out)?;
    out.flush()?;
    Ok(())
}
