/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::codec::Reader;
use crate::eudoxus::{compile_to_file, CompileConfig};
use crate::reporter::LogReporter;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CliArgs {
    /// Input intermediate file.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Input intermediate file (alternative to -i).
    pub input_path: Option<PathBuf>,

    /// Output file; defaults to the input path with ".e" appended.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Identifier width in bytes (1, 2, 4 or 8); 0 selects the smallest
    /// width that fits.
    #[arg(short = 'w', long, default_value_t = 0)]
    pub id_width: usize,

    /// Pad node records to indices that are multiples of this value.
    #[arg(short, long, default_value_t = 1)]
    pub align_to: usize,

    /// Weight of high-degree records in the cost model; below 1 favours
    /// them, above 1 favours low-degree records.
    #[arg(short = 'H', long, default_value_t = 1.0)]
    pub high_node_weight: f64,
}

/// Compiles an intermediate file into a Eudoxus file and prints the
/// compilation statistics.
pub fn main(args: CliArgs) -> Result<()> {
    let input = match (&args.input, &args.input_path) {
        (Some(input), None) | (None, Some(input)) => input.clone(),
        (Some(_), Some(_)) => bail!("input given both with -i and positionally"),
        (None, None) => bail!("no input given"),
    };
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.e", input.display())));

    let file = File::open(&input).with_context(|| format!("Could not open {}", input.display()))?;
    let mut reporter = LogReporter;
    let automaton = Reader::new().read(BufReader::new(file), &mut reporter)?;

    let config = CompileConfig {
        id_width: args.id_width,
        align_to: args.align_to,
        high_node_weight: args.high_node_weight,
    };
    let stats = compile_to_file(&automaton, &config, &output)?;
    println!("{}", stats);
    log::info!("wrote {}", output.display());
    Ok(())
}
