/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::eudoxus::{Eudoxus, Status};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::io::Write;
use std::ops::ControlFlow::Continue;
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputType {
    /// Use the automaton's Output-Type metadata (falling back to string).
    Auto,
    /// Print content as text.
    String,
    /// Decode content as a 4-byte little-endian length.
    Length,
    /// Decode content as a little-endian integer of up to 8 bytes.
    Integer,
    /// Do not decode content.
    Nop,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RecordMode {
    /// Print one line per emitted output.
    List,
    /// Print only the number of emitted outputs.
    Count,
    /// Discard outputs (for benchmarking).
    Nop,
}

#[derive(Args, Debug)]
pub struct CliArgs {
    /// Compiled automaton file.
    #[arg(short, long)]
    pub automaton: PathBuf,

    /// Input file to stream through the automaton.
    #[arg(short, long, required_unless_present = "list_outputs")]
    pub input: Option<PathBuf>,

    /// Output file; defaults to standard output.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// How to decode output content bytes.
    #[arg(short = 't', long, value_enum, default_value_t = OutputType::Auto)]
    pub output_type: OutputType,

    /// How to record emitted outputs.
    #[arg(short, long, value_enum, default_value_t = RecordMode::List)]
    pub record: RecordMode,

    /// Feed the input in blocks of this many bytes.
    #[arg(short = 's', long)]
    pub block_size: Option<usize>,

    /// Overlap between consecutive blocks, in bytes.
    #[arg(short = 'l', long, default_value_t = 0)]
    pub overlap: usize,

    /// Stream the input this many times.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub repetitions: usize,

    /// List every output of the automaton and exit.
    #[arg(short = 'L', long)]
    pub list_outputs: bool,

    /// Report only outputs emitted at the final input position.
    #[arg(short = 'f', long)]
    pub only_final: bool,
}

/// Streams an input file through a compiled automaton, reporting emitted
/// outputs.
pub fn main(args: CliArgs) -> Result<()> {
    let eudoxus = Eudoxus::load(&args.automaton)?;
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Could not create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    let output_type = match args.output_type {
        OutputType::Auto => match eudoxus.metadata().get("Output-Type").map(String::as_str) {
            Some("length") => OutputType::Length,
            Some("integer") => OutputType::Integer,
            Some("nop") => OutputType::Nop,
            _ => OutputType::String,
        },
        other => other,
    };

    if args.list_outputs {
        for content in eudoxus.outputs()? {
            writeln!(out, "{}", render(output_type, content))?;
        }
        return Ok(());
    }

    let Some(input_path) = args.input.as_ref() else {
        bail!("no input given");
    };
    let input = std::fs::read(input_path)
        .with_context(|| format!("Could not read {}", input_path.display()))?;
    if let Some(block_size) = args.block_size {
        if args.overlap >= block_size {
            bail!(
                "overlap {} must be smaller than the block size {}",
                args.overlap,
                block_size
            );
        }
    }
    let final_location = input.len() as u64;

    for _ in 0..args.repetitions {
        let mut count = 0u64;
        let mut lines: Vec<String> = Vec::new();
        {
            let mut execution = eudoxus.execution(|content: &[u8], location: u64| {
                if !(args.only_final && location != final_location) {
                    count += 1;
                    if args.record == RecordMode::List {
                        lines.push(format!("{:>8}: {}", location, render(output_type, content)));
                    }
                }
                Continue(())
            });
            let mut done = false;
            match args.block_size {
                // Feed the whole input at once.
                None => {
                    execution.execute(&input)?;
                }
                // Feed overlapping blocks, as a streaming benchmark would.
                Some(block_size) => {
                    let step = block_size - args.overlap;
                    let mut at = 0;
                    while at < input.len() && !done {
                        let block = &input[at..(at + block_size).min(input.len())];
                        done = execution.execute(block)? == Status::Ended;
                        at += step;
                    }
                }
            }
        }
        match args.record {
            RecordMode::List => {
                for line in &lines {
                    writeln!(out, "{}", line)?;
                }
            }
            RecordMode::Count => writeln!(out, "{}", count)?,
            RecordMode::Nop => {}
        }
    }
    out.flush()?;
    Ok(())
}

/// Renders output content bytes per the selected type.
fn render(output_type: OutputType, content: &[u8]) -> String {
    match output_type {
        OutputType::Auto | OutputType::String => {
            String::from_utf8_lossy(content).into_owned()
        }
        OutputType::Length => match content.try_into() {
            Ok(bytes) => u32::from_le_bytes(bytes).to_string(),
            Err(_) => format!("(malformed length of {} bytes)", content.len()),
        },
        OutputType::Integer => {
            if content.len() > 8 {
                return format!("(malformed integer of {} bytes)", content.len());
            }
            let mut bytes = [0u8; 8];
            bytes[..content.len()].copy_from_slice(content);
            u64::from_le_bytes(bytes).to_string()
        }
        OutputType::Nop => String::new(),
    }
}
