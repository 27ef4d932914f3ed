/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The `ironautomata` command-line tool.
//!
//! One subcommand per pipeline stage: [`generate`] builds an automaton
//! from keywords on standard input, [`optimize`] rewrites an intermediate
//! stream, [`compile`] produces a Eudoxus file and [`run`] streams input
//! through one.

pub mod compile;
pub mod dot;
pub mod generate;
pub mod optimize;
pub mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

#[derive(Parser, Debug)]
#[command(name = "ironautomata", version)]
/// Streaming Aho-Corasick automata: generate, optimize, compile and run.
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an automaton from keywords read on standard input.
    Generate(generate::CliArgs),
    /// Rewrite an intermediate stream with the optimizer passes.
    Optimize(optimize::CliArgs),
    /// Compile an intermediate stream into a Eudoxus file.
    Compile(compile::CliArgs),
    /// Stream input through a compiled automaton.
    Run(run::CliArgs),
    /// Render an intermediate stream as a Graphviz digraph.
    Dot(dot::CliArgs),
}

/// Initializes the logger from the environment, defaulting to `info`.
pub fn init_env_logger() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()?;
    Ok(())
}

/// Entry point of the CLI.
pub fn cli_main(args: impl IntoIterator<Item = OsString>) -> Result<()> {
    match Cli::parse_from(args).command {
        Command::Generate(args) => generate::main(args),
        Command::Optimize(args) => optimize::main(args),
        Command::Compile(args) => compile::main(args),
        Command::Run(args) => run::main(args),
        Command::Dot(args) => dot::main(args),
    }
}
