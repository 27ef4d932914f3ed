/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::codec::{Reader, Writer};
use crate::reporter::LogReporter;
use crate::transform::{
    deduplicate_outputs, optimize_all_edges, translate_nonadvancing, TranslateVariant,
};
use anyhow::Result;
use clap::{Args, ValueEnum};
use std::io::Write;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
/// CLI mirror of [`TranslateVariant`], so the library enum does not need
/// to know about clap.
pub enum PrivTranslateVariant {
    Conservative,
    Aggressive,
    Structural,
}

impl From<PrivTranslateVariant> for TranslateVariant {
    fn from(value: PrivTranslateVariant) -> Self {
        match value {
            PrivTranslateVariant::Conservative => TranslateVariant::Conservative,
            PrivTranslateVariant::Aggressive => TranslateVariant::Aggressive,
            PrivTranslateVariant::Structural => TranslateVariant::Structural,
        }
    }
}

#[derive(Args, Debug)]
pub struct CliArgs {
    /// Canonicalize edge lists (optimize_edges on every node).
    #[arg(long)]
    pub edges: bool,

    /// Merge identical output records.
    #[arg(long)]
    pub dedup_outputs: bool,

    /// Rewrite non-advancing transitions with the given variant.
    #[arg(long, value_enum)]
    pub translate_nonadvancing: Option<PrivTranslateVariant>,

    /// Preset for execution speed: edge canonicalization, aggressive
    /// non-advancing translation, output deduplication.
    #[arg(long, conflicts_with_all = ["edges", "dedup_outputs", "translate_nonadvancing", "space"])]
    pub fast: bool,

    /// Preset for automaton size: edge canonicalization, structural
    /// non-advancing translation, output deduplication.
    #[arg(long, conflicts_with_all = ["edges", "dedup_outputs", "translate_nonadvancing"])]
    pub space: bool,
}

/// Reads an intermediate stream on standard input, applies the selected
/// passes and writes the result to standard output.
pub fn main(args: CliArgs) -> Result<()> {
    let mut reporter = LogReporter;
    let mut reader = Reader::new();
    let mut automaton = reader.read(std::io::stdin().lock(), &mut reporter)?;
    if !reader.clean() {
        log::warn!("input stream decoded with warnings");
    }

    let (edges, translate, dedup) = if args.fast {
        (true, Some(TranslateVariant::Aggressive), true)
    } else if args.space {
        (true, Some(TranslateVariant::Structural), true)
    } else {
        (
            args.edges,
            args.translate_nonadvancing.map(Into::into),
            args.dedup_outputs,
        )
    };

    if edges {
        optimize_all_edges(&mut automaton);
    }
    if let Some(variant) = translate {
        let rewrites = translate_nonadvancing(&mut automaton, variant);
        log::info!("{} non-advancing rewrites", rewrites);
    }
    if dedup {
        let merged = deduplicate_outputs(&mut automaton);
        log::info!("{} output records merged", merged);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    Writer::new().write(&automaton, &mut out)?;
    out.flush()?;
    Ok(())
}
