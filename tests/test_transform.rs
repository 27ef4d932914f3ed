/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Optimizer passes preserve matching semantics end to end.

use ironautomata::ac::AcBuilder;
use ironautomata::eudoxus::{compile, CompileConfig, Eudoxus, Status};
use ironautomata::graph::Automaton;
use ironautomata::transform::{
    deduplicate_outputs, optimize_all_edges, translate_nonadvancing, TranslateVariant,
};
use std::ops::ControlFlow::Continue;

fn run(automaton: &Automaton, text: &[u8]) -> Vec<(u64, Vec<u8>)> {
    let (bytes, _) = compile(automaton, &CompileConfig::default()).unwrap();
    let eudoxus = Eudoxus::from_bytes(bytes).unwrap();
    let mut matches = Vec::new();
    let mut execution = eudoxus.execution(|content: &[u8], location: u64| {
        matches.push((location, content.to_vec()));
        Continue(())
    });
    let status = execution.execute(text).unwrap();
    assert!(matches!(status, Status::NeedsInput | Status::Ended));
    drop(execution);
    matches.sort();
    matches
}

fn sample_automaton() -> Automaton {
    let mut builder = AcBuilder::new();
    for keyword in ["he", "she", "his", "hers", "a", "aa"] {
        builder.add(keyword.as_bytes()).unwrap();
    }
    builder.add_pattern(r"h\dr", b"h-digit-r").unwrap();
    builder.finish().unwrap()
}

const TEXT: &[u8] = b"she saw his world as he saw hers... h2r aa h9r";

#[test]
fn test_optimize_edges_preserves_matches() {
    let automaton = sample_automaton();
    let baseline = run(&automaton, TEXT);
    let mut optimized = automaton.clone();
    optimize_all_edges(&mut optimized);
    assert_eq!(run(&optimized, TEXT), baseline);
}

#[test]
fn test_deduplicate_outputs_preserves_matches() {
    let automaton = sample_automaton();
    let baseline = run(&automaton, TEXT);
    let mut deduplicated = automaton.clone();
    deduplicate_outputs(&mut deduplicated);
    assert_eq!(run(&deduplicated, TEXT), baseline);
    // Idempotence, through the engine as well.
    deduplicate_outputs(&mut deduplicated);
    assert_eq!(run(&deduplicated, TEXT), baseline);
}

#[test]
fn test_translate_nonadvancing_preserves_matches() {
    let baseline = run(&sample_automaton(), TEXT);
    for variant in [
        TranslateVariant::Conservative,
        TranslateVariant::Aggressive,
        TranslateVariant::Structural,
    ] {
        let mut translated = sample_automaton();
        translate_nonadvancing(&mut translated, variant);
        assert_eq!(run(&translated, TEXT), baseline, "{:?}", variant);
    }
}

#[test]
fn test_whole_pipeline_preserves_matches() {
    let automaton = sample_automaton();
    let baseline = run(&automaton, TEXT);
    let mut optimized = automaton.clone();
    optimize_all_edges(&mut optimized);
    let rewrites = translate_nonadvancing(&mut optimized, TranslateVariant::Aggressive);
    deduplicate_outputs(&mut optimized);
    assert_eq!(run(&optimized, TEXT), baseline);
    // The pattern automaton has failure links to deeper nodes, so the
    // aggressive pass has something to do.
    assert!(rewrites > 0);
}

#[test]
fn test_dedup_shrinks_pattern_copies() {
    // Pattern splitting deep-copies output chains; deduplication folds
    // the copies back together.
    let mut builder = AcBuilder::new();
    builder.add_pattern(r"\d\d", b"two-digits").unwrap();
    let mut automaton = builder.finish().unwrap();
    let live_before = automaton.num_outputs();
    let merged = deduplicate_outputs(&mut automaton);
    let baseline = run(&automaton, b"12 3 45");
    assert!(merged > 0 || live_before == 1);
    assert_eq!(
        baseline
            .iter()
            .filter(|(_, content)| content == b"two-digits")
            .map(|&(p, _)| p)
            .collect::<Vec<_>>(),
        vec![2, 7]
    );
}
