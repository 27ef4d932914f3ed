/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Pattern shortcut matching through the full pipeline.

use ironautomata::ac::AcBuilder;
use ironautomata::eudoxus::{compile, CompileConfig, Eudoxus, Status};
use ironautomata::graph::Automaton;
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

fn pattern_automaton(patterns: &[&str]) -> Automaton {
    let mut builder = AcBuilder::new();
    for pattern in patterns {
        builder.add_pattern(pattern, pattern.as_bytes()).unwrap();
    }
    builder.finish().unwrap()
}

/// End positions at which `pattern` matches `text`.
fn ends_of(patterns: &[&str], pattern: &str, text: &[u8]) -> Vec<u64> {
    run(&pattern_automaton(patterns), text)
        .into_iter()
        .filter(|(_, content)| content == pattern.as_bytes())
        .map(|(p, _)| p)
        .collect()
}

#[test]
fn test_uppercase_shortcut() {
    assert_eq!(
        ends_of(&[r"\u"], r"\u", b"ABCdefGHI"),
        vec![1, 2, 3, 7, 8, 9]
    );
}

#[test]
fn test_case_shortcuts_share_a_trie() {
    let patterns = [r"foo\lbar", r"foo\ubar", r"foo\abar"];
    let text = b"foobar fooabar fooAbar fooAbaz hello world";
    assert_eq!(ends_of(&patterns, r"foo\abar", text), vec![14, 22]);
    assert_eq!(ends_of(&patterns, r"foo\lbar", text), vec![14]);
    assert_eq!(ends_of(&patterns, r"foo\ubar", text), vec![22]);
}

#[test]
fn test_class_equivalences() {
    // Every byte once, so the match sets characterize the byte sets.
    let text: Vec<u8> = (0..=255).collect();
    assert_eq!(
        ends_of(&["[a-fA-F0-9]"], "[a-fA-F0-9]", &text),
        ends_of(&[r"\h"], r"\h", &text)
    );
    assert_eq!(
        ends_of(&["[^0-9]"], "[^0-9]", &text),
        ends_of(&[r"\D"], r"\D", &text)
    );
}

#[test]
fn test_digit_shortcut_across_keywords() {
    let mut builder = AcBuilder::new();
    builder.add(b"x1").unwrap();
    builder.add_pattern(r"x\d", b"x-digit").unwrap();
    let automaton = builder.finish().unwrap();

    // "x1" hits both the literal keyword and the pattern.
    let matches = run(&automaton, b"x1 x2 xa");
    assert!(matches.contains(&(2, b"x1".to_vec())));
    assert!(matches.contains(&(2, b"x-digit".to_vec())));
    assert!(matches.contains(&(5, b"x-digit".to_vec())));
    assert!(!matches.iter().any(|&(p, _)| p == 8));
}

#[test]
fn test_case_insensitive_escape() {
    let matches = run(&pattern_automaton(&[r"\iq\iu"]), b"qu QU Qu qU q_");
    let positions: Vec<u64> = matches.iter().map(|&(p, _)| p).collect();
    assert_eq!(positions, vec![2, 5, 8, 11]);
}

#[test]
fn test_any_byte_shortcut() {
    // "a\.c" matches any middle byte, including another 'a'.
    let matches = run(&pattern_automaton(&[r"a\.c"]), b"abc aac axc ab");
    let positions: Vec<u64> = matches.iter().map(|&(p, _)| p).collect();
    assert_eq!(positions, vec![3, 7, 11]);
}

#[test]
fn test_dollar_and_whitespace() {
    let matches = run(&pattern_automaton(&[r"end\$"]), b"end\nend\rend");
    let positions: Vec<u64> = matches.iter().map(|&(p, _)| p).collect();
    assert_eq!(positions, vec![4, 8]);

    let matches = run(&pattern_automaton(&[r"a\sb"]), b"a b a\tb a_b");
    let positions: Vec<u64> = matches.iter().map(|&(p, _)| p).collect();
    assert_eq!(positions, vec![3, 7]);
}
