/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Intermediate stream round-trips and reader diagnostics.

use ironautomata::ac::AcBuilder;
use ironautomata::codec::{DecodeError, Reader, Writer};
use ironautomata::graph::{Automaton, Edge};
use ironautomata::reporter::{FnReporter, NopReporter, Severity};

fn sample_automaton() -> Automaton {
    let mut builder = AcBuilder::new();
    for keyword in ["he", "she", "his", "hers"] {
        builder.add(keyword.as_bytes()).unwrap();
    }
    builder.add_pattern(r"h\dr", b"h-digit-r").unwrap();
    let mut automaton = builder.finish().unwrap();
    automaton
        .metadata_mut()
        .insert("Output-Type".into(), "string".into());
    automaton.metadata_mut().insert("Origin".into(), "test".into());
    automaton
}

fn round_trip(automaton: &Automaton, writer: Writer) -> Automaton {
    let mut stream = Vec::new();
    writer.write(automaton, &mut stream).unwrap();
    let mut reader = Reader::new();
    let decoded = reader.read(stream.as_slice(), &mut NopReporter).unwrap();
    assert!(reader.success());
    decoded
}

#[test]
fn test_round_trip_is_identity() {
    let automaton = sample_automaton();
    let decoded = round_trip(&automaton, Writer::new());
    assert_eq!(decoded, automaton);
}

#[test]
fn test_chunked_round_trip() {
    let automaton = sample_automaton();
    // Tiny chunks: every node and output in its own frame.
    let mut stream = Vec::new();
    Writer::new()
        .with_chunk_size(1)
        .write(&automaton, &mut stream)
        .unwrap();
    // More than one frame, each with its 4-byte length prefix.
    assert!(stream.len() > 4 * (automaton.num_nodes() + automaton.num_outputs()));
    let mut reader = Reader::new();
    let decoded = reader.read(stream.as_slice(), &mut NopReporter).unwrap();
    assert!(reader.success());
    assert!(reader.clean());
    assert_eq!(decoded, automaton);
}

#[test]
fn test_bitmap_edges_survive() {
    let mut automaton = Automaton::new();
    let start = automaton.start();
    let big = automaton.add_node();
    let small = automaton.add_node();
    automaton
        .node_mut(start)
        .edges_mut()
        .push(Edge::from_values(big, true, (0..100).collect()));
    automaton
        .node_mut(start)
        .edges_mut()
        .push(Edge::single(small, false, 200));
    automaton.node_mut(start).edges_mut().push(Edge::epsilon(small, true));

    let decoded = round_trip(&automaton, Writer::new());
    assert_eq!(decoded, automaton);
    assert!(decoded.node(start).edges()[0].is_bitmap());
    assert!(!decoded.node(start).edges()[1].is_bitmap());
    assert!(decoded.node(start).edges()[2].is_epsilon());
}

#[test]
fn test_unreferenced_node_is_a_warning() {
    let mut automaton = sample_automaton();
    let _orphan = automaton.add_node();

    let mut stream = Vec::new();
    Writer::new().write(&automaton, &mut stream).unwrap();
    let mut warnings = Vec::new();
    let mut reporter = FnReporter(|severity: Severity, _: &str, message: &str| {
        assert_eq!(severity, Severity::Warning);
        warnings.push(message.to_owned());
    });
    let mut reader = Reader::new();
    let decoded = reader.read(stream.as_slice(), &mut reporter).unwrap();
    assert!(reader.success());
    assert!(!reader.clean());
    assert!(warnings.iter().any(|w| w.contains("never referenced")));
    // The orphan is still materialized; compilation would ignore it.
    assert_eq!(decoded.num_nodes(), automaton.num_nodes());
}

#[test]
fn test_truncated_stream_is_an_error() {
    let automaton = sample_automaton();
    let mut stream = Vec::new();
    Writer::new().write(&automaton, &mut stream).unwrap();

    let mut reader = Reader::new();
    let result = reader.read(&stream[..stream.len() - 3], &mut NopReporter);
    assert!(matches!(
        result,
        Err(DecodeError::TruncatedChunk { .. }) | Err(DecodeError::Payload(_))
    ));
    assert!(!reader.success());
    assert!(!reader.clean());
}

#[test]
fn test_empty_stream_is_an_error() {
    let mut reader = Reader::new();
    let result = reader.read(&[][..], &mut NopReporter);
    assert!(matches!(
        result,
        Err(DecodeError::Undefined { kind: "node", id: 1 })
    ));
    assert!(!reader.success());
}

#[test]
fn test_large_vector_is_a_warning() {
    let mut automaton = Automaton::new();
    let start = automaton.start();
    let target = automaton.add_node();
    // A 40-value vector representation; the writer keeps representations,
    // the reader flags the oversized vector.
    let mut edge = Edge::epsilon(target, true);
    for value in 0..40u8 {
        edge.add(value);
    }
    assert!(!edge.is_bitmap());
    automaton.node_mut(start).edges_mut().push(edge);

    let mut stream = Vec::new();
    Writer::new().write(&automaton, &mut stream).unwrap();
    let mut saw_warning = false;
    let mut reporter = FnReporter(|severity: Severity, _: &str, _: &str| {
        saw_warning |= severity == Severity::Warning;
    });
    let mut reader = Reader::new();
    let decoded = reader.read(stream.as_slice(), &mut reporter).unwrap();
    assert!(saw_warning);
    assert!(!reader.clean());
    assert_eq!(decoded, automaton);
}
