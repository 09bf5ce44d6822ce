//! Utilities for tests.

use crate::invariant::BinaryInvariant;
use crate::time::Timestamp;
use crate::trace::{EventId, TraceGraph, TraceGraphBuilder};
use crate::{temporal_relation, EventType, DEFAULT_RELATION};

/// A trace graph holding one totally ordered trace.
pub fn linear_graph(labels: &[&str]) -> TraceGraph {
    multi_trace_graph(&[labels])
}

/// A trace graph holding one totally ordered trace per entry.
pub fn multi_trace_graph(traces: &[&[&str]]) -> TraceGraph {
    let mut builder = TraceGraphBuilder::new();
    for (trace_id, labels) in traces.iter().enumerate() {
        builder
            .chain(trace_id as u32, labels)
            .expect("test trace is well formed");
    }
    builder.build().expect("test graph is well formed")
}

/// A graph of disjoint same-labelled cycles, one per requested length;
/// returns the graph and the head node of each cycle. Cycles cannot come
/// from parsed traces (vector time admits no cycles), so they are wired
/// explicitly.
pub fn cyclic_graph(lengths: &[usize]) -> (TraceGraph, Vec<EventId>) {
    let mut builder = TraceGraphBuilder::new();
    let mut heads = Vec::with_capacity(lengths.len());
    for (trace_id, &len) in lengths.iter().enumerate() {
        let mut ids = Vec::with_capacity(len);
        for i in 0..len {
            ids.push(
                builder
                    .add_event(
                        EventType::label("a"),
                        trace_id as u32,
                        i as u32 + 1,
                        Some(Timestamp::Count(i as u64)),
                    )
                    .expect("test event is well formed"),
            );
        }
        for i in 0..len {
            builder
                .add_edge(ids[i], ids[(i + 1) % len], DEFAULT_RELATION)
                .expect("test edge is well formed");
        }
        heads.push(ids[0]);
    }
    (builder.build().expect("test graph is well formed"), heads)
}

/// `a AFby b` over the default relation.
pub fn afby(a: &str, b: &str) -> BinaryInvariant {
    BinaryInvariant::always_followed_by(
        EventType::label(a),
        EventType::label(b),
        temporal_relation(),
    )
}

/// `a AP b` over the default relation.
pub fn ap(a: &str, b: &str) -> BinaryInvariant {
    BinaryInvariant::always_precedes(EventType::label(a), EventType::label(b), temporal_relation())
}

/// `a NFby b` over the default relation.
pub fn nfby(a: &str, b: &str) -> BinaryInvariant {
    BinaryInvariant::never_followed_by(
        EventType::label(a),
        EventType::label(b),
        temporal_relation(),
    )
}
