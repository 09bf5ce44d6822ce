//! Private module for selective re-export.

use super::{BinaryInvariant, InvariantSet};
use crate::trace::{EventId, TraceGraph, TransitiveClosure};
use crate::{temporal_relation, EventType, Options};
use id_set::IdSet;
use std::collections::{BTreeMap, BTreeSet};

/// Mines the binary temporal invariants that hold across all traces of
/// `graph`.
///
/// The set is extracted from the transitive closure, which over-approximates
/// in general but is exact for acyclic trace graphs: it never omits an
/// invariant that holds. Tautological invariants (either operand INITIAL or
/// TERMINAL) are filtered out, and the `INITIAL AFby x` family ("x happens
/// eventually") is reconstructed explicitly afterward.
pub fn mine(graph: &TraceGraph, options: &Options) -> InvariantSet {
    let mut mined = InvariantSet::new();
    for relation in graph.relation_names() {
        let tc = TransitiveClosure::compute(graph, relation, options.warshall_closure);
        for invariant in from_closure(graph, &tc) {
            if invariant.first.is_special() || invariant.second.is_special() {
                continue;
            }
            mined.insert(invariant);
        }
    }
    for invariant in initial_afby(graph) {
        mined.insert(invariant);
    }
    mined
}

/// The over-approximated invariants of one relation, dummies included.
fn from_closure(graph: &TraceGraph, tc: &TransitiveClosure) -> Vec<BinaryInvariant> {
    let mut buckets: BTreeMap<&EventType, Vec<EventId>> = BTreeMap::new();
    for event in graph.events() {
        buckets.entry(event.event_type()).or_default().push(event.id());
    }

    let mut mined = Vec::new();
    for (&type1, nodes1) in &buckets {
        for (&type2, nodes2) in &buckets {
            let mut never_followed = true;
            let mut always_followed = true;
            let mut always_preceded = true;
            for &node1 in nodes1 {
                let mut follower_found = false;
                let mut predecessor_found = false;
                for &node2 in nodes2 {
                    if tc.is_reachable(node1, node2) {
                        never_followed = false;
                        follower_found = true;
                    }
                    if tc.is_reachable(node2, node1) {
                        predecessor_found = true;
                    }
                }
                // type1 AFby type2 needs a follower for every type1 node;
                // type2 AP type1 needs a predecessor for every type1 node.
                if !follower_found {
                    always_followed = false;
                }
                if !predecessor_found {
                    always_preceded = false;
                }
            }
            if never_followed {
                mined.push(BinaryInvariant::never_followed_by(
                    type1.clone(),
                    type2.clone(),
                    tc.relation().clone(),
                ));
            }
            if always_followed {
                mined.push(BinaryInvariant::always_followed_by(
                    type1.clone(),
                    type2.clone(),
                    tc.relation().clone(),
                ));
            }
            if always_preceded && type1 != type2 {
                mined.push(BinaryInvariant::always_precedes(
                    type2.clone(),
                    type1.clone(),
                    tc.relation().clone(),
                ));
            }
        }
    }
    mined
}

/// Computes `INITIAL AFby x` ("x is eventual") by intersecting, across all
/// traces, the set of event types reachable from each trace's first events.
fn initial_afby(graph: &TraceGraph) -> Vec<BinaryInvariant> {
    // Group the dummy INITIAL's successors by the trace they open.
    let mut openers: BTreeMap<u32, Vec<EventId>> = BTreeMap::new();
    for t in graph.event(graph.initial_id()).transitions() {
        let trace_id = graph.event(t.target).trace_id();
        openers.entry(trace_id).or_default().push(t.target);
    }

    let mut eventual: Option<BTreeSet<&EventType>> = None;
    for opener_ids in openers.values() {
        let mut reached = BTreeSet::new();
        let mut visited = IdSet::new();
        for &opener in opener_ids {
            collect_types(graph, opener, &mut reached, &mut visited);
        }
        reached.retain(|etype| !etype.is_terminal());
        eventual = Some(match eventual {
            None => reached,
            Some(so_far) => so_far.intersection(&reached).copied().collect(),
        });
    }

    eventual
        .unwrap_or_default()
        .into_iter()
        .map(|etype| {
            BinaryInvariant::always_followed_by(
                EventType::Initial,
                etype.clone(),
                temporal_relation(),
            )
        })
        .collect()
}

fn collect_types<'g>(
    graph: &'g TraceGraph,
    node: EventId,
    reached: &mut BTreeSet<&'g EventType>,
    visited: &mut IdSet,
) {
    if !visited.insert(node.index()) {
        return;
    }
    reached.insert(graph.event(node).event_type());
    for t in graph.event(node).transitions() {
        collect_types(graph, t.target, reached, visited);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{afby, ap, multi_trace_graph, nfby};
    use crate::Options;

    fn mined(traces: &[&[&str]]) -> InvariantSet {
        mine(&multi_trace_graph(traces), &Options::default())
    }

    #[test]
    fn follows_literally_implies_afby() {
        let invs = mined(&[&["a", "x", "b"]]);
        assert!(invs.contains(&afby("a", "b")));
        assert!(invs.contains(&afby("a", "x")));

        // One trace where b never comes after a kills the invariant.
        let invs = mined(&[&["a", "x", "b"], &["a", "x"]]);
        assert!(!invs.contains(&afby("a", "b")));
        assert!(invs.contains(&afby("a", "x")));
    }

    #[test]
    fn mines_precedence_and_absence() {
        let invs = mined(&[&["a", "b"], &["a", "c"]]);
        assert!(invs.contains(&ap("a", "b")));
        assert!(invs.contains(&ap("a", "c")));
        assert!(invs.contains(&nfby("b", "a")));
        assert!(invs.contains(&nfby("b", "c")));
        assert!(!invs.contains(&nfby("a", "b")));
    }

    #[test]
    fn self_precedence_is_never_mined() {
        let invs = mined(&[&["a", "a", "b"]]);
        assert!(!invs.iter().any(|i| {
            i.kind == crate::invariant::InvariantKind::AlwaysPrecedes && i.first == i.second
        }));
    }

    #[test]
    fn operands_never_name_the_dummies_except_initial_afby() {
        let invs = mined(&[&["a", "b"], &["b"]]);
        for inv in invs.iter() {
            if inv.first.is_special() {
                assert_eq!(inv, &afby_initial("b"));
            }
            assert!(!inv.second.is_special(), "unexpected {}", inv);
        }
    }

    #[test]
    fn eventual_types_are_the_cross_trace_intersection() {
        let invs = mined(&[&["a", "x", "b"], &["a", "y", "b"]]);
        assert!(invs.contains(&afby_initial("a")));
        assert!(invs.contains(&afby_initial("b")));
        assert!(!invs.contains(&afby_initial("x")));
        assert!(!invs.contains(&afby_initial("y")));
    }

    fn afby_initial(label: &str) -> BinaryInvariant {
        BinaryInvariant::always_followed_by(
            EventType::Initial,
            EventType::label(label),
            temporal_relation(),
        )
    }
}
