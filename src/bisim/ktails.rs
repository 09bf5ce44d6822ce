//! Private module for selective re-export.

use crate::StateGraph;
use std::collections::HashMap;

/// k-Tails equivalence: `u` and `v` are k-equivalent iff their labels match
/// and, for `k > 0`, their outgoing transition trees agree to depth `k`
/// under every relation. With `subsumption`, only `u`'s transitions need
/// matches in `v`; otherwise the requirement is symmetric.
///
/// The traversal maintains a single consistent identification between the
/// two tails: once `u'` has been matched with `v'`, neither may be matched
/// with a different node at any depth. Re-encountering an established pair
/// is treated as already equal, which terminates on cyclic graphs. Two
/// same-labelled cycles of different lengths are therefore 1-equivalent but
/// not 2-equivalent: the deeper walk forces a node into two distinct
/// identifications.
pub fn k_equals<G: StateGraph>(
    graph: &G,
    u: G::Node,
    v: G::Node,
    k: usize,
    subsumption: bool,
) -> bool {
    let mut pairing = Pairing::new();
    k_equals_rec(graph, u, v, k, subsumption, &mut pairing)
}

/// The partial bijection built during a [`k_equals`] traversal, with an
/// undo log so failed match candidates can be backed out.
struct Pairing<N> {
    forward: HashMap<N, N>,
    backward: HashMap<N, N>,
    log: Vec<N>,
}

impl<N: Copy + Eq + std::hash::Hash> Pairing<N> {
    fn new() -> Self {
        Pairing {
            forward: HashMap::new(),
            backward: HashMap::new(),
            log: Vec::new(),
        }
    }

    fn mark(&mut self) -> usize {
        self.log.len()
    }

    fn undo_to(&mut self, mark: usize) {
        while self.log.len() > mark {
            let u = self.log.pop().expect("log is non-empty above the mark");
            let v = self.forward.remove(&u).expect("logged pairs are mapped");
            self.backward.remove(&v);
        }
    }

    fn record(&mut self, u: N, v: N) {
        self.forward.insert(u, v);
        self.backward.insert(v, u);
        self.log.push(u);
    }
}

fn k_equals_rec<G: StateGraph>(
    graph: &G,
    u: G::Node,
    v: G::Node,
    k: usize,
    subsumption: bool,
    pairing: &mut Pairing<G::Node>,
) -> bool {
    if graph.node_type(u) != graph.node_type(v) {
        return false;
    }
    let forward = pairing.forward.get(&u).copied();
    let backward = pairing.backward.get(&v).copied();
    match (forward, backward) {
        (Some(mapped), _) if mapped != v => return false,
        (_, Some(mapped)) if mapped != u => return false,
        (Some(_), _) => return true, // already identified with each other
        _ => pairing.record(u, v),
    }
    if k == 0 {
        return true;
    }

    for relation in graph.relations() {
        let tails_u = graph.successors(u, &relation);
        let tails_v = graph.successors(v, &relation);
        if !covers(graph, &tails_u, &tails_v, k, subsumption, pairing) {
            return false;
        }
        if !subsumption && !covers(graph, &tails_v, &tails_u, k, subsumption, pairing) {
            return false;
        }
    }
    true
}

/// True if every node of `from` matches some node of `to` at depth `k - 1`,
/// consistently with the pairing built so far.
///
/// Matches the head of `from` against each candidate in turn and recurses
/// on the remaining tails; a failure anywhere in that suffix backtracks
/// into the head's own choice, so an early tail never starves a later one
/// of the candidate only it can pair with.
fn covers<G: StateGraph>(
    graph: &G,
    from: &[G::Node],
    to: &[G::Node],
    k: usize,
    subsumption: bool,
    pairing: &mut Pairing<G::Node>,
) -> bool {
    let Some((&tail, rest)) = from.split_first() else {
        return true;
    };
    to.iter().any(|&candidate| {
        let mark = pairing.mark();
        if k_equals_rec(graph, tail, candidate, k - 1, subsumption, pairing)
            && covers(graph, rest, to, k, subsumption, pairing)
        {
            true
        } else {
            pairing.undo_to(mark);
            false
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{cyclic_graph, linear_graph};
    use crate::trace::{EventId, TraceGraph, TraceGraphBuilder};
    use crate::{EventType, StateGraph as _, DEFAULT_RELATION};

    fn assert_k_equal(g: &TraceGraph, u: EventId, v: EventId, k: usize) {
        // Without subsumption, equivalence is symmetric.
        assert!(k_equals(g, u, v, k, false), "expected {:?} ={}= {:?}", u, k, v);
        assert!(k_equals(g, v, u, k, false), "expected {:?} ={}= {:?}", v, k, u);
    }

    fn assert_not_k_equal(g: &TraceGraph, u: EventId, v: EventId, k: usize) {
        assert!(!k_equals(g, u, v, k, false), "expected {:?} !={}= {:?}", u, k, v);
        assert!(!k_equals(g, v, u, k, false), "expected {:?} !={}= {:?}", v, k, u);
    }

    #[test]
    fn depth_zero_is_label_equality() {
        let mut b = TraceGraphBuilder::new();
        let a1 = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let a2 = b.add_event(EventType::label("a"), 1, 1, None).unwrap();
        let c = b.add_event(EventType::label("c"), 2, 1, None).unwrap();
        let g = b.build().unwrap();

        assert_k_equal(&g, a1, a2, 0);
        assert_not_k_equal(&g, a1, c, 0);
        // Nodes with no tails are equal at any depth.
        assert_k_equal(&g, a1, a2, 100);
    }

    #[test]
    fn every_node_is_k_equal_to_itself() {
        let g = linear_graph(&["a", "b", "c", "d"]);
        for node in g.nodes() {
            for k in 0..5 {
                assert_k_equal(&g, node, node, k);
            }
        }
    }

    #[test]
    fn identical_chains_match_at_every_depth() {
        let mut b = TraceGraphBuilder::new();
        let t0 = b.chain(0, &["a", "b", "c", "d"]).unwrap();
        let t1 = b.chain(1, &["a", "b", "c", "d"]).unwrap();
        let g = b.build().unwrap();

        for i in 0..4 {
            for k in 0..5 {
                assert_k_equal(&g, t0[i], t1[i], k);
            }
        }
    }

    #[test]
    fn diverging_chains_match_to_the_divergence_depth() {
        let mut b = TraceGraphBuilder::new();
        let t0 = b.chain(0, &["a", "b", "c", "d"]).unwrap();
        let t1 = b.chain(1, &["a", "b", "c", "e"]).unwrap();
        let g = b.build().unwrap();

        assert_k_equal(&g, t0[0], t1[0], 2);
        assert_not_k_equal(&g, t0[0], t1[0], 3);
        assert_k_equal(&g, t0[1], t1[1], 1);
        assert_not_k_equal(&g, t0[1], t1[1], 2);
        assert_k_equal(&g, t0[2], t1[2], 0);
        assert_not_k_equal(&g, t0[2], t1[2], 1);
    }

    #[test]
    fn chain_head_differs_from_chain_tail() {
        let mut b = TraceGraphBuilder::new();
        let t = b.chain(0, &["a", "a", "a"]).unwrap();
        let g = b.build().unwrap();
        // The last a leads to TERMINAL while the first leads to another a.
        assert_not_k_equal(&g, t[0], t[2], 1);
    }

    #[test]
    fn cycles_of_different_lengths_diverge_at_depth_two() {
        let (g, heads) = cyclic_graph(&[3, 2]);
        assert_k_equal(&g, heads[0], heads[1], 0);
        assert_k_equal(&g, heads[0], heads[1], 1);
        assert_not_k_equal(&g, heads[0], heads[1], 2);
        assert_not_k_equal(&g, heads[0], heads[1], 3);
    }

    #[test]
    fn self_loop_differs_from_a_two_cycle() {
        let (g, heads) = cyclic_graph(&[1, 2]);
        assert_k_equal(&g, heads[0], heads[1], 0);
        assert_not_k_equal(&g, heads[0], heads[1], 1);
        assert_not_k_equal(&g, heads[0], heads[1], 2);
    }

    #[test]
    fn equal_length_cycles_match_at_every_depth() {
        let (g, heads) = cyclic_graph(&[4, 4]);
        for k in 0..10 {
            assert_k_equal(&g, heads[0], heads[1], k);
        }
    }

    #[test]
    fn a_cycle_differs_from_its_unrolling() {
        // A 4-cycle a->b->c->d->a against a chain a->b->c->d->a': equal
        // until the walk closes the cycle, which would identify the cycle
        // head with two different nodes.
        let mut b = TraceGraphBuilder::new();
        let mut cycle = Vec::new();
        for (i, label) in ["a", "b", "c", "d"].iter().enumerate() {
            cycle.push(b.add_event(EventType::label(*label), 0, i as u32, None).unwrap());
        }
        for i in 0..4 {
            b.add_edge(cycle[i], cycle[(i + 1) % 4], DEFAULT_RELATION).unwrap();
        }
        let mut chain = Vec::new();
        for (i, label) in ["a", "b", "c", "d", "a"].iter().enumerate() {
            chain.push(b.add_event(EventType::label(*label), 1, i as u32, None).unwrap());
        }
        for i in 0..4 {
            b.add_edge(chain[i], chain[i + 1], DEFAULT_RELATION).unwrap();
        }
        let g = b.build().unwrap();

        for k in 0..4 {
            assert_k_equal(&g, cycle[0], chain[0], k);
        }
        assert_not_k_equal(&g, cycle[0], chain[0], 4);
    }

    #[test]
    fn topologically_identical_double_loops_match() {
        // Two graphs, each with a 4-cycle and a 3-cycle sharing the head
        // node, built in opposite orders.
        let build_double_loop = |b: &mut TraceGraphBuilder, trace: u32, reversed: bool| {
            let labels = ["a", "b", "c", "d", "b", "c"];
            let mut ids = Vec::new();
            for (i, label) in labels.iter().enumerate() {
                ids.push(
                    b.add_event(EventType::label(*label), trace, i as u32, None)
                        .unwrap(),
                );
            }
            let mut wire_big = |b: &mut TraceGraphBuilder| {
                b.add_edge(ids[0], ids[1], DEFAULT_RELATION).unwrap();
                b.add_edge(ids[1], ids[2], DEFAULT_RELATION).unwrap();
                b.add_edge(ids[2], ids[3], DEFAULT_RELATION).unwrap();
                b.add_edge(ids[3], ids[0], DEFAULT_RELATION).unwrap();
            };
            let mut wire_small = |b: &mut TraceGraphBuilder| {
                b.add_edge(ids[0], ids[4], DEFAULT_RELATION).unwrap();
                b.add_edge(ids[4], ids[5], DEFAULT_RELATION).unwrap();
                b.add_edge(ids[5], ids[0], DEFAULT_RELATION).unwrap();
            };
            if reversed {
                wire_small(b);
                wire_big(b);
            } else {
                wire_big(b);
                wire_small(b);
            }
            ids[0]
        };

        let mut b = TraceGraphBuilder::new();
        let head1 = build_double_loop(&mut b, 0, false);
        let head2 = build_double_loop(&mut b, 1, true);
        let g = b.build().unwrap();

        for k in 0..6 {
            assert_k_equal(&g, head1, head2, k);
        }
    }

    #[test]
    fn an_early_match_must_not_starve_a_later_tail() {
        // u's first tail can pair with either of v's tails, but u's second
        // tail only with the one that is wired first on the v side. Finding
        // the valid assignment u1 <-> v1, u2 <-> v2 therefore requires
        // backing out of the first tail's initial choice.
        let mut b = TraceGraphBuilder::new();
        let u = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let u1 = b.add_event(EventType::label("b"), 0, 2, None).unwrap();
        let u2 = b.add_event(EventType::label("b"), 0, 3, None).unwrap();
        let m = b.add_event(EventType::label("c"), 0, 4, None).unwrap();
        b.add_edge(u, u1, DEFAULT_RELATION).unwrap();
        b.add_edge(u, u2, DEFAULT_RELATION).unwrap();
        b.add_edge(u1, u, DEFAULT_RELATION).unwrap();
        b.add_edge(u2, u, DEFAULT_RELATION).unwrap();
        b.add_edge(u2, m, DEFAULT_RELATION).unwrap();

        let v = b.add_event(EventType::label("a"), 1, 1, None).unwrap();
        let v1 = b.add_event(EventType::label("b"), 1, 2, None).unwrap();
        let v2 = b.add_event(EventType::label("b"), 1, 3, None).unwrap();
        let n = b.add_event(EventType::label("c"), 1, 4, None).unwrap();
        // v2 first: under subsumption it accepts u1 (its extra c tail is
        // free), yet it is the only possible partner for u2.
        b.add_edge(v, v2, DEFAULT_RELATION).unwrap();
        b.add_edge(v, v1, DEFAULT_RELATION).unwrap();
        b.add_edge(v1, v, DEFAULT_RELATION).unwrap();
        b.add_edge(v2, v, DEFAULT_RELATION).unwrap();
        b.add_edge(v2, n, DEFAULT_RELATION).unwrap();
        let g = b.build().unwrap();

        assert!(k_equals(&g, u, v, 2, true));
        assert_k_equal(&g, u, v, 2);
        assert_k_equal(&g, u, v, 5);
    }

    #[test]
    fn subsumption_drops_the_reverse_requirement() {
        // u's only tail is covered by v, but v branches to an extra label.
        let mut b = TraceGraphBuilder::new();
        let u = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let ub = b.add_event(EventType::label("b"), 0, 2, None).unwrap();
        b.add_edge(u, ub, DEFAULT_RELATION).unwrap();

        let v = b.add_event(EventType::label("a"), 1, 1, None).unwrap();
        let vb = b.add_event(EventType::label("b"), 1, 2, None).unwrap();
        let vc = b.add_event(EventType::label("c"), 1, 3, None).unwrap();
        b.add_edge(v, vb, DEFAULT_RELATION).unwrap();
        b.add_edge(v, vc, DEFAULT_RELATION).unwrap();
        let g = b.build().unwrap();

        // The b tails both lead straight to TERMINAL, so depth 1 is where
        // the comparison stays within the labelled events.
        assert!(k_equals(&g, u, v, 1, true));
        assert!(!k_equals(&g, u, v, 1, false));
    }
}
