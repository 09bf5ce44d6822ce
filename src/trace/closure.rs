//! Private module for selective re-export.

use super::{EventId, TraceGraph};
use crate::Relation;
use id_set::IdSet;

/// The reachability matrix of a [`TraceGraph`] under one relation.
///
/// Rows are bit-packed ([`IdSet`]), so the whole matrix costs O(N²/8) bytes.
/// It is computed once per mining run and discarded afterward.
pub struct TransitiveClosure {
    relation: Relation,
    reach: Vec<IdSet>,
}

impl TransitiveClosure {
    /// Computes the closure with the iterative Warshall algorithm: the
    /// matrix starts from the direct edges, then `reach(u, w) ∧ reach(w, v)`
    /// implies `reach(u, v)` until nothing changes.
    pub fn warshall(graph: &TraceGraph, relation: &str) -> Self {
        let mut closure = Self::direct(graph, relation);
        let n = closure.reach.len();
        for w in 0..n {
            let row_w = closure.reach[w].clone();
            for u in 0..n {
                if closure.reach[u].contains(w) {
                    for v in row_w.iter() {
                        closure.reach[u].insert(v);
                    }
                }
            }
        }
        closure
    }

    /// Computes the closure by depth-first marking from each node.
    pub fn depth_first(graph: &TraceGraph, relation: &str) -> Self {
        let mut closure = Self::direct(graph, relation);
        let n = closure.reach.len();
        for u in 0..n {
            let mut stack: Vec<usize> = closure.reach[u].iter().collect();
            while let Some(w) = stack.pop() {
                // reach[u] already contains w; push w's direct successors
                // that u cannot reach yet.
                for t in graph.events()[w].transitions_with(&closure.relation) {
                    let v = t.target.index();
                    if closure.reach[u].insert(v) {
                        stack.push(v);
                    }
                }
            }
        }
        closure
    }

    /// Strategy selection for the `warshall-transitive-closure` option.
    pub fn compute(graph: &TraceGraph, relation: &str, warshall: bool) -> Self {
        if warshall {
            Self::warshall(graph, relation)
        } else {
            Self::depth_first(graph, relation)
        }
    }

    /// Answers `u -*-> v` in O(1).
    pub fn is_reachable(&self, u: EventId, v: EventId) -> bool {
        self.reach[u.index()].contains(v.index())
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    fn direct(graph: &TraceGraph, relation: &str) -> Self {
        let relation: Relation = relation.into();
        let reach = graph
            .events()
            .iter()
            .map(|e| {
                let mut row = IdSet::new();
                for t in e.transitions_with(&relation) {
                    row.insert(t.target.index());
                }
                row
            })
            .collect();
        TransitiveClosure { relation, reach }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::linear_graph;
    use crate::trace::TraceGraphBuilder;
    use crate::{EventType, StateGraph, DEFAULT_RELATION};

    #[test]
    fn acyclic_closure_is_exactly_reachability() {
        let g = linear_graph(&["a", "b", "c"]);
        for strategy in [true, false] {
            let tc = TransitiveClosure::compute(&g, DEFAULT_RELATION, strategy);
            let ids = g.nodes();
            // Reachability on a chain is exactly the index order
            // INITIAL < a < b < c < TERMINAL.
            let order = |id: EventId| match id.index() {
                0 => 0,            // INITIAL
                1 => 4,            // TERMINAL
                i => i - 1,        // a, b, c
            };
            for &u in &ids {
                for &v in &ids {
                    assert_eq!(
                        tc.is_reachable(u, v),
                        order(u) < order(v),
                        "{:?} -> {:?} (warshall={})",
                        u,
                        v,
                        strategy
                    );
                }
            }
        }
    }

    #[test]
    fn every_node_of_a_cycle_reaches_every_node() {
        let mut b = TraceGraphBuilder::new();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(b.add_event(EventType::label("a"), 0, i, None).unwrap());
        }
        for i in 0..4 {
            b.add_edge(ids[i], ids[(i + 1) % 4], DEFAULT_RELATION).unwrap();
        }
        let g = b.build().unwrap();

        for strategy in [true, false] {
            let tc = TransitiveClosure::compute(&g, DEFAULT_RELATION, strategy);
            for &u in &ids {
                for &v in &ids {
                    assert!(tc.is_reachable(u, v));
                }
            }
        }
    }

    #[test]
    fn strategies_agree_on_a_dag() {
        let mut b = TraceGraphBuilder::new();
        let a = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let x = b.add_event(EventType::label("x"), 0, 2, None).unwrap();
        let y = b.add_event(EventType::label("y"), 0, 3, None).unwrap();
        let d = b.add_event(EventType::label("d"), 0, 4, None).unwrap();
        b.add_edge(a, x, DEFAULT_RELATION).unwrap();
        b.add_edge(a, y, DEFAULT_RELATION).unwrap();
        b.add_edge(x, d, DEFAULT_RELATION).unwrap();
        b.add_edge(y, d, DEFAULT_RELATION).unwrap();
        let g = b.build().unwrap();

        let via_warshall = TransitiveClosure::warshall(&g, DEFAULT_RELATION);
        let via_dfs = TransitiveClosure::depth_first(&g, DEFAULT_RELATION);
        for &u in &g.nodes() {
            for &v in &g.nodes() {
                assert_eq!(via_warshall.is_reachable(u, v), via_dfs.is_reachable(u, v));
            }
        }
        assert!(via_warshall.is_reachable(a, d));
        assert!(!via_warshall.is_reachable(x, y));
    }
}
