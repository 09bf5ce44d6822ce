//! The finite-state-machine invariant checker.
//!
//! Two checking modes share one worklist fixpoint driver. The *bit-set*
//! mode ([`which_fail`]) evaluates many invariants at once, one bit per
//! invariant and automaton state, and returns the summary set of failed
//! invariants. The *tracing* mode ([`counter_example`]) runs one invariant
//! with per-state history records and returns the shortest path witnessing
//! the failure.
//!
//! Both modes are generic over [`StateGraph`], so they run against the raw
//! trace graph and against partition abstractions of it alike.

mod fsm;
mod path;
mod tracing;

pub use fsm::which_fail;
pub use path::CounterExamplePath;
pub use tracing::counter_example;

use crate::{EventType, StateGraph};
use std::collections::{HashMap, HashSet, VecDeque};

/// One node's worth of simulated automaton state, propagated through the
/// graph until fixpoint.
///
/// Implementations form a finite-height lattice per invariant: `merge_with`
/// is the join, and `is_subset_of` detects that a merge would be a no-op,
/// which is what terminates the propagation.
pub trait StateSet<N>: Clone {
    /// Installs the state for an initial node of type `etype`.
    fn set_initial(&mut self, node: N, etype: &EventType);

    /// Advances every tracked automaton on an input of type `etype`,
    /// arriving at `node`.
    fn transition(&mut self, node: N, etype: &EventType);

    /// True if merging `self` into `other` would change nothing.
    fn is_subset_of(&self, other: &Self) -> bool;

    /// Joins `other` into `self`.
    fn merge_with(&mut self, other: &Self);

    /// True if any tracked automaton is in its failure state.
    fn is_fail(&self) -> bool;
}

/// Propagates `seed` to a fixpoint over `graph`, walking edges of one
/// relation: classical forward data-flow over a finite lattice.
///
/// With `early_exit`, returns as soon as a failure state reaches an
/// accepting node; the caller only wants one witness.
pub(crate) fn run_fixpoint<G, S>(
    graph: &G,
    relation: &str,
    seed: &S,
    early_exit: bool,
) -> HashMap<G::Node, S>
where
    G: StateGraph,
    S: StateSet<G::Node>,
{
    let mut states: HashMap<G::Node, S> = graph
        .nodes()
        .into_iter()
        .map(|n| (n, seed.clone()))
        .collect();

    let mut worklist: VecDeque<G::Node> = VecDeque::new();
    let mut queued: HashSet<G::Node> = HashSet::new();
    for node in graph.initial_nodes() {
        states
            .get_mut(&node)
            .expect("initial node is in the graph")
            .set_initial(node, graph.node_type(node));
        worklist.push_back(node);
        queued.insert(node);
    }

    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);
        let current = states[&node].clone();
        for target in graph.successors(node, relation) {
            let mut arriving = current.clone();
            arriving.transition(target, graph.node_type(target));
            let at_target = states.get_mut(&target).expect("target is in the graph");
            let is_subset = arriving.is_subset_of(at_target);
            at_target.merge_with(&arriving);
            if early_exit && at_target.is_fail() && graph.is_accept(target) {
                return states;
            }
            if !is_subset && queued.insert(target) {
                worklist.push_back(target);
            }
        }
    }

    states
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{afby, ap, linear_graph, nfby};
    use crate::trace::TraceGraph;
    use crate::BinaryInvariant;

    /// Runs both checker modes on a single linear trace and cross-checks
    /// them: the tracing mode finds a counter-example exactly when the
    /// bit-set mode's fail bit is set, and the witness is the entire trace.
    fn check_linear(events: &[&str], inv: BinaryInvariant, expect_violation: bool) {
        let g: TraceGraph = linear_graph(events);

        let failed = which_fail([&inv], &g);
        assert_eq!(failed.len(), usize::from(expect_violation), "bit-set mode");

        let witness = counter_example(&inv, &g);
        assert_eq!(witness.is_some(), expect_violation, "tracing mode");

        if let Some(witness) = witness {
            // The shortest counter-example on a single linear trace is the
            // whole walk, INITIAL through TERMINAL.
            assert_eq!(witness.invariant, inv);
            let mut expected = vec![g.initial_id()];
            let mut cursor = g.initial_id();
            while cursor != g.terminal_id() {
                cursor = g.successors(cursor, crate::DEFAULT_RELATION)[0];
                expected.push(cursor);
            }
            assert_eq!(witness.path, expected);
        }
    }

    #[test]
    fn afby_holds_when_b_follows() {
        check_linear(&["a", "x", "y", "b"], afby("a", "b"), false);
    }

    #[test]
    fn afby_fails_without_b() {
        check_linear(&["a", "x", "y", "z"], afby("a", "b"), true);
    }

    #[test]
    fn nfby_holds_without_b() {
        check_linear(&["a", "x", "y", "z"], nfby("a", "b"), false);
    }

    #[test]
    fn nfby_fails_when_b_follows() {
        check_linear(&["a", "x", "y", "z", "b"], nfby("a", "b"), true);
    }

    #[test]
    fn ap_holds_when_a_comes_first() {
        check_linear(&["x", "a", "x", "y", "b"], ap("a", "b"), false);
    }

    #[test]
    fn ap_fails_when_b_comes_first() {
        check_linear(&["x", "y", "z", "b", "a"], ap("a", "b"), true);
    }

    #[test]
    fn nfby_of_a_repeated_type_fails() {
        check_linear(&["a", "x", "a"], nfby("a", "a"), true);
        check_linear(&["a", "x", "y"], nfby("a", "a"), false);
    }

    #[test]
    fn modes_agree_across_many_invariants() {
        let g = linear_graph(&["a", "b", "a", "c"]);
        for inv in [
            afby("a", "b"),
            afby("a", "c"),
            afby("b", "a"),
            ap("a", "b"),
            ap("b", "c"),
            ap("c", "b"),
            nfby("c", "a"),
            nfby("b", "b"),
            nfby("a", "a"),
        ] {
            let fast = !which_fail([&inv], &g).is_empty();
            let traced = counter_example(&inv, &g).is_some();
            assert_eq!(fast, traced, "checkers disagree on {}", inv);
        }
    }
}
