//! Private module for selective re-export.

use super::{run_fixpoint, CounterExamplePath, StateSet};
use crate::invariant::{BinaryInvariant, InvariantKind};
use crate::{EventType, StateGraph};
use std::rc::Rc;

/// A persistent, backward-linked record of how a simulation state was
/// reached. Histories are shared on merge, never deep-copied, so the memory
/// cost is one node per propagation step.
struct History<N> {
    node: N,
    prev: Option<Rc<History<N>>>,
    len: u32,
}

type Link<N> = Option<Rc<History<N>>>;

fn root<N>(node: N) -> Link<N> {
    Some(Rc::new(History {
        node,
        prev: None,
        len: 1,
    }))
}

fn extend<N: Copy>(link: &Link<N>, node: N) -> Link<N> {
    link.as_ref().map(|h| {
        Rc::new(History {
            node,
            prev: Some(Rc::clone(h)),
            len: h.len + 1,
        })
    })
}

/// Keeps the shorter of two histories; ties keep the incumbent, which makes
/// merge order (and therefore the reported witness) deterministic.
fn prefer_shorter<N>(candidate: Link<N>, incumbent: Link<N>) -> Link<N> {
    match (&candidate, &incumbent) {
        (None, _) => incumbent,
        (_, None) => candidate,
        (Some(c), Some(i)) => {
            if c.len < i.len {
                candidate
            } else {
                incumbent
            }
        }
    }
}

fn replay<N: Copy>(history: &Rc<History<N>>) -> Vec<N> {
    let mut path = Vec::with_capacity(history.len as usize);
    let mut cursor = Some(history);
    while let Some(h) = cursor {
        path.push(h.node);
        cursor = h.prev.as_ref();
    }
    path.reverse();
    path
}

/// The tracing simulation state for one invariant: each automaton state
/// carries the shortest history that reaches it, or nothing if unreached.
#[derive(Clone)]
struct TracingStateSet<N> {
    kind: InvariantKind,
    first: EventType,
    second: EventType,
    nil: Link<N>,
    saw: Link<N>,
    fail: Link<N>,
}

impl<N: Copy> TracingStateSet<N> {
    fn pristine(invariant: &BinaryInvariant) -> Self {
        TracingStateSet {
            kind: invariant.kind,
            first: invariant.first.clone(),
            second: invariant.second.clone(),
            nil: None,
            saw: None,
            fail: None,
        }
    }

    /// The history justifying a failure at an accepting node, if any.
    fn fail_path(&self) -> &Link<N> {
        match self.kind {
            InvariantKind::AlwaysFollowedBy => &self.saw,
            _ => &self.fail,
        }
    }
}

impl<N: Copy> StateSet<N> for TracingStateSet<N> {
    fn set_initial(&mut self, node: N, etype: &EventType) {
        let fresh = root(node);
        self.nil = None;
        self.saw = None;
        self.fail = None;
        match self.kind {
            InvariantKind::AlwaysPrecedes if self.second == *etype => self.fail = fresh,
            _ if self.first == *etype => self.saw = fresh,
            _ => self.nil = fresh,
        }
    }

    fn transition(&mut self, node: N, etype: &EventType) {
        match self.kind {
            InvariantKind::AlwaysFollowedBy => {
                if self.second == *etype {
                    self.nil = prefer_shorter(self.saw.take(), self.nil.take());
                }
                if self.first == *etype {
                    self.saw = prefer_shorter(self.nil.take(), self.saw.take());
                }
            }
            InvariantKind::NeverFollowedBy => {
                // No else between the arms: with A = B one input can both
                // fail an open obligation and open a new one.
                if self.second == *etype {
                    self.fail = prefer_shorter(self.saw.take(), self.fail.take());
                }
                if self.first == *etype {
                    self.saw = prefer_shorter(self.nil.take(), self.saw.take());
                }
            }
            InvariantKind::AlwaysPrecedes => {
                if self.first == *etype {
                    self.saw = prefer_shorter(self.nil.take(), self.saw.take());
                } else if self.second == *etype {
                    self.fail = prefer_shorter(self.nil.take(), self.fail.take());
                }
            }
        }
        self.nil = extend(&self.nil, node);
        self.saw = extend(&self.saw, node);
        self.fail = extend(&self.fail, node);
    }

    fn is_subset_of(&self, other: &Self) -> bool {
        // Only state occupancy matters for the fixpoint; history lengths
        // do not re-trigger propagation.
        (self.nil.is_none() || other.nil.is_some())
            && (self.saw.is_none() || other.saw.is_some())
            && (self.fail.is_none() || other.fail.is_some())
    }

    fn merge_with(&mut self, other: &Self) {
        self.nil = prefer_shorter(other.nil.clone(), self.nil.take());
        self.saw = prefer_shorter(other.saw.clone(), self.saw.take());
        self.fail = prefer_shorter(other.fail.clone(), self.fail.take());
    }

    fn is_fail(&self) -> bool {
        self.fail_path().is_some()
    }
}

/// Runs the tracing checker for one invariant and returns the shortest
/// counter-example ending at an accepting node, or `None` if the invariant
/// holds.
pub fn counter_example<G: StateGraph>(
    invariant: &BinaryInvariant,
    graph: &G,
) -> Option<CounterExamplePath<G::Node>> {
    let seed = TracingStateSet::pristine(invariant);
    let states = run_fixpoint(graph, &invariant.relation, &seed, true);

    let mut shortest: Link<G::Node> = None;
    for node in graph.nodes() {
        if !graph.is_accept(node) {
            continue;
        }
        let candidate = states[&node].fail_path().clone();
        shortest = prefer_shorter(candidate, shortest);
    }

    shortest.map(|h| CounterExamplePath::new(invariant.clone(), replay(&h)))
}
