//! Private module for selective re-export.

use super::{run_fixpoint, StateSet};
use crate::invariant::{BinaryInvariant, InvariantKind};
use crate::{EventType, Relation, StateGraph};
use id_set::IdSet;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// One family of same-kind, same-relation invariants evaluated together.
///
/// Each family member owns one bit across the three automaton state sets of
/// [`FsmStateSet`]. The type-to-members maps are what makes a transition a
/// handful of bit moves instead of a scan.
struct FsmFamily {
    kind: InvariantKind,
    invariants: Vec<BinaryInvariant>,
    firsts: HashMap<EventType, IdSet>,
    seconds: HashMap<EventType, IdSet>,
}

impl FsmFamily {
    fn new(kind: InvariantKind, invariants: Vec<BinaryInvariant>) -> Self {
        let mut firsts: HashMap<EventType, IdSet> = HashMap::new();
        let mut seconds: HashMap<EventType, IdSet> = HashMap::new();
        for (i, inv) in invariants.iter().enumerate() {
            firsts
                .entry(inv.first.clone())
                .or_insert_with(IdSet::new)
                .insert(i);
            seconds
                .entry(inv.second.clone())
                .or_insert_with(IdSet::new)
                .insert(i);
        }
        FsmFamily {
            kind,
            invariants,
            firsts,
            seconds,
        }
    }

    fn matching_first(&self, etype: &EventType) -> Vec<usize> {
        self.firsts.get(etype).map(set_to_vec).unwrap_or_default()
    }

    fn matching_second(&self, etype: &EventType) -> Vec<usize> {
        self.seconds.get(etype).map(set_to_vec).unwrap_or_default()
    }
}

fn set_to_vec(set: &IdSet) -> Vec<usize> {
    set.iter().collect()
}

/// The bit-set simulation state for one node: each member invariant's
/// automaton occupies a subset of {NIL, SAW, FAIL}, one bit per set.
///
/// The three automaton shapes:
///
/// - AFby(A,B): A moves NIL to SAW ("obligation open"), B moves SAW back to
///   NIL; failing means reaching an accepting node with SAW set.
/// - NFby(A,B): A moves NIL to SAW, B with SAW set moves to FAIL.
/// - AP(A,B): A moves NIL to SAW (permanently safe), B with NIL moves to
///   FAIL.
#[derive(Clone)]
pub(super) struct FsmStateSet {
    family: Rc<FsmFamily>,
    nil: IdSet,
    saw: IdSet,
    fail: IdSet,
}

impl FsmStateSet {
    /// The bottom state: no automaton has started.
    fn pristine(family: Rc<FsmFamily>) -> Self {
        FsmStateSet {
            family,
            nil: IdSet::new(),
            saw: IdSet::new(),
            fail: IdSet::new(),
        }
    }

    fn step(&mut self, etype: &EventType) {
        let matching_first = self.family.matching_first(etype);
        let matching_second = self.family.matching_second(etype);
        match self.family.kind {
            InvariantKind::AlwaysFollowedBy => {
                // B discharges an open obligation; A (re)opens one. Checked
                // in that order so that A = B nets an open obligation.
                for i in matching_second {
                    if self.saw.remove(i) {
                        self.nil.insert(i);
                    }
                }
                for i in matching_first {
                    if self.nil.remove(i) {
                        self.saw.insert(i);
                    }
                }
            }
            InvariantKind::NeverFollowedBy => {
                // B after A fails; checked before the A move so that A = B
                // needs two occurrences to fail.
                for i in matching_second {
                    if self.saw.remove(i) {
                        self.fail.insert(i);
                    }
                }
                for i in matching_first {
                    if self.nil.remove(i) {
                        self.saw.insert(i);
                    }
                }
            }
            InvariantKind::AlwaysPrecedes => {
                for i in matching_first {
                    if self.nil.remove(i) {
                        self.saw.insert(i);
                    }
                }
                for i in matching_second {
                    if self.nil.remove(i) {
                        self.fail.insert(i);
                    }
                }
            }
        }
    }

    /// The member invariants failing if the walk ends here: an AFby fails
    /// on an unmet obligation, the others on an explicit FAIL state.
    fn failing(&self) -> &IdSet {
        match self.family.kind {
            InvariantKind::AlwaysFollowedBy => &self.saw,
            _ => &self.fail,
        }
    }
}

impl<N> StateSet<N> for FsmStateSet {
    fn set_initial(&mut self, _node: N, etype: &EventType) {
        self.nil.clear();
        self.saw.clear();
        self.fail.clear();
        for i in 0..self.family.invariants.len() {
            self.nil.insert(i);
        }
        self.step(etype);
    }

    fn transition(&mut self, _node: N, etype: &EventType) {
        self.step(etype);
    }

    fn is_subset_of(&self, other: &Self) -> bool {
        subset(&self.nil, &other.nil)
            && subset(&self.saw, &other.saw)
            && subset(&self.fail, &other.fail)
    }

    fn merge_with(&mut self, other: &Self) {
        union_into(&mut self.nil, &other.nil);
        union_into(&mut self.saw, &other.saw);
        union_into(&mut self.fail, &other.fail);
    }

    fn is_fail(&self) -> bool {
        !self.failing().is_empty()
    }
}

fn subset(a: &IdSet, b: &IdSet) -> bool {
    a.iter().all(|i| b.contains(i))
}

fn union_into(dst: &mut IdSet, src: &IdSet) {
    for i in src.iter() {
        dst.insert(i);
    }
}

/// Evaluates `invariants` against `graph` with the bit-set checker and
/// returns the ones that fail.
///
/// Invariants are grouped into (relation, kind) families; each family is
/// one fixpoint pass, and its fail bits are collected at accepting nodes.
pub fn which_fail<'a, G, I>(invariants: I, graph: &G) -> Vec<BinaryInvariant>
where
    G: StateGraph,
    I: IntoIterator<Item = &'a BinaryInvariant>,
{
    let mut families: BTreeMap<(Relation, InvariantKind), Vec<BinaryInvariant>> = BTreeMap::new();
    for inv in invariants {
        families
            .entry((inv.relation.clone(), inv.kind))
            .or_default()
            .push(inv.clone());
    }

    let mut failed = Vec::new();
    for ((relation, kind), members) in families {
        let family = Rc::new(FsmFamily::new(kind, members));
        let seed = FsmStateSet::pristine(Rc::clone(&family));
        let states = run_fixpoint(graph, &relation, &seed, false);

        let mut fail_bits = IdSet::new();
        for node in graph.nodes() {
            if graph.is_accept(node) {
                union_into(&mut fail_bits, states[&node].failing());
            }
        }
        failed.extend(fail_bits.iter().map(|i| family.invariants[i].clone()));
    }
    failed
}
