//! Binary temporal invariants over pairs of event types.

mod miner;

pub use miner::mine;

use crate::checker::{self, CounterExamplePath};
use crate::{EventType, Relation, StateGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// The three invariant templates the miner knows how to instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvariantKind {
    /// `A AFby B`: after every A there is eventually a B.
    AlwaysFollowedBy,
    /// `A AP B`: every B is preceded by some A.
    AlwaysPrecedes,
    /// `A NFby B`: after any A, B never occurs.
    NeverFollowedBy,
}

impl Display for InvariantKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InvariantKind::AlwaysFollowedBy => write!(f, "AFby"),
            InvariantKind::AlwaysPrecedes => write!(f, "AP"),
            InvariantKind::NeverFollowedBy => write!(f, "NFby"),
        }
    }
}

/// One binary temporal invariant, identified structurally by its kind, its
/// two event-type operands, and the relation it ranges over.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BinaryInvariant {
    pub kind: InvariantKind,
    pub first: EventType,
    pub second: EventType,
    pub relation: Relation,
}

impl BinaryInvariant {
    pub fn always_followed_by(first: EventType, second: EventType, relation: Relation) -> Self {
        BinaryInvariant {
            kind: InvariantKind::AlwaysFollowedBy,
            first,
            second,
            relation,
        }
    }

    /// `first AP second`; the two operands must differ.
    ///
    /// Panics if `first == second`: the checker automata treat an A-input
    /// as satisfying before they treat it as demanding, so such an
    /// invariant would be vacuously satisfied rather than checked.
    pub fn always_precedes(first: EventType, second: EventType, relation: Relation) -> Self {
        assert!(first != second, "A AP A is not a meaningful invariant");
        BinaryInvariant {
            kind: InvariantKind::AlwaysPrecedes,
            first,
            second,
            relation,
        }
    }

    pub fn never_followed_by(first: EventType, second: EventType, relation: Relation) -> Self {
        BinaryInvariant {
            kind: InvariantKind::NeverFollowedBy,
            first,
            second,
            relation,
        }
    }
}

impl Display for BinaryInvariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.first, self.kind, self.second)?;
        if &*self.relation != crate::DEFAULT_RELATION {
            write!(f, " [{}]", self.relation)?;
        }
        Ok(())
    }
}

/// An ordered set of mined invariants.
///
/// Iteration order is deterministic, which keeps counter-example enumeration
/// reproducible for a fixed random seed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvariantSet {
    invariants: BTreeSet<BinaryInvariant>,
}

impl InvariantSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, invariant: BinaryInvariant) -> bool {
        self.invariants.insert(invariant)
    }

    pub fn contains(&self, invariant: &BinaryInvariant) -> bool {
        self.invariants.contains(invariant)
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BinaryInvariant> {
        self.invariants.iter()
    }

    /// Fast path: evaluates every invariant simultaneously with the bit-set
    /// checker and returns the ones that fail on `graph`.
    pub fn which_fail<G: StateGraph>(&self, graph: &G) -> Vec<BinaryInvariant> {
        checker::which_fail(self.iter(), graph)
    }

    /// Tracing path: the shortest counter-example for each failing
    /// invariant, in deterministic invariant order.
    pub fn all_counter_examples<G: StateGraph>(
        &self,
        graph: &G,
    ) -> Vec<CounterExamplePath<G::Node>> {
        self.which_fail(graph)
            .iter()
            .filter_map(|inv| checker::counter_example(inv, graph))
            .collect()
    }

    /// The first failing invariant's counter-example, if any.
    pub fn first_counter_example<G: StateGraph>(
        &self,
        graph: &G,
    ) -> Option<CounterExamplePath<G::Node>> {
        self.which_fail(graph)
            .first()
            .and_then(|inv| checker::counter_example(inv, graph))
    }
}

impl FromIterator<BinaryInvariant> for InvariantSet {
    fn from_iter<I: IntoIterator<Item = BinaryInvariant>>(iter: I) -> Self {
        InvariantSet {
            invariants: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InvariantSet {
    type Item = &'a BinaryInvariant;
    type IntoIter = std::collections::btree_set::Iter<'a, BinaryInvariant>;

    fn into_iter(self) -> Self::IntoIter {
        self.invariants.iter()
    }
}
