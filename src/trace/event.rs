//! Private module for selective re-export.

use crate::time::Timestamp;
use crate::{EventType, Relation};

/// Index of an [`EventNode`] within its owning [`TraceGraph`](super::TraceGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u32);

impl EventId {
    /// The arena index this id denotes.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        EventId(index as u32)
    }
}

/// A directed, relation-labelled edge between two events. The arrowhead and
/// the relation name together identify the edge; at most one edge with a
/// given `(relation, target)` pair leaves any event.
#[derive(Clone, Debug)]
pub struct Transition {
    /// The event this transition points at.
    pub target: EventId,
    /// The relation this transition belongs to; `"t"` is the default
    /// temporal relation.
    pub relation: Relation,
    /// Time elapsed between source and target, when the log carries time.
    pub delta: Option<Timestamp>,
}

/// One observed event occurrence: a node of the [`TraceGraph`](super::TraceGraph).
///
/// Event nodes are created at parse time and live as long as the graph.
#[derive(Clone, Debug)]
pub struct EventNode {
    id: EventId,
    etype: EventType,
    trace_id: u32,
    line: u32,
    time: Option<Timestamp>,
    transitions: Vec<Transition>,
}

impl EventNode {
    pub(crate) fn new(
        id: EventId,
        etype: EventType,
        trace_id: u32,
        line: u32,
        time: Option<Timestamp>,
    ) -> Self {
        EventNode {
            id,
            etype,
            trace_id,
            line,
            time,
            transitions: Vec::new(),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &EventType {
        &self.etype
    }

    /// Identifier of the observed execution this event belongs to.
    pub fn trace_id(&self) -> u32 {
        self.trace_id
    }

    /// The log line this event was parsed from.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn time(&self) -> Option<&Timestamp> {
        self.time.as_ref()
    }

    /// All outgoing transitions, across relations.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Outgoing transitions under one relation.
    pub fn transitions_with<'a>(
        &'a self,
        relation: &'a str,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions
            .iter()
            .filter(move |t| &*t.relation == relation)
    }

    pub(crate) fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub(crate) fn has_transition_to(&self, target: EventId, relation: &str) -> bool {
        self.transitions
            .iter()
            .any(|t| t.target == target && &*t.relation == relation)
    }
}
