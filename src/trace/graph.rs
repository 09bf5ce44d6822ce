//! Private module for selective re-export.

use super::{EventId, EventNode, Transition};
use crate::time::Timestamp;
use crate::{temporal_relation, Error, EventType, Relation, StateGraph, DEFAULT_RELATION};

/// The immutable graph of parsed events.
///
/// A trace graph holds every [`EventNode`] of a run in one arena, together
/// with a dummy INITIAL event (predecessor of every per-trace first event)
/// and a dummy TERMINAL event (successor of every per-trace last event).
/// It is fully constructed by [`TraceGraphBuilder`] and read-only afterward.
///
/// Two shapes occur in practice: *chains* (totally ordered traces, at most
/// one successor per node) and *DAGs* (partially ordered traces with vector
/// timestamps).
#[derive(Clone, Debug)]
pub struct TraceGraph {
    events: Vec<EventNode>,
    initial: EventId,
    terminal: EventId,
    relations: Vec<Relation>,
}

impl TraceGraph {
    /// All events, dummies included.
    pub fn events(&self) -> &[EventNode] {
        &self.events
    }

    pub fn event(&self, id: EventId) -> &EventNode {
        &self.events[id.index()]
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// The dummy INITIAL event.
    pub fn initial_id(&self) -> EventId {
        self.initial
    }

    /// The dummy TERMINAL event.
    pub fn terminal_id(&self) -> EventId {
        self.terminal
    }

    /// The relations occurring in this graph, in deterministic order.
    pub fn relation_names(&self) -> &[Relation] {
        &self.relations
    }

    /// True if no event has more than one successor under any one relation,
    /// i.e. every trace is totally ordered.
    pub fn is_totally_ordered(&self) -> bool {
        self.events.iter().filter(|e| e.id() != self.initial).all(|e| {
            self.relations.iter().all(|r| e.transitions_with(r).count() <= 1)
        })
    }
}

impl StateGraph for TraceGraph {
    type Node = EventId;

    fn nodes(&self) -> Vec<EventId> {
        (0..self.events.len()).map(EventId::from_index).collect()
    }

    fn initial_nodes(&self) -> Vec<EventId> {
        vec![self.initial]
    }

    fn node_type(&self, node: EventId) -> &EventType {
        self.events[node.index()].event_type()
    }

    fn is_accept(&self, node: EventId) -> bool {
        node == self.terminal
    }

    fn successors(&self, node: EventId, relation: &str) -> Vec<EventId> {
        self.events[node.index()]
            .transitions_with(relation)
            .map(|t| t.target)
            .collect()
    }

    fn relations(&self) -> Vec<Relation> {
        self.relations.clone()
    }
}

/// Builds a [`TraceGraph`] from parsed event records and direct-temporal
/// edges: the input boundary between the log parser and the inference core.
///
/// Malformed input is rejected here with [`Error::MalformedInput`]; the core
/// never sees it.
pub struct TraceGraphBuilder {
    events: Vec<EventNode>,
    relations: Vec<Relation>,
    time_witness: Option<Timestamp>,
}

impl TraceGraphBuilder {
    pub fn new() -> Self {
        let initial = EventNode::new(EventId(0), EventType::Initial, u32::MAX, 0, None);
        let terminal = EventNode::new(EventId(1), EventType::Terminal, u32::MAX, 0, None);
        TraceGraphBuilder {
            events: vec![initial, terminal],
            relations: Vec::new(),
            time_witness: None,
        }
    }

    /// Records one parsed event. The INITIAL and TERMINAL types are reserved
    /// for the dummies the builder adds itself, and the time type is fixed
    /// for the whole run: the first timestamp seen decides it.
    pub fn add_event(
        &mut self,
        etype: EventType,
        trace_id: u32,
        line: u32,
        time: Option<Timestamp>,
    ) -> Result<EventId, Error> {
        if etype.is_special() {
            return Err(Error::MalformedInput(format!(
                "event type {} is reserved for the dummy nodes",
                etype
            )));
        }
        if let Some(time) = &time {
            match &self.time_witness {
                None => self.time_witness = Some(time.clone()),
                Some(witness) if !witness.same_kind(time) => {
                    return Err(Error::MalformedInput(format!(
                        "timestamp {} mixes time types with {}",
                        time, witness
                    )));
                }
                Some(_) => {}
            }
        }
        let id = EventId::from_index(self.events.len());
        self.events.push(EventNode::new(id, etype, trace_id, line, time));
        Ok(id)
    }

    /// Records a direct edge between two events of the same trace.
    pub fn add_edge(&mut self, from: EventId, to: EventId, relation: &str) -> Result<(), Error> {
        self.add_edge_timed(from, to, relation, None)
    }

    /// Records a direct edge carrying the time elapsed between its endpoints.
    pub fn add_edge_timed(
        &mut self,
        from: EventId,
        to: EventId,
        relation: &str,
        delta: Option<Timestamp>,
    ) -> Result<(), Error> {
        for endpoint in [from, to] {
            if endpoint.index() >= self.events.len() {
                return Err(Error::MalformedInput(format!(
                    "edge endpoint {:?} does not name a recorded event",
                    endpoint
                )));
            }
            if self.events[endpoint.index()].event_type().is_special() {
                return Err(Error::MalformedInput(
                    "edges to the dummy nodes are added by the builder".to_owned(),
                ));
            }
        }
        if self.events[from.index()].trace_id() != self.events[to.index()].trace_id() {
            return Err(Error::MalformedInput(format!(
                "edge {:?} -> {:?} crosses trace boundaries",
                from, to
            )));
        }
        if self.events[from.index()].has_transition_to(to, relation) {
            return Err(Error::MalformedInput(format!(
                "duplicate {} edge {:?} -> {:?}",
                relation, from, to
            )));
        }
        let relation = self.intern(relation);
        self.events[from.index()].add_transition(Transition {
            target: to,
            relation,
            delta,
        });
        Ok(())
    }

    /// Convenience for a totally ordered trace: adds one labelled event per
    /// entry and chains them under the default temporal relation.
    pub fn chain(&mut self, trace_id: u32, labels: &[&str]) -> Result<Vec<EventId>, Error> {
        let mut ids = Vec::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            ids.push(self.add_event(
                EventType::label(*label),
                trace_id,
                i as u32 + 1,
                Some(Timestamp::Count(i as u64)),
            )?);
        }
        for pair in ids.windows(2) {
            self.add_edge(pair[0], pair[1], DEFAULT_RELATION)?;
        }
        Ok(ids)
    }

    /// Seals the graph: wires the dummy INITIAL to each per-trace first
    /// event and each per-trace last event to the dummy TERMINAL, per
    /// relation, then freezes.
    pub fn build(mut self) -> Result<TraceGraph, Error> {
        if self.relations.is_empty() && self.events.len() > 2 {
            // Isolated events still belong to the default temporal relation.
            self.relations.push(temporal_relation());
        }
        let n = self.events.len();
        for relation in self.relations.clone() {
            let mut has_incoming = vec![false; n];
            let mut has_outgoing = vec![false; n];
            let mut participates = vec![false; n];
            for event in &self.events[2..] {
                for t in event.transitions_with(&relation) {
                    has_outgoing[event.id().index()] = true;
                    has_incoming[t.target.index()] = true;
                    participates[event.id().index()] = true;
                    participates[t.target.index()] = true;
                }
            }
            // Every event takes part in the default temporal order, even
            // ones without direct edges (single-event traces).
            let default = &*relation == DEFAULT_RELATION;
            let firsts: Vec<EventId> = self.events[2..]
                .iter()
                .map(EventNode::id)
                .filter(|e| (default || participates[e.index()]) && !has_incoming[e.index()])
                .collect();
            let lasts: Vec<EventId> = self.events[2..]
                .iter()
                .map(EventNode::id)
                .filter(|e| (default || participates[e.index()]) && !has_outgoing[e.index()])
                .collect();
            for first in firsts {
                self.events[0].add_transition(Transition {
                    target: first,
                    relation: relation.clone(),
                    delta: None,
                });
            }
            for last in lasts {
                self.events[last.index()].add_transition(Transition {
                    target: EventId(1),
                    relation: relation.clone(),
                    delta: None,
                });
            }
        }
        Ok(TraceGraph {
            events: self.events,
            initial: EventId(0),
            terminal: EventId(1),
            relations: self.relations,
        })
    }

    fn intern(&mut self, relation: &str) -> Relation {
        if let Some(existing) = self.relations.iter().find(|r| &***r == relation) {
            return existing.clone();
        }
        let interned: Relation = relation.into();
        self.relations.push(interned.clone());
        interned
    }
}

impl Default for TraceGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chains_are_wired_through_the_dummies() {
        let mut b = TraceGraphBuilder::new();
        let ids = b.chain(0, &["a", "b", "c"]).unwrap();
        let g = b.build().unwrap();

        assert_eq!(g.successors(g.initial_id(), DEFAULT_RELATION), vec![ids[0]]);
        assert_eq!(g.successors(ids[2], DEFAULT_RELATION), vec![g.terminal_id()]);
        assert_eq!(g.successors(ids[0], DEFAULT_RELATION), vec![ids[1]]);
        assert!(g.is_accept(g.terminal_id()));
        assert!(g.is_totally_ordered());
    }

    #[test]
    fn traces_share_one_pair_of_dummies() {
        let mut b = TraceGraphBuilder::new();
        let t0 = b.chain(0, &["a", "b"]).unwrap();
        let t1 = b.chain(1, &["a", "c"]).unwrap();
        let g = b.build().unwrap();

        assert_eq!(
            g.successors(g.initial_id(), DEFAULT_RELATION),
            vec![t0[0], t1[0]]
        );
        assert_eq!(g.successors(t0[1], DEFAULT_RELATION), vec![g.terminal_id()]);
        assert_eq!(g.successors(t1[1], DEFAULT_RELATION), vec![g.terminal_id()]);
    }

    #[test]
    fn single_event_traces_get_both_dummy_edges() {
        let mut b = TraceGraphBuilder::new();
        let e = b.add_event(EventType::label("a"), 7, 1, None).unwrap();
        let g = b.build().unwrap();
        assert_eq!(g.successors(g.initial_id(), DEFAULT_RELATION), vec![e]);
        assert_eq!(g.successors(e, DEFAULT_RELATION), vec![g.terminal_id()]);
    }

    #[test]
    fn rejects_reserved_types_and_cross_trace_edges() {
        let mut b = TraceGraphBuilder::new();
        assert!(b.add_event(EventType::Initial, 0, 1, None).is_err());

        let a = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let c = b.add_event(EventType::label("c"), 1, 1, None).unwrap();
        assert!(matches!(
            b.add_edge(a, c, DEFAULT_RELATION),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn the_time_type_is_fixed_per_run() {
        let mut b = TraceGraphBuilder::new();
        b.add_event(EventType::label("a"), 0, 1, Some(Timestamp::Count(0)))
            .unwrap();
        // Untimed events are fine alongside timed ones.
        b.add_event(EventType::label("b"), 0, 2, None).unwrap();
        assert!(matches!(
            b.add_event(EventType::label("c"), 0, 3, Some(Timestamp::Double(0.5))),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn rejects_duplicate_edges() {
        let mut b = TraceGraphBuilder::new();
        let a = b.add_event(EventType::label("a"), 0, 1, None).unwrap();
        let c = b.add_event(EventType::label("b"), 0, 2, None).unwrap();
        b.add_edge(a, c, DEFAULT_RELATION).unwrap();
        assert!(b.add_edge(a, c, DEFAULT_RELATION).is_err());
        // The same arrowhead under a second relation is a distinct edge.
        b.add_edge(a, c, "shares-id").unwrap();
    }

    #[test]
    fn dag_traces_may_fan_out() {
        // Two concurrent branches joining at d.
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

        assert!(!g.is_totally_ordered());
        assert_eq!(g.successors(g.initial_id(), DEFAULT_RELATION), vec![a]);
        let mut succ = g.successors(a, DEFAULT_RELATION);
        succ.sort();
        assert_eq!(succ, vec![x, y]);
        assert_eq!(g.successors(d, DEFAULT_RELATION), vec![g.terminal_id()]);
    }
}
