//! Private module for selective re-export.

use super::ops::{Op, SplitOp};
use crate::invariant::InvariantSet;
use crate::time::Timestamp;
use crate::trace::{EventId, TraceGraph};
use crate::{Error, EventType, Relation, StateGraph};
use id_set::IdSet;
use nohash_hasher::NoHashHasher;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasherDefault;
use std::rc::Rc;

/// Index of a [`Partition`] slot within its owning [`PartitionGraph`].
///
/// Slots vacated by a merge are re-occupied only by the merge's own inverse,
/// so an id observed before an operation still names the same partition
/// after the operation is rewound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId(pub(crate) u32);

impl PartitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        PartitionId(index as u32)
    }
}

/// A non-empty set of event nodes, all of one event type: a node of the
/// partition graph.
#[derive(Clone, Debug)]
pub struct Partition {
    pub(super) etype: EventType,
    pub(super) events: IdSet,
}

impl Partition {
    pub(super) fn new(etype: EventType, events: IdSet) -> Self {
        Partition { etype, events }
    }

    pub fn event_type(&self) -> &EventType {
        &self.etype
    }

    /// The event nodes this partition owns, as arena indices.
    pub fn events(&self) -> &IdSet {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event: EventId) -> bool {
        self.events.contains(event.index())
    }
}

/// An induced, relation-labelled edge between partitions. Partition P has an
/// r-edge to Q iff some event of P has an event-level r-transition into Q.
#[derive(Clone, Debug)]
pub struct PartitionEdge {
    pub relation: Relation,
    pub target: PartitionId,
    /// Time deltas of the underlying event transitions, where present.
    pub deltas: Vec<Timestamp>,
}

type AdjacencyCache = HashMap<u32, Rc<Vec<PartitionEdge>>, BuildHasherDefault<NoHashHasher<u32>>>;

/// The mutable abstraction the bisimulation engine refines and coarsens: a
/// set of partitions over the events of one [`TraceGraph`].
///
/// All mutation goes through [`PartitionGraph::apply`], which returns the
/// inverse operation and records the applied one; applying the recorded
/// inverses in reverse order restores any earlier state. Induced edges are
/// cached per partition and the cache is flushed on every applied operation.
pub struct PartitionGraph<'g> {
    trace: &'g TraceGraph,
    pub(super) slots: Vec<Option<Partition>>,
    /// Event arena index to owning partition id: every event is in exactly
    /// one partition at all times.
    pub(super) owner: Vec<u32>,
    invariants: InvariantSet,
    adjacency: RefCell<AdjacencyCache>,
    history: Vec<Op>,
}

impl<'g> PartitionGraph<'g> {
    /// The initial abstraction: every group of same-typed events becomes one
    /// partition. The dummy INITIAL and TERMINAL events land in singleton
    /// partitions of their own since their types are distinguished.
    pub fn new(trace: &'g TraceGraph, invariants: InvariantSet) -> Self {
        let mut by_type: BTreeMap<&EventType, IdSet> = BTreeMap::new();
        for event in trace.events() {
            by_type
                .entry(event.event_type())
                .or_default()
                .insert(event.id().index());
        }

        let mut slots = Vec::with_capacity(by_type.len());
        let mut owner = vec![0; trace.event_count()];
        for (etype, events) in by_type {
            let id = slots.len() as u32;
            for e in events.iter() {
                owner[e] = id;
            }
            slots.push(Some(Partition::new(etype.clone(), events)));
        }

        PartitionGraph {
            trace,
            slots,
            owner,
            invariants,
            adjacency: RefCell::new(AdjacencyCache::default()),
            history: Vec::new(),
        }
    }

    pub fn trace(&self) -> &'g TraceGraph {
        self.trace
    }

    /// The invariants mined from the source trace graph.
    pub fn invariants(&self) -> &InvariantSet {
        &self.invariants
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn part(&self, id: PartitionId) -> &Partition {
        self.partition(id).expect("live partition")
    }

    /// Ids of the live partitions, in ascending order.
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| PartitionId::from_index(i))
            .collect()
    }

    pub fn partition_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// The partition currently owning `event`.
    pub fn owner_of(&self, event: EventId) -> PartitionId {
        PartitionId(self.owner[event.index()])
    }

    /// The partition holding the dummy INITIAL event: where checker walks
    /// start.
    pub fn initial_partition(&self) -> PartitionId {
        self.owner_of(self.trace.initial_id())
    }

    /// The partition holding the dummy TERMINAL event: where checker walks
    /// accept.
    pub fn terminal_partition(&self) -> PartitionId {
        self.owner_of(self.trace.terminal_id())
    }

    /// Induced flag: true iff some event of `id` directly follows the dummy
    /// INITIAL, i.e. the partition opens a trace.
    pub fn is_trace_initial(&self, id: PartitionId) -> bool {
        self.trace
            .event(self.trace.initial_id())
            .transitions()
            .iter()
            .any(|t| self.owner_of(t.target) == id)
    }

    /// Induced flag: true iff some event of `id` directly precedes the dummy
    /// TERMINAL, i.e. the partition closes a trace.
    pub fn is_trace_accept(&self, id: PartitionId) -> bool {
        let terminal = self.trace.terminal_id();
        self.part(id)
            .events
            .iter()
            .any(|e| {
                self.trace.events()[e]
                    .transitions()
                    .iter()
                    .any(|t| t.target == terminal)
            })
    }

    /// The induced outgoing edges of `id`, computed on demand and cached
    /// until the next applied operation.
    pub fn edges(&self, id: PartitionId) -> Rc<Vec<PartitionEdge>> {
        if let Some(cached) = self.adjacency.borrow().get(&id.0) {
            return Rc::clone(cached);
        }

        let mut grouped: BTreeMap<(Relation, u32), Vec<Timestamp>> = BTreeMap::new();
        for e in self.part(id).events.iter() {
            for t in self.trace.events()[e].transitions() {
                let deltas = grouped
                    .entry((t.relation.clone(), self.owner[t.target.index()]))
                    .or_default();
                if let Some(delta) = &t.delta {
                    deltas.push(delta.clone());
                }
            }
        }
        let edges = Rc::new(
            grouped
                .into_iter()
                .map(|((relation, target), deltas)| PartitionEdge {
                    relation,
                    target: PartitionId(target),
                    deltas,
                })
                .collect::<Vec<_>>(),
        );
        self.adjacency.borrow_mut().insert(id.0, Rc::clone(&edges));
        edges
    }

    /// True iff the graph has an induced `relation` edge `from -> to`.
    pub fn has_edge(&self, from: PartitionId, to: PartitionId, relation: &str) -> bool {
        self.edges(from)
            .iter()
            .any(|e| e.target == to && &*e.relation == relation)
    }

    /// Applies one reversible operation, returning its inverse. Records the
    /// operation in the history and flushes the adjacency cache.
    pub fn apply(&mut self, op: Op) -> Result<Op, Error> {
        let inverse = op.clone().commit(self)?;
        self.history.push(op);
        self.adjacency.borrow_mut().clear();
        Ok(inverse)
    }

    /// The applied operations, oldest first. Applying inverses in reverse
    /// order rewinds the graph.
    pub fn history(&self) -> &[Op] {
        &self.history
    }

    /// Verifies the partitioning: every partition non-empty, every event
    /// owned by exactly the partition that contains it, and the partitions
    /// exactly covering the event set.
    pub fn check_sanity(&self) -> Result<(), Error> {
        let mut total = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(partition) = slot else { continue };
            if partition.is_empty() {
                return Err(Error::InternalInconsistency(format!(
                    "partition {} is empty",
                    i
                )));
            }
            for e in partition.events.iter() {
                if self.owner[e] != i as u32 {
                    return Err(Error::InternalInconsistency(format!(
                        "event {} is in partition {} but owned by {}",
                        e, i, self.owner[e]
                    )));
                }
            }
            total += partition.len();
        }
        if total != self.trace.event_count() {
            return Err(Error::InternalInconsistency(format!(
                "partitions hold {} events, the trace graph has {}",
                total,
                self.trace.event_count()
            )));
        }
        Ok(())
    }

    /// The outgoing-based candidate split for a refinement pivot: separates
    /// the events of `pivot` that take an r-transition into `next` from
    /// those that do not. `None` if every event goes along or none does.
    pub fn candidate_split_outgoing(
        &self,
        pivot: PartitionId,
        next: PartitionId,
        relation: &str,
    ) -> Option<SplitOp> {
        let partition = self.part(pivot);
        let mut leaving = IdSet::new();
        for e in partition.events.iter() {
            let goes = self.trace.events()[e]
                .transitions_with(relation)
                .any(|t| self.owner[t.target.index()] == next.0);
            if goes {
                leaving.insert(e);
            }
        }
        if leaving.is_empty() || leaving.len() == partition.len() {
            return None;
        }
        Some(SplitOp::new(pivot, leaving))
    }

    /// The incoming-based candidate split: separates the events of `pivot`
    /// reachable by an r-transition from `prev` from those that are not.
    pub fn candidate_split_incoming(
        &self,
        prev: PartitionId,
        pivot: PartitionId,
        relation: &str,
    ) -> Option<SplitOp> {
        let mut reached = IdSet::new();
        for e in self.part(prev).events.iter() {
            for t in self.trace.events()[e].transitions_with(relation) {
                if self.owner[t.target.index()] == pivot.0 {
                    reached.insert(t.target.index());
                }
            }
        }
        let partition = self.part(pivot);
        if reached.is_empty() || reached.len() == partition.len() {
            return None;
        }
        Some(SplitOp::new(pivot, reached))
    }
}

impl std::fmt::Debug for PartitionGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionGraph")
            .field("partitions", &self.partition_count())
            .field("events", &self.trace.event_count())
            .field("applied_ops", &self.history.len())
            .finish()
    }
}

impl StateGraph for PartitionGraph<'_> {
    type Node = PartitionId;

    fn nodes(&self) -> Vec<PartitionId> {
        self.partition_ids()
    }

    fn initial_nodes(&self) -> Vec<PartitionId> {
        vec![self.initial_partition()]
    }

    fn node_type(&self, node: PartitionId) -> &EventType {
        self.part(node).event_type()
    }

    fn is_accept(&self, node: PartitionId) -> bool {
        node == self.terminal_partition()
    }

    fn successors(&self, node: PartitionId, relation: &str) -> Vec<PartitionId> {
        self.edges(node)
            .iter()
            .filter(|e| &*e.relation == relation)
            .map(|e| e.target)
            .collect()
    }

    fn relations(&self) -> Vec<Relation> {
        self.trace.relation_names().to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{linear_graph, multi_trace_graph};
    use crate::DEFAULT_RELATION;

    #[test]
    fn initial_partitioning_groups_by_type() {
        let g = multi_trace_graph(&[&["a", "b", "a"], &["a", "c"]]);
        let pg = PartitionGraph::new(&g, InvariantSet::new());

        // INITIAL, TERMINAL, a, b, c.
        assert_eq!(pg.partition_count(), 5);
        pg.check_sanity().unwrap();

        let a = pg
            .partition_ids()
            .into_iter()
            .find(|&id| pg.part(id).event_type() == &EventType::label("a"))
            .unwrap();
        assert_eq!(pg.part(a).len(), 3);
    }

    #[test]
    fn dummies_get_singleton_partitions() {
        let g = linear_graph(&["a", "b"]);
        let pg = PartitionGraph::new(&g, InvariantSet::new());

        let initial = pg.initial_partition();
        let terminal = pg.terminal_partition();
        assert_eq!(pg.part(initial).len(), 1);
        assert_eq!(pg.part(terminal).len(), 1);
        assert_eq!(pg.part(initial).event_type(), &EventType::Initial);
        assert!(pg.is_accept(terminal));
    }

    #[test]
    fn induced_edges_follow_event_edges() {
        let g = multi_trace_graph(&[&["a", "b"], &["a", "c"]]);
        let pg = PartitionGraph::new(&g, InvariantSet::new());

        let by_label = |label: &str| {
            pg.partition_ids()
                .into_iter()
                .find(|&id| pg.part(id).event_type() == &EventType::label(label))
                .unwrap()
        };
        let a = by_label("a");
        let mut targets = pg.successors(a, DEFAULT_RELATION);
        targets.sort();
        let mut expected = vec![by_label("b"), by_label("c")];
        expected.sort();
        assert_eq!(targets, expected);

        assert_eq!(
            pg.successors(pg.initial_partition(), DEFAULT_RELATION),
            vec![a]
        );
    }

    #[test]
    fn trace_boundary_flags_are_induced() {
        let g = multi_trace_graph(&[&["a", "b"], &["a", "c"]]);
        let pg = PartitionGraph::new(&g, InvariantSet::new());

        for id in pg.partition_ids() {
            let label_a = pg.part(id).event_type() == &EventType::label("a");
            let opens = pg.is_trace_initial(id);
            assert_eq!(opens, label_a, "only the a-partition opens traces");

            let closes = pg.is_trace_accept(id);
            let closing = pg.part(id).event_type() == &EventType::label("b")
                || pg.part(id).event_type() == &EventType::label("c");
            assert_eq!(closes, closing, "only b and c close traces");
        }
    }
}
