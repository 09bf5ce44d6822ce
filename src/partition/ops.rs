//! Private module for selective re-export.

use super::graph::{Partition, PartitionGraph, PartitionId};
use crate::Error;
use id_set::IdSet;

/// A reversible mutation of a [`PartitionGraph`].
///
/// Every variant is a value; committing one through
/// [`PartitionGraph::apply`] performs it and returns the inverse value, so
/// the try/rewind pattern in coarsening is a pair of `apply` calls.
#[derive(Clone, Debug)]
pub enum Op {
    Split(SplitOp),
    MultiSplit(MultiSplitOp),
    Merge(MergeOp),
    MultiMerge(MultiMergeOp),
}

impl Op {
    pub(super) fn commit(self, pg: &mut PartitionGraph) -> Result<Op, Error> {
        match self {
            Op::Split(op) => op.commit(pg),
            Op::MultiSplit(op) => op.commit(pg),
            Op::Merge(op) => op.commit(pg),
            Op::MultiMerge(op) => op.commit(pg),
        }
    }
}

/// Moves a proper, non-empty subset of a partition's events into a new
/// partition. Inverse: [`MergeOp`] of the new partition back into the old.
#[derive(Clone, Debug)]
pub struct SplitOp {
    partition: PartitionId,
    events: IdSet,
    /// Slot to place the carved-off partition in. `None` allocates a fresh
    /// slot; inverses of merges name the slot their merge vacated.
    reuse: Option<PartitionId>,
}

impl SplitOp {
    pub fn new(partition: PartitionId, events: IdSet) -> Self {
        SplitOp {
            partition,
            events,
            reuse: None,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn events(&self) -> &IdSet {
        &self.events
    }

    /// A split is applicable iff it carves off a proper non-empty subset.
    pub fn is_valid_for(&self, pg: &PartitionGraph) -> bool {
        match pg.partition(self.partition) {
            None => false,
            Some(p) => {
                !self.events.is_empty()
                    && self.events.len() < p.len()
                    && self.events.iter().all(|e| p.events().contains(e))
            }
        }
    }

    fn commit(self, pg: &mut PartitionGraph) -> Result<Op, Error> {
        if !self.is_valid_for(pg) {
            return Err(Error::InternalInconsistency(format!(
                "illegal split {:?}",
                self
            )));
        }
        let source = pg.slots[self.partition.index()]
            .as_mut()
            .expect("validated above");
        let etype = source.etype.clone();
        for e in self.events.iter() {
            source.events.remove(e);
        }
        let new_id = allocate(pg, Partition::new(etype, self.events.clone()), self.reuse)?;
        for e in self.events.iter() {
            pg.owner[e] = new_id.0;
        }
        Ok(Op::Merge(MergeOp {
            keep: self.partition,
            absorb: new_id,
        }))
    }
}

/// Splits one partition into `k >= 2` cells at once. The first cell stays in
/// the split partition; each further cell becomes a new partition. Inverse:
/// [`MultiMergeOp`] absorbing the new partitions back.
#[derive(Clone, Debug)]
pub struct MultiSplitOp {
    partition: PartitionId,
    cells: Vec<IdSet>,
    /// Slots for the cells beyond the first; empty means all fresh.
    reuse: Vec<Option<PartitionId>>,
}

impl MultiSplitOp {
    /// Starts out behaving exactly like `split`; further splits of the same
    /// partition can then be [`incorporate`](Self::incorporate)d.
    pub fn from_split(split: SplitOp, pg: &PartitionGraph) -> Self {
        let partition = split.partition();
        let mut rest = IdSet::new();
        for e in pg.part(partition).events().iter() {
            if !split.events().contains(e) {
                rest.insert(e);
            }
        }
        MultiSplitOp {
            partition,
            cells: vec![split.events, rest],
            reuse: Vec::new(),
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn cells(&self) -> &[IdSet] {
        &self.cells
    }

    /// Refines this partitioning by intersecting every cell with every cell
    /// of `other`; empty intersections are dropped. Both splits must target
    /// the same partition.
    pub fn incorporate(&mut self, other: &MultiSplitOp) -> Result<(), Error> {
        if other.partition != self.partition {
            return Err(Error::InternalInconsistency(format!(
                "cannot incorporate a split of {:?} into a split of {:?}",
                other.partition, self.partition
            )));
        }
        let mut refined = Vec::new();
        for cell in &mut self.cells {
            for other_cell in &other.cells {
                let carved: IdSet = cell.iter().filter(|e| other_cell.contains(*e)).collect();
                for e in carved.iter() {
                    cell.remove(e);
                }
                refined.push(carved);
            }
        }
        self.cells.extend(refined);
        self.cells.retain(|c| !c.is_empty());
        self.reuse.clear();
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.cells.len() >= 2 && self.cells.iter().all(|c| !c.is_empty())
    }

    fn commit(self, pg: &mut PartitionGraph) -> Result<Op, Error> {
        let Some(source) = pg.partition(self.partition) else {
            return Err(Error::InternalInconsistency(format!(
                "multi-split of a dead partition {:?}",
                self.partition
            )));
        };
        let mut covered = IdSet::new();
        let mut total = 0;
        for cell in &self.cells {
            for e in cell.iter() {
                if !covered.insert(e) {
                    return Err(Error::InternalInconsistency(format!(
                        "multi-split cells overlap on event {}",
                        e
                    )));
                }
            }
            total += cell.len();
        }
        if !self.is_valid()
            || total != source.len()
            || covered.iter().any(|e| !source.events().contains(e))
        {
            return Err(Error::InternalInconsistency(format!(
                "multi-split cells do not partition {:?}",
                self.partition
            )));
        }

        let etype = source.event_type().clone();
        pg.slots[self.partition.index()]
            .as_mut()
            .expect("validated above")
            .events = self.cells[0].clone();

        let mut created = Vec::with_capacity(self.cells.len() - 1);
        for (i, cell) in self.cells.into_iter().enumerate().skip(1) {
            let slot = self.reuse.get(i - 1).copied().flatten();
            let id = allocate(pg, Partition::new(etype.clone(), cell.clone()), slot)?;
            for e in cell.iter() {
                pg.owner[e] = id.0;
            }
            created.push(id);
        }
        Ok(Op::MultiMerge(MultiMergeOp {
            keep: self.partition,
            absorb: created,
        }))
    }
}

/// Moves all events of one partition into another and deletes it. Inverse:
/// a [`SplitOp`] that re-creates the absorbed partition in its old slot.
#[derive(Clone, Debug)]
pub struct MergeOp {
    keep: PartitionId,
    absorb: PartitionId,
}

impl MergeOp {
    pub fn new(keep: PartitionId, absorb: PartitionId) -> Self {
        MergeOp { keep, absorb }
    }

    pub fn keep(&self) -> PartitionId {
        self.keep
    }

    pub fn absorb(&self) -> PartitionId {
        self.absorb
    }

    fn commit(self, pg: &mut PartitionGraph) -> Result<Op, Error> {
        merge_one(pg, self.keep, self.absorb).map(|moved| {
            Op::Split(SplitOp {
                partition: self.keep,
                events: moved,
                reuse: Some(self.absorb),
            })
        })
    }
}

/// Absorbs several partitions into one: the inverse of a multi-way split.
#[derive(Clone, Debug)]
pub struct MultiMergeOp {
    keep: PartitionId,
    absorb: Vec<PartitionId>,
}

impl MultiMergeOp {
    pub fn new(keep: PartitionId, absorb: Vec<PartitionId>) -> Self {
        MultiMergeOp { keep, absorb }
    }

    fn commit(self, pg: &mut PartitionGraph) -> Result<Op, Error> {
        let Some(keep) = pg.partition(self.keep) else {
            return Err(Error::InternalInconsistency(format!(
                "multi-merge into a dead partition {:?}",
                self.keep
            )));
        };
        let mut cells = vec![keep.events().clone()];
        let mut reuse = Vec::with_capacity(self.absorb.len());
        for q in &self.absorb {
            cells.push(merge_one(pg, self.keep, *q)?);
            reuse.push(Some(*q));
        }
        Ok(Op::MultiSplit(MultiSplitOp {
            partition: self.keep,
            cells,
            reuse,
        }))
    }
}

/// Moves `absorb`'s events into `keep`, vacating `absorb`'s slot. Returns
/// the moved set.
fn merge_one(
    pg: &mut PartitionGraph,
    keep: PartitionId,
    absorb: PartitionId,
) -> Result<IdSet, Error> {
    if keep == absorb {
        return Err(Error::InternalInconsistency(
            "cannot merge a partition with itself".to_owned(),
        ));
    }
    let (Some(keep_part), Some(absorb_part)) = (pg.partition(keep), pg.partition(absorb)) else {
        return Err(Error::InternalInconsistency(format!(
            "merge {:?} <- {:?} names a dead partition",
            keep, absorb
        )));
    };
    if keep_part.event_type() != absorb_part.event_type() {
        return Err(Error::InternalInconsistency(format!(
            "merge would mix event types {} and {}",
            keep_part.event_type(),
            absorb_part.event_type()
        )));
    }

    let moved = pg.slots[absorb.index()].take().expect("checked above").events;
    let keep_slot = pg.slots[keep.index()].as_mut().expect("checked above");
    for e in moved.iter() {
        keep_slot.events.insert(e);
        pg.owner[e] = keep.0;
    }
    Ok(moved)
}

fn allocate(
    pg: &mut PartitionGraph,
    partition: Partition,
    slot: Option<PartitionId>,
) -> Result<PartitionId, Error> {
    match slot {
        None => {
            pg.slots.push(Some(partition));
            Ok(PartitionId::from_index(pg.slots.len() - 1))
        }
        Some(id) => match pg.slots.get_mut(id.index()) {
            Some(vacant @ None) => {
                *vacant = Some(partition);
                Ok(id)
            }
            _ => Err(Error::InternalInconsistency(format!(
                "slot {:?} is not vacant",
                id
            ))),
        },
    }
}
