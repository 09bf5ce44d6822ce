//! The refinement/coarsening loop at the heart of model inference.
//!
//! A partition graph is transformed by two dual phases. *Refinement*
//! ([`Engine::refine`]) splits partitions until every mined invariant is
//! satisfied, driven by counter-example paths from the tracing checker.
//! *Coarsening* ([`Engine::coarsen`]) then merges k-equivalent partitions,
//! rewinding any merge that reintroduces a violation, until the abstraction
//! is as small as the invariants allow.

mod ktails;

pub use ktails::k_equals;

use crate::checker::CounterExamplePath;
use crate::invariant::{BinaryInvariant, InvariantSet};
use crate::partition::{MergeOp, MultiSplitOp, Op, PartitionGraph, PartitionId, SplitOp};
use crate::report::{Phase, ReportData, Reporter};
use crate::{Error, Options};
use id_set::IdSet;
use nohash_hasher::NoHashHasher;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Counts of the work a refinement/coarsening run performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Refinement rounds applied (each round applies one or more splits).
    pub split_steps: usize,
    /// Merges kept by coarsening.
    pub merges: usize,
}

/// Drives refinement and coarsening over one [`PartitionGraph`].
///
/// All run-scoped state lives here: the options, the seeded random source
/// that orders counter-example processing, and the cooperative cancel flag
/// checked between loop iterations.
pub struct Engine {
    options: Options,
    rng: StdRng,
    cancel: Option<Arc<AtomicBool>>,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        let rng = StdRng::seed_from_u64(options.random_seed);
        Engine {
            options,
            rng,
            cancel: None,
        }
    }

    /// Installs a flag that cancels the run at the next loop boundary,
    /// leaving the caller's graph in its partially transformed state.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Refines until all invariants hold, then coarsens, honouring the
    /// `no_refinement` / `no_coarsening` diagnostics options.
    pub fn run(&mut self, pg: &mut PartitionGraph) -> Result<RunStats, Error> {
        self.run_reported(pg, &mut crate::report::NullReporter)
    }

    /// Like [`run`](Self::run), reporting progress after every round.
    pub fn run_reported<R>(
        &mut self,
        pg: &mut PartitionGraph,
        reporter: &mut R,
    ) -> Result<RunStats, Error>
    where
        R: Reporter + ?Sized,
    {
        if !self.options.use_fsm_checker {
            return Err(Error::Unsupported(
                "only the FSM checking engine is available; \
                 an external LTL checker is not linked",
            ));
        }
        let mut stats = RunStats::default();
        if !self.options.no_refinement {
            stats.split_steps = self.refine_reported(pg, reporter)?;
        }
        if !self.options.no_coarsening {
            stats.merges = self.coarsen_reported(pg, reporter)?;
        }
        info!(
            splits = stats.split_steps,
            merges = stats.merges,
            partitions = pg.partition_count(),
            "bisimulation finished"
        );
        Ok(stats)
    }

    /// Splits partitions in `pg` until every invariant mined for it is
    /// satisfied. Returns the number of split rounds applied.
    pub fn refine(&mut self, pg: &mut PartitionGraph) -> Result<usize, Error> {
        self.refine_reported(pg, &mut crate::report::NullReporter)
    }

    /// Merges k-equivalent partitions of `pg` without reintroducing any
    /// invariant violation. Returns the number of merges kept.
    pub fn coarsen(&mut self, pg: &mut PartitionGraph) -> Result<usize, Error> {
        self.coarsen_reported(pg, &mut crate::report::NullReporter)
    }

    fn refine_reported<R>(&mut self, pg: &mut PartitionGraph, reporter: &mut R) -> Result<usize, Error>
    where
        R: Reporter + ?Sized,
    {
        let invariants = pg.invariants().clone();
        let started = Instant::now();
        let mut rounds = 0;
        loop {
            self.check_cancelled()?;

            // Splits can satisfy more invariants than the ones they were
            // chosen for, so the unsatisfied set is recomputed from scratch
            // every round rather than tracked incrementally.
            let mut counter_examples = invariants.all_counter_examples(pg);
            if counter_examples.is_empty() {
                debug!(rounds, "all invariants satisfied, refinement done");
                break;
            }
            reporter.report(ReportData {
                phase: Phase::Refinement,
                round: rounds,
                partitions: pg.partition_count(),
                outstanding: counter_examples.len(),
                duration: started.elapsed(),
                done: false,
            });

            // Process counter-examples in an order that is fair across
            // rounds yet reproducible for a fixed seed.
            counter_examples.shuffle(&mut self.rng);

            self.perform_splits(pg, &counter_examples)?;
            rounds += 1;
        }
        reporter.report(ReportData {
            phase: Phase::Refinement,
            round: rounds,
            partitions: pg.partition_count(),
            outstanding: 0,
            duration: started.elapsed(),
            done: true,
        });
        Ok(rounds)
    }

    /// One refinement round: finds invariant-satisfying splits and applies
    /// them all, or falls back to a single arbitrary candidate split so the
    /// loop always makes progress.
    fn perform_splits(
        &mut self,
        pg: &mut PartitionGraph,
        counter_examples: &[CounterExamplePath<PartitionId>],
    ) -> Result<(), Error> {
        let mut splits_by_partition: BTreeMap<PartitionId, MultiSplitOp> = BTreeMap::new();
        let mut newly_satisfied: BTreeSet<&BinaryInvariant> = BTreeSet::new();
        let mut arbitrary: Option<SplitOp> = None;

        for cex in counter_examples {
            // A split already chosen for this invariant resolves this
            // counter-example too.
            if newly_satisfied.contains(&cex.invariant) {
                continue;
            }

            let mut candidates = self.candidate_splits(pg, cex);
            candidates.shuffle(&mut self.rng);
            if arbitrary.is_none() {
                arbitrary = candidates.first().cloned();
            }

            for candidate in candidates {
                if self.options.perform_extra_checks && !candidate.is_valid_for(pg) {
                    return Err(Error::InternalInconsistency(format!(
                        "candidate computation produced an illegal split {:?}",
                        candidate
                    )));
                }
                let split = MultiSplitOp::from_split(candidate, pg);
                let partition = split.partition();
                if !self.split_satisfies_globally(pg, &cex.invariant, split.clone())? {
                    continue;
                }
                match splits_by_partition.entry(partition) {
                    std::collections::btree_map::Entry::Occupied(mut planned) => {
                        debug!(?partition, "incorporating into an existing planned split");
                        planned.get_mut().incorporate(&split)?;
                    }
                    std::collections::btree_map::Entry::Vacant(vacant) => {
                        vacant.insert(split);
                    }
                }
                newly_satisfied.insert(&cex.invariant);
                break;
            }
        }

        if splits_by_partition.is_empty() {
            let Some(split) = arbitrary else {
                // Known to be reachable on partially ordered inputs only;
                // for totally ordered traces it indicates a defect.
                let remaining: BTreeSet<BinaryInvariant> = counter_examples
                    .iter()
                    .map(|cex| cex.invariant.clone())
                    .collect();
                return Err(Error::InvariantsUnsatisfiable {
                    remaining: remaining.into_iter().collect(),
                });
            };
            debug!(
                "no invariant-satisfying split this round, applying an arbitrary one"
            );
            let split = MultiSplitOp::from_split(split, pg);
            pg.apply(Op::MultiSplit(split))?;
            self.extra_sanity(pg)?;
        } else {
            debug!(
                invariants = newly_satisfied.len(),
                partitions = splits_by_partition.len(),
                "applying invariant-satisfying splits"
            );
            for (_, split) in splits_by_partition {
                pg.apply(Op::MultiSplit(split))?;
                self.extra_sanity(pg)?;
            }
        }
        Ok(())
    }

    /// Candidate splits of the pivot partition of one counter-example.
    ///
    /// Walks the counter-example path and, in lockstep, the "hot" set of
    /// event nodes consistent with the partition prefix walked so far. The
    /// first partition where the hot set dies is where the abstraction
    /// allows a transition the traces do not: the pivot.
    fn candidate_splits(
        &self,
        pg: &PartitionGraph,
        cex: &CounterExamplePath<PartitionId>,
    ) -> Vec<SplitOp> {
        let relation = &cex.invariant.relation;
        let mut candidates = Vec::new();

        let mut previous: Option<PartitionId> = None;
        let mut pivot: Option<PartitionId> = None;
        let mut next: Option<PartitionId> = None;
        let mut hot: IdSet = match cex.path.first() {
            Some(&start) => pg.part(start).events().clone(),
            None => return candidates,
        };
        for &partition in &cex.path {
            previous = pivot;
            pivot = next;
            next = Some(partition);

            let here = pg.part(partition).events();
            hot = hot.iter().filter(|e| here.contains(*e)).collect();
            if hot.is_empty() {
                break;
            }

            let mut successors = IdSet::new();
            for e in hot.iter() {
                for t in pg.trace().events()[e].transitions_with(relation) {
                    successors.insert(t.target.index());
                }
            }
            hot = successors;
        }

        let (Some(pivot), Some(next)) = (pivot, next) else {
            return candidates;
        };
        if pg.has_edge(pivot, next, relation) {
            candidates.extend(pg.candidate_split_outgoing(pivot, next, relation));
        }
        if let Some(previous) = previous {
            if self.options.incoming_transition_split && pg.has_edge(previous, pivot, relation) {
                candidates.extend(pg.candidate_split_incoming(previous, pivot, relation));
            }
        }
        candidates
    }

    /// Probes whether applying `split` leaves no counter-example at all for
    /// `invariant`: apply, check, rewind.
    fn split_satisfies_globally(
        &self,
        pg: &mut PartitionGraph,
        invariant: &BinaryInvariant,
        split: MultiSplitOp,
    ) -> Result<bool, Error> {
        let rewind = pg.apply(Op::MultiSplit(split))?;
        let satisfied = crate::checker::which_fail([invariant], pg).is_empty();
        pg.apply(rewind)?;
        Ok(satisfied)
    }

    fn coarsen_reported<R>(&mut self, pg: &mut PartitionGraph, reporter: &mut R) -> Result<usize, Error>
    where
        R: Reporter + ?Sized,
    {
        let invariants = pg.invariants().clone();
        let started = Instant::now();
        // Pairs that merged into an invariant violation once will do so
        // again; remember and skip them.
        let mut blacklist: HashSet<u64, BuildHasherDefault<NoHashHasher<u64>>> =
            HashSet::default();
        let mut merges = 0;
        loop {
            self.check_cancelled()?;
            reporter.report(ReportData {
                phase: Phase::Coarsening,
                round: merges,
                partitions: pg.partition_count(),
                outstanding: 0,
                duration: started.elapsed(),
                done: false,
            });
            if !self.merge_pass(pg, &invariants, &mut blacklist)? {
                break;
            }
            merges += 1;
        }
        reporter.report(ReportData {
            phase: Phase::Coarsening,
            round: merges,
            partitions: pg.partition_count(),
            outstanding: 0,
            duration: started.elapsed(),
            done: true,
        });
        Ok(merges)
    }

    /// Tries all ordered pairs of partitions and keeps the first
    /// k-equivalent merge that does not violate any invariant. Returns
    /// whether a merge was kept; the caller restarts the pass, since the
    /// graph changed under the pair enumeration.
    fn merge_pass(
        &mut self,
        pg: &mut PartitionGraph,
        invariants: &InvariantSet,
        blacklist: &mut HashSet<u64, BuildHasherDefault<NoHashHasher<u64>>>,
    ) -> Result<bool, Error> {
        let k = self.options.k_tails_k;
        let partitions = pg.partition_ids();
        for &p in &partitions {
            for &q in &partitions {
                if p == q || blacklist.contains(&pair_key(p, q)) {
                    continue;
                }
                if !ktails::k_equals(pg, p, q, k, false) {
                    continue;
                }

                let before = self
                    .options
                    .perform_extra_checks
                    .then(|| pg.partition_ids());
                let rewind = pg.apply(Op::Merge(MergeOp::new(p, q)))?;

                if invariants.which_fail(pg).is_empty() {
                    debug!(?p, ?q, "merge keeps all invariants, accepted");
                    return Ok(true);
                }

                debug!(?p, ?q, "merge violates an invariant, rewinding");
                pg.apply(rewind)?;
                blacklist.insert(pair_key(p, q));
                if let Some(before) = before {
                    pg.check_sanity()?;
                    if pg.partition_ids() != before {
                        return Err(Error::InternalInconsistency(format!(
                            "partition set changed across a rewound merge of \
                             {:?} and {:?}",
                            p, q
                        )));
                    }
                }
            }
        }
        Ok(false)
    }

    fn extra_sanity(&self, pg: &PartitionGraph) -> Result<(), Error> {
        if self.options.perform_extra_checks {
            pg.check_sanity()?;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Merge attempts are direction-agnostic, so the blacklist keys on the
/// unordered pair.
fn pair_key(p: PartitionId, q: PartitionId) -> u64 {
    let (lo, hi) = if p.0 <= q.0 { (p.0, q.0) } else { (q.0, p.0) };
    (u64::from(hi) << 32) | u64::from(lo)
}
