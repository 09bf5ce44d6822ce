//! A library for inferring concise finite-state models from execution logs.
//!
//! Starting from a [`TraceGraph`] of parsed events, the library mines the
//! binary temporal invariants that hold across all traces
//! ([`invariant::mine`]), builds a coarse partition abstraction of the graph
//! ([`PartitionGraph`]), and then alternately refines (splits) and coarsens
//! (merges) partitions ([`Engine`]) until the abstraction satisfies every
//! mined invariant while being as small as the invariants allow.
//!
//! ```
//! use traceright::{synthesize, Options, TraceGraphBuilder};
//!
//! let mut builder = TraceGraphBuilder::new();
//! builder.chain(0, &["open", "read", "close"])?;
//! builder.chain(1, &["open", "close"])?;
//! let graph = builder.build()?;
//!
//! let model = synthesize(&graph, Options::default())?;
//! assert!(model.invariants().which_fail(&model).is_empty());
//! # Ok::<(), traceright::Error>(())
//! ```
//!
//! ## License
//!
//! Made available under the MIT License.

pub mod bisim;
pub mod checker;
pub mod invariant;
pub mod partition;
pub mod report;
pub mod test_util;
pub mod time;
pub mod trace;

pub use bisim::{k_equals, Engine, RunStats};
pub use checker::CounterExamplePath;
pub use invariant::{BinaryInvariant, InvariantKind, InvariantSet};
pub use partition::{Op, Partition, PartitionGraph, PartitionId};
pub use time::{Timestamp, VectorClock};
pub use trace::{EventId, EventNode, TraceGraph, TraceGraphBuilder};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// The name of a transition relation. Interned so that cloning a transition
/// is cheap.
pub type Relation = Arc<str>;

/// The default temporal relation, `"t"`.
pub const DEFAULT_RELATION: &str = "t";

/// The default temporal relation as an interned [`Relation`].
pub fn temporal_relation() -> Relation {
    DEFAULT_RELATION.into()
}

/// A kind of event. Two distinguished types mark the dummy nodes that open
/// and close every trace; parsed events carry a plain label or a
/// `(label, process id)` pair. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The type of the dummy event preceding every trace.
    Initial,
    /// The type of the dummy event following every trace.
    Terminal,
    /// A plain event label.
    Label(String),
    /// An event attributed to one process of a distributed trace.
    Distributed { label: String, pid: u32 },
}

impl EventType {
    pub fn label(label: impl Into<String>) -> Self {
        EventType::Label(label.into())
    }

    pub fn distributed(label: impl Into<String>, pid: u32) -> Self {
        EventType::Distributed {
            label: label.into(),
            pid,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, EventType::Initial)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::Terminal)
    }

    /// True for the two distinguished dummy types.
    pub fn is_special(&self) -> bool {
        self.is_initial() || self.is_terminal()
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Initial => write!(f, "INITIAL"),
            EventType::Terminal => write!(f, "TERMINAL"),
            EventType::Label(label) => write!(f, "{}", label),
            EventType::Distributed { label, pid } => write!(f, "{}@{}", label, pid),
        }
    }
}

/// A directed graph with typed nodes and relation-labelled edges: the seam
/// both checker modes and the k-tails comparison work against, implemented
/// by [`TraceGraph`] over events and by [`PartitionGraph`] over partitions.
pub trait StateGraph {
    /// A cheap node handle.
    type Node: Copy + Eq + Ord + std::hash::Hash + std::fmt::Debug;

    /// Every node, in deterministic order.
    fn nodes(&self) -> Vec<Self::Node>;

    /// The nodes checker walks start from.
    fn initial_nodes(&self) -> Vec<Self::Node>;

    /// The event type labelling `node`.
    fn node_type(&self, node: Self::Node) -> &EventType;

    /// True if a walk may accept at `node`.
    fn is_accept(&self, node: Self::Node) -> bool;

    /// The targets of `node`'s outgoing edges under one relation.
    fn successors(&self, node: Self::Node, relation: &str) -> Vec<Self::Node>;

    /// The relations occurring in the graph, in deterministic order.
    fn relations(&self) -> Vec<Relation>;
}

/// The recognised inference options, with their defaults.
///
/// Built in the usual way:
///
/// ```
/// use traceright::Options;
/// let options = Options::default().random_seed(7).k_tails_k(2);
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    /// Use the bit-set/tracing FSM checking engine. This is the only engine
    /// this crate ships; `false` is accepted for interface compatibility and
    /// rejected at run time.
    pub use_fsm_checker: bool,
    /// Skip the refinement phase (diagnostic).
    pub no_refinement: bool,
    /// Skip the coarsening phase (diagnostic).
    pub no_coarsening: bool,
    /// Run `check_sanity` and split validation after each operation.
    pub perform_extra_checks: bool,
    /// Seed for the deterministic shuffling of counter-examples.
    pub random_seed: u64,
    /// Emit incoming-transition-based candidate splits during refinement.
    pub incoming_transition_split: bool,
    /// Equivalence depth for coarsening, `>= 0`.
    pub k_tails_k: usize,
    /// Use the iterative Warshall transitive-closure algorithm instead of
    /// depth-first marking.
    pub warshall_closure: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            use_fsm_checker: true,
            no_refinement: false,
            no_coarsening: false,
            perform_extra_checks: false,
            random_seed: 0,
            incoming_transition_split: true,
            k_tails_k: 1,
            warshall_closure: true,
        }
    }
}

impl Options {
    pub fn use_fsm_checker(self, use_fsm_checker: bool) -> Self {
        Self {
            use_fsm_checker,
            ..self
        }
    }

    pub fn no_refinement(self, no_refinement: bool) -> Self {
        Self {
            no_refinement,
            ..self
        }
    }

    pub fn no_coarsening(self, no_coarsening: bool) -> Self {
        Self {
            no_coarsening,
            ..self
        }
    }

    pub fn perform_extra_checks(self, perform_extra_checks: bool) -> Self {
        Self {
            perform_extra_checks,
            ..self
        }
    }

    pub fn random_seed(self, random_seed: u64) -> Self {
        Self {
            random_seed,
            ..self
        }
    }

    pub fn incoming_transition_split(self, incoming_transition_split: bool) -> Self {
        Self {
            incoming_transition_split,
            ..self
        }
    }

    pub fn k_tails_k(self, k_tails_k: usize) -> Self {
        Self { k_tails_k, ..self }
    }

    pub fn warshall_closure(self, warshall_closure: bool) -> Self {
        Self {
            warshall_closure,
            ..self
        }
    }
}

/// Everything that can go wrong between parsed input and inferred model.
///
/// A CLI wrapper conventionally exits 0 on success, 1 on rejected input and
/// 2 on everything else; see [`Error::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The parsed input violates the input contract; surfaced at the
    /// builder boundary, never from inside the core.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Refinement ran out of candidate splits with counter-examples left.
    /// Expected to be reachable on partially ordered inputs only; for
    /// totally ordered traces it indicates a defect.
    #[error("could not satisfy invariants: {remaining:?}")]
    InvariantsUnsatisfiable { remaining: Vec<BinaryInvariant> },

    /// A post-condition check failed; the message carries the operation
    /// context needed to reproduce.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// An interface-compatible option names functionality this crate does
    /// not ship.
    #[error("unsupported option: {0}")]
    Unsupported(&'static str),

    /// The cooperative cancel flag was raised; the caller keeps the
    /// partially transformed graph.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// The conventional process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedInput(_) => 1,
            _ => 2,
        }
    }
}

/// The whole pipeline in one call: mines invariants from `graph`, builds
/// the initial by-type abstraction, refines until the invariants hold, then
/// coarsens. The returned graph carries the mined invariant set.
pub fn synthesize(graph: &TraceGraph, options: Options) -> Result<PartitionGraph<'_>, Error> {
    let invariants = invariant::mine(graph, &options);
    let mut abstraction = PartitionGraph::new(graph, invariants);
    Engine::new(options).run(&mut abstraction)?;
    Ok(abstraction)
}
