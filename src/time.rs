//! Timestamps attached to parsed events.
//!
//! A log can carry one of several time types, fixed per run: a logical
//! counter, an integer or floating point wall-clock reading, or a vector
//! clock for partially ordered (distributed) traces. Only timestamps of the
//! same kind are comparable, and vector clocks are themselves only partially
//! ordered, so [`Timestamp`] implements [`PartialOrd`] and nothing stronger.

use serde::{Deserialize, Serialize};
use std::cmp::{max, Ordering};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A point in time, or a delta between two points in time, attached to an
/// event or a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Timestamp {
    /// A logical counter, e.g. the line number order of a totally ordered log.
    Count(u64),
    /// An integer clock reading.
    Int(i64),
    /// A single precision clock reading.
    Float(f32),
    /// A double precision clock reading.
    Double(f64),
    /// A vector clock, for partially ordered traces.
    Vector(VectorClock),
}

impl Timestamp {
    /// True if `self` and `other` carry the same time type. Mixing time types
    /// within one run is a parse error at the boundary.
    pub fn same_kind(&self, other: &Timestamp) -> bool {
        matches!(
            (self, other),
            (Timestamp::Count(_), Timestamp::Count(_))
                | (Timestamp::Int(_), Timestamp::Int(_))
                | (Timestamp::Float(_), Timestamp::Float(_))
                | (Timestamp::Double(_), Timestamp::Double(_))
                | (Timestamp::Vector(_), Timestamp::Vector(_))
        )
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Count(a), Timestamp::Count(b)) => a.partial_cmp(b),
            (Timestamp::Int(a), Timestamp::Int(b)) => a.partial_cmp(b),
            (Timestamp::Float(a), Timestamp::Float(b)) => a.partial_cmp(b),
            (Timestamp::Double(a), Timestamp::Double(b)) => a.partial_cmp(b),
            (Timestamp::Vector(a), Timestamp::Vector(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Count(c) => write!(f, "{}", c),
            Timestamp::Int(i) => write!(f, "{}", i),
            Timestamp::Float(x) => write!(f, "{}", x),
            Timestamp::Double(x) => write!(f, "{}", x),
            Timestamp::Vector(v) => write!(f, "{}", v),
        }
    }
}

/// A [vector clock](https://en.wikipedia.org/wiki/Vector_clock) inducing a
/// partial causal order on the events of a distributed trace.
///
/// Missing components are implicitly zero, so `[1, 2]` and `[1, 2, 0]` are
/// equal (and hash identically).
#[derive(Clone, Debug, Default, Eq, Serialize, Deserialize)]
pub struct VectorClock(Vec<u32>);

impl VectorClock {
    /// The zero clock.
    pub fn new() -> Self {
        VectorClock(Vec::new())
    }

    /// Returns the clock advanced by one step of the process at `index`.
    pub fn tick(mut self, index: usize) -> Self {
        if index >= self.0.len() {
            self.0.resize(index + 1, 0);
        }
        self.0[index] += 1;
        self
    }

    /// Returns the componentwise maximum of two clocks, i.e. their join in
    /// the happened-before lattice.
    pub fn join(&self, other: &VectorClock) -> Self {
        let mut joined = vec![0; max(self.0.len(), other.0.len())];
        for (i, c) in joined.iter_mut().enumerate() {
            *c = max(self.component(i), other.component(i));
        }
        VectorClock(joined)
    }

    /// True if `self` happened strictly before `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.partial_cmp(other) == Some(Ordering::Less)
    }

    fn component(&self, i: usize) -> u32 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl From<Vec<u32>> for VectorClock {
    fn from(components: Vec<u32>) -> Self {
        VectorClock(components)
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        (0..max(self.0.len(), other.0.len())).all(|i| self.component(i) == other.component(i))
    }
}

impl Hash for VectorClock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Trailing zeros are not significant for equality, so they must not
        // be significant for the hash either.
        let end = self
            .0
            .iter()
            .rposition(|c| *c != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.0[..end].hash(state);
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut so_far = Ordering::Equal;
        for i in 0..max(self.0.len(), other.0.len()) {
            let here = self.component(i).cmp(&other.component(i));
            if so_far == Ordering::Equal {
                so_far = here;
            } else if here != so_far && here != Ordering::Equal {
                // One component ahead and another behind: incomparable.
                return None;
            }
        }
        Some(so_far)
    }
}

impl Display for VectorClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clocks_ignore_trailing_zeros() {
        assert_eq!(VectorClock::from(vec![1, 2]), VectorClock::from(vec![1, 2, 0]));
        assert_eq!(VectorClock::new(), VectorClock::from(vec![0, 0]));
        assert_ne!(VectorClock::from(vec![1]), VectorClock::from(vec![1, 1]));
    }

    #[test]
    fn equal_clocks_hash_equally() {
        use std::collections::hash_map::DefaultHasher;
        let digest = |v: &VectorClock| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(
            digest(&VectorClock::from(vec![3, 0, 0])),
            digest(&VectorClock::from(vec![3]))
        );
    }

    #[test]
    fn tick_and_join() {
        let a = VectorClock::new().tick(0).tick(2);
        assert_eq!(a, VectorClock::from(vec![1, 0, 1]));
        assert_eq!(
            a.join(&VectorClock::from(vec![0, 5])),
            VectorClock::from(vec![1, 5, 1])
        );
    }

    #[test]
    fn partial_order() {
        let a = VectorClock::from(vec![1, 2, 3]);
        assert!(a.happened_before(&VectorClock::from(vec![1, 2, 4])));
        assert!(!a.happened_before(&a.clone()));
        // Mixed components are incomparable.
        assert_eq!(a.partial_cmp(&VectorClock::from(vec![3, 2, 1])), None);
        assert_eq!(
            VectorClock::from(vec![2]).partial_cmp(&VectorClock::new()),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn timestamps_of_different_kinds_are_incomparable() {
        assert_eq!(Timestamp::Count(1).partial_cmp(&Timestamp::Int(2)), None);
        assert!(Timestamp::Double(1.5) < Timestamp::Double(2.0));
        assert!(Timestamp::Vector(VectorClock::new().tick(0))
            .partial_cmp(&Timestamp::Vector(VectorClock::new().tick(1)))
            .is_none());
    }
}
