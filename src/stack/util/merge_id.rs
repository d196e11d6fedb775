use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::stack::msg::Address;

/// Identifies one merge round, unique per creator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeId {
    creator: Address,
    id: u64,
}

impl MergeId {
    pub fn creator(&self) -> Address {
        self.creator
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for MergeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.creator, self.id)
    }
}

/// Hands out strictly increasing merge ids. Can live in a `static`:
///
/// ```
/// use courier::stack::{msg::Address, util::MergeIdGenerator};
///
/// static MERGE_IDS: MergeIdGenerator = MergeIdGenerator::new(1);
///
/// let a = MERGE_IDS.next(Address::new(1));
/// let b = MERGE_IDS.next(Address::new(1));
/// assert!(a.id() < b.id());
/// ```
#[derive(Debug)]
pub struct MergeIdGenerator {
    next: AtomicU64,
}

impl MergeIdGenerator {
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    pub fn next(&self, creator: Address) -> MergeId {
        MergeId {
            creator,
            id: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}
