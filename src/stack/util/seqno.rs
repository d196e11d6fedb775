use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeqnoError {
    #[error("seqno {seqno} is outside of [{low}, {high}]")]
    OutOfRange { seqno: u64, low: u64, high: u64 },
    #[error("invalid range: low {low} is greater than high {high}")]
    InvalidRange { low: u64, high: u64 },
    #[error("range [{low}, {high}] spans more than {max} seqnos")]
    TooLarge { low: u64, high: u64, max: u64 },
}

pub type SeqnoResult<T> = Result<T, SeqnoError>;

/// An inclusive run of seqnos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub low: u64,
    pub high: u64,
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// A single seqno and whether it has been received.
///
/// A dummy seqno is only ever used as a lookup key, see [`SeqnoComparator`].
#[derive(Clone, Debug)]
pub struct Seqno {
    low: u64,
    dummy: bool,
    received: bool,
}

impl Seqno {
    pub fn new(low: u64) -> Self {
        Self {
            low,
            dummy: false,
            received: false,
        }
    }

    pub fn dummy(low: u64) -> Self {
        Self {
            low,
            dummy: true,
            received: false,
        }
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub fn contains(&self, seqno: u64) -> bool {
        seqno == self.low
    }

    pub fn size(&self) -> u64 {
        1
    }

    pub fn set(&mut self, seqno: u64) -> SeqnoResult<()> {
        self.check(seqno)?;
        self.received = true;
        Ok(())
    }

    pub fn get(&self, seqno: u64) -> bool {
        self.contains(seqno) && self.received
    }

    pub fn clear(&mut self, seqno: u64) -> SeqnoResult<()> {
        self.check(seqno)?;
        self.received = false;
        Ok(())
    }

    pub fn num_received(&self) -> u64 {
        self.received as u64
    }

    pub fn num_missing(&self) -> u64 {
        1 - self.num_received()
    }

    fn check(&self, seqno: u64) -> SeqnoResult<()> {
        if self.contains(seqno) {
            Ok(())
        } else {
            Err(SeqnoError::OutOfRange {
                seqno,
                low: self.low,
                high: self.low,
            })
        }
    }
}

/// An inclusive range of seqnos with one received bit per seqno. A range
/// covers at most [`SeqnoRange::MAX_SIZE`] seqnos.
#[derive(Clone)]
pub struct SeqnoRange {
    low: u64,
    high: u64,
    bits: Vec<u64>,
    received: u64,
}

impl SeqnoRange {
    pub const MAX_SIZE: u64 = i32::MAX as u64;

    pub fn new(low: u64, high: u64) -> SeqnoResult<Self> {
        if low > high {
            return Err(SeqnoError::InvalidRange { low, high });
        }
        let span = high - low;
        if span >= Self::MAX_SIZE {
            return Err(SeqnoError::TooLarge {
                low,
                high,
                max: Self::MAX_SIZE,
            });
        }
        let words = (span / 64 + 1) as usize;
        Ok(Self {
            low,
            high,
            bits: vec![0; words],
            received: 0,
        })
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn size(&self) -> u64 {
        self.high - self.low + 1
    }

    pub fn contains(&self, seqno: u64) -> bool {
        self.low <= seqno && seqno <= self.high
    }

    pub fn set(&mut self, seqno: u64) -> SeqnoResult<()> {
        let (word, mask) = self.index(seqno)?;
        if self.bits[word] & mask == 0 {
            self.bits[word] |= mask;
            self.received += 1;
        }
        Ok(())
    }

    /// Sets every seqno in `seqnos`, stopping at the first one outside the
    /// range.
    pub fn set_all(&mut self, seqnos: &[u64]) -> SeqnoResult<()> {
        seqnos.iter().try_for_each(|&seqno| self.set(seqno))
    }

    pub fn get(&self, seqno: u64) -> bool {
        match self.index(seqno) {
            Ok((word, mask)) => self.bits[word] & mask != 0,
            Err(_) => false,
        }
    }

    pub fn clear(&mut self, seqno: u64) -> SeqnoResult<()> {
        let (word, mask) = self.index(seqno)?;
        if self.bits[word] & mask != 0 {
            self.bits[word] &= !mask;
            self.received -= 1;
        }
        Ok(())
    }

    pub fn num_received(&self) -> u64 {
        self.received
    }

    pub fn num_missing(&self) -> u64 {
        self.size() - self.received
    }

    /// Maximal runs of seqnos whose bit equals `value`, in ascending order.
    pub fn bits(&self, value: bool) -> Vec<Range> {
        let mut runs = Vec::new();
        let mut start = None;
        for seqno in self.low..=self.high {
            match (self.get(seqno) == value, start) {
                (true, None) => start = Some(seqno),
                (false, Some(low)) => {
                    runs.push(Range {
                        low,
                        high: seqno - 1,
                    });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(low) = start {
            runs.push(Range {
                low,
                high: self.high,
            });
        }
        runs
    }

    /// The runs of seqnos that still need to be retransmitted.
    pub fn missing(&self) -> Vec<Range> {
        self.bits(false)
    }

    fn index(&self, seqno: u64) -> SeqnoResult<(usize, u64)> {
        if !self.contains(seqno) {
            return Err(SeqnoError::OutOfRange {
                seqno,
                low: self.low,
                high: self.high,
            });
        }
        let offset = seqno - self.low;
        Ok(((offset / 64) as usize, 1 << (offset % 64)))
    }
}

impl fmt::Debug for SeqnoRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}-{}] received={} missing={}",
            self.low,
            self.high,
            self.received,
            self.num_missing()
        )
    }
}

/// Either a single seqno or a range, as stored in a sorted lookup structure.
#[derive(Clone, Debug)]
pub enum SeqnoEntry {
    Single(Seqno),
    Range(SeqnoRange),
}

impl SeqnoEntry {
    pub fn low(&self) -> u64 {
        match self {
            SeqnoEntry::Single(s) => s.low(),
            SeqnoEntry::Range(r) => r.low(),
        }
    }

    pub fn high(&self) -> u64 {
        match self {
            SeqnoEntry::Single(s) => s.low(),
            SeqnoEntry::Range(r) => r.high(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self, SeqnoEntry::Single(s) if s.is_dummy())
    }

    pub fn contains(&self, seqno: u64) -> bool {
        self.low() <= seqno && seqno <= self.high()
    }
}

impl From<Seqno> for SeqnoEntry {
    fn from(seqno: Seqno) -> Self {
        SeqnoEntry::Single(seqno)
    }
}

impl From<SeqnoRange> for SeqnoEntry {
    fn from(range: SeqnoRange) -> Self {
        SeqnoEntry::Range(range)
    }
}

/// Orders stored entries by `low`, and matches a dummy key against the stored
/// entry containing it. With non-overlapping stored entries this turns a
/// sorted map into a containment index.
#[derive(Clone, Copy, Debug, Default)]
pub struct SeqnoComparator;

impl SeqnoComparator {
    pub fn compare(&self, a: &SeqnoEntry, b: &SeqnoEntry) -> Ordering {
        match (a.is_dummy(), b.is_dummy()) {
            (true, false) => Self::locate(a.low(), b),
            (false, true) => Self::locate(b.low(), a).reverse(),
            _ => a.low().cmp(&b.low()),
        }
    }

    fn locate(key: u64, stored: &SeqnoEntry) -> Ordering {
        if key < stored.low() {
            Ordering::Less
        } else if key > stored.high() {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

impl Ord for SeqnoEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        SeqnoComparator.compare(self, other)
    }
}

impl PartialOrd for SeqnoEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SeqnoEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SeqnoEntry {}

/// Stored entries hash by `low`, matching their equality. Dummy keys are only
/// meaningful for ordered lookups.
impl Hash for SeqnoEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.low().hash(state);
    }
}
