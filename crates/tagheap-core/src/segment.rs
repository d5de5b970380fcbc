//! Arena storage and the OS growth primitive.
//!
//! The heap manager never touches real pointers. It addresses the
//! arena as a run of fixed-size units behind the [`Segment`] trait,
//! which bundles raw unit storage with the break-extension primitive
//! (`sbrk` and friends). [`SimSegment`] is the in-memory
//! implementation used by tests and benchmarks; the real
//! `sbrk`-backed one lives in `tagheap-abi`.

use thiserror::Error;

/// The fixed allocation quantum in bytes. All sizes the allocator
/// reasons about are counts of these units; one unit also holds
/// exactly one encoded boundary tag.
pub const UNIT_BYTES: usize = 16;

/// One unit's worth of raw arena bytes.
pub type RawUnit = [u8; UNIT_BYTES];

/// Index of a unit within one arena.
///
/// A dedicated newtype rather than a raw address: comparisons are
/// total within the arena, and adjacency arithmetic is explicit.
/// Indices from different segments must never be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitIndex(pub usize);

impl UnitIndex {
    /// The unit `delta` units above this one.
    #[must_use]
    pub fn offset(self, delta: usize) -> UnitIndex {
        UnitIndex(self.0 + delta)
    }

    /// The unit `delta` units below this one.
    #[must_use]
    pub fn back(self, delta: usize) -> UnitIndex {
        UnitIndex(self.0 - delta)
    }
}

/// Failure of the growth primitive. Always recoverable: the caller
/// sees it as an ordinary allocation failure, never a crash.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
    /// The primitive cannot extend the arena by the requested amount.
    #[error("growth primitive cannot extend the arena by {units} units")]
    Exhausted { units: usize },
    /// The primitive extended the address space, but not contiguously
    /// with the previous top (something else moved the break).
    /// Linking such a region would break the arena partition.
    #[error("arena extension is not contiguous with the previous top")]
    NonContiguous,
}

/// A growable run of units holding the managed bytes.
///
/// Block metadata lives *inside* these units, so the trait exposes raw
/// unit reads and writes alongside growth. Implementations only
/// provide storage; they know nothing about blocks or tags.
pub trait Segment {
    /// Current top of the managed range, in units. The zero-growth
    /// break query: used once to establish the arena bounds before
    /// the first allocation.
    fn top(&self) -> UnitIndex;

    /// Extends the managed range by `units`, returning the previous
    /// top. Must not change any state on failure.
    fn extend(&mut self, units: usize) -> Result<UnitIndex, GrowError>;

    /// Reads the unit at `idx`. `idx` must be below [`Segment::top`].
    fn read(&self, idx: UnitIndex) -> RawUnit;

    /// Overwrites the unit at `idx`. `idx` must be below
    /// [`Segment::top`].
    fn write(&mut self, idx: UnitIndex, unit: RawUnit);
}

/// In-memory segment with an optional capacity limit.
///
/// The limit makes resource exhaustion deterministic: a segment built
/// with [`SimSegment::with_limit`] refuses to grow past it, which is
/// how the exhaustion paths get exercised without a real OS in the
/// loop.
pub struct SimSegment {
    units: Vec<RawUnit>,
    limit: usize,
}

impl SimSegment {
    /// Unlimited segment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Segment that refuses to grow beyond `limit_units` total units.
    #[must_use]
    pub fn with_limit(limit_units: usize) -> Self {
        Self {
            units: Vec::new(),
            limit: limit_units,
        }
    }
}

impl Default for SimSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl Segment for SimSegment {
    fn top(&self) -> UnitIndex {
        UnitIndex(self.units.len())
    }

    fn extend(&mut self, units: usize) -> Result<UnitIndex, GrowError> {
        let new_len = self
            .units
            .len()
            .checked_add(units)
            .ok_or(GrowError::Exhausted { units })?;
        if new_len > self.limit {
            return Err(GrowError::Exhausted { units });
        }
        let prev_top = self.top();
        self.units.resize(new_len, [0u8; UNIT_BYTES]);
        Ok(prev_top)
    }

    fn read(&self, idx: UnitIndex) -> RawUnit {
        self.units[idx.0]
    }

    fn write(&mut self, idx: UnitIndex, unit: RawUnit) {
        self.units[idx.0] = unit;
    }
}
