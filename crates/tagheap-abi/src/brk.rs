//! The `sbrk`-backed segment.
//!
//! Maps unit indices onto real process addresses: unit `i` lives at
//! byte address `i * UNIT_BYTES`. The segment owns the address range
//! it has claimed from the break and nothing else; it refuses to grow
//! when something else in the process has moved the break since the
//! last claim, because linking memory it does not own into the arena
//! would hand that memory out to callers.

use std::ffi::c_void;

use tagheap_core::{GrowError, RawUnit, Segment, UNIT_BYTES, UnitIndex};

pub struct BrkSegment {
    /// Lowest unit index this segment may touch.
    origin: UnitIndex,
    /// Byte address of the break as of our last claim.
    known_break: usize,
}

impl BrkSegment {
    /// Claims the current program break, padded up to a unit boundary.
    /// Returns `None` when the break cannot be queried or padded.
    #[must_use]
    pub fn new() -> Option<Self> {
        // SAFETY: sbrk(0) only queries the current break.
        let cur = unsafe { libc::sbrk(0) };
        if cur as isize == -1 {
            return None;
        }
        let addr = cur as usize;
        let aligned = addr.next_multiple_of(UNIT_BYTES);
        if aligned > addr {
            // SAFETY: moves the break forward by less than one unit.
            let prev = unsafe { libc::sbrk((aligned - addr) as libc::intptr_t) };
            if prev as isize == -1 {
                return None;
            }
        }
        Some(Self {
            origin: UnitIndex(aligned / UNIT_BYTES),
            known_break: aligned,
        })
    }

    fn unit_ptr(&self, idx: UnitIndex) -> *mut c_void {
        debug_assert!(idx >= self.origin, "unit below the segment origin");
        debug_assert!(
            (idx.0 + 1) * UNIT_BYTES <= self.known_break,
            "unit beyond the claimed break"
        );
        (idx.0 * UNIT_BYTES) as *mut c_void
    }
}

impl Segment for BrkSegment {
    fn top(&self) -> UnitIndex {
        UnitIndex(self.known_break / UNIT_BYTES)
    }

    fn extend(&mut self, units: usize) -> Result<UnitIndex, GrowError> {
        let bytes = units
            .checked_mul(UNIT_BYTES)
            .ok_or(GrowError::Exhausted { units })?;
        let delta =
            libc::intptr_t::try_from(bytes).map_err(|_| GrowError::Exhausted { units })?;

        // SAFETY: sbrk(0) only queries the current break.
        let cur = unsafe { libc::sbrk(0) } as usize;
        if cur != self.known_break {
            return Err(GrowError::NonContiguous);
        }
        // SAFETY: claims `bytes` bytes at the current break for this
        // segment; nothing else in the arena refers to them yet.
        let prev = unsafe { libc::sbrk(delta) };
        if prev as isize == -1 {
            return Err(GrowError::Exhausted { units });
        }
        if prev as usize != self.known_break {
            // The break moved between the query and the claim. The
            // claimed range is not adjacent to the arena, so it cannot
            // be linked in; it stays unused.
            return Err(GrowError::NonContiguous);
        }
        let prev_top = self.top();
        self.known_break += bytes;
        Ok(prev_top)
    }

    fn read(&self, idx: UnitIndex) -> RawUnit {
        let p = self.unit_ptr(idx);
        // SAFETY: unit_ptr checks that idx lies in the claimed range.
        unsafe { std::ptr::read(p.cast::<RawUnit>()) }
    }

    fn write(&mut self, idx: UnitIndex, unit: RawUnit) {
        let p = self.unit_ptr(idx);
        // SAFETY: unit_ptr checks that idx lies in the claimed range.
        unsafe { std::ptr::write(p.cast::<RawUnit>(), unit) }
    }
}
