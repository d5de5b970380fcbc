//! Arena extension policy.
//!
//! When no free block satisfies a request the heap asks its segment
//! for more units. Extensions are batched: even a tiny request grows
//! the arena by at least [`MIN_GROWTH_UNITS`] of payload, amortizing
//! the cost of the underlying break movement. The grown region enters
//! the heap as one ordinary free block at the top of the arena, where
//! list insertion coalesces it with a free former top if there is one.

use crate::event::HeapEventLevel;
use crate::heap::Heap;
use crate::segment::{GrowError, Segment, UnitIndex};
use crate::tag;

/// Minimum payload units claimed per arena extension.
pub const MIN_GROWTH_UNITS: usize = 1024;

impl<S: Segment> Heap<S> {
    /// Extends the arena by enough units for `need` payload units and
    /// links the new region into the free list as a single block.
    ///
    /// `prev` is the current tail of the free list (the trailing
    /// pointer of the failed fit scan); the new block is the highest
    /// address in the arena, so it can only ever be appended or
    /// merged into that tail. Returns the header of the resulting
    /// free block, or `None` with the heap untouched when the segment
    /// refuses to grow.
    pub(crate) fn grow_and_link(
        &mut self,
        prev: Option<UnitIndex>,
        need: usize,
    ) -> Option<UnitIndex> {
        let grow_units = need.max(MIN_GROWTH_UNITS) + 2;
        // Spans are stored in 32 bits; a request too large to encode
        // is unfulfillable no matter what the segment says.
        if u32::try_from(grow_units).is_err() {
            return self.grow_failed(grow_units, GrowError::Exhausted { units: grow_units });
        }
        let prev_top = match self.seg.extend(grow_units) {
            Ok(top) => top,
            Err(err) => return self.grow_failed(grow_units, err),
        };
        debug_assert_eq!(prev_top, self.heap_hi, "segment grew away from the arena top");

        self.heap_hi = prev_top.offset(grow_units);
        tag::init_block(&mut self.seg, prev_top, grow_units, true);
        self.stats.grow_calls += 1;
        self.record(
            HeapEventLevel::Info,
            "grow",
            "grow",
            None,
            Some(grow_units),
            "success",
        );
        Some(self.insert_and_coalesce(prev, None, prev_top))
    }

    fn grow_failed(&mut self, grow_units: usize, err: GrowError) -> Option<UnitIndex> {
        self.stats.grow_failures += 1;
        let outcome = match err {
            GrowError::Exhausted { .. } => "oom",
            GrowError::NonContiguous => "noncontiguous",
        };
        self.record(
            HeapEventLevel::Warn,
            "grow",
            "grow_failed",
            None,
            Some(grow_units),
            outcome,
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SimSegment;

    #[test]
    fn small_needs_are_batched_to_the_growth_floor() {
        let mut h = Heap::new(SimSegment::new());
        h.allocate(1).unwrap();
        assert_eq!(h.stats().heap_units, MIN_GROWTH_UNITS + 2);
    }

    #[test]
    fn large_needs_grow_by_exactly_what_they_ask() {
        let mut h = Heap::new(SimSegment::new());
        let need = 3 * MIN_GROWTH_UNITS;
        h.allocate(need * crate::segment::UNIT_BYTES).unwrap();
        assert_eq!(h.stats().heap_units, need + 2);
        // The whole extension was taken; nothing is left over.
        assert!(h.free_spans().is_empty());
        assert_eq!(h.stats().whole_takes, 1);
    }

    #[test]
    fn grown_region_appends_to_the_list_tail_without_false_merge() {
        let mut h = Heap::new(SimSegment::new());
        // Leave a free remainder at the bottom, with an allocated
        // block pinned at the arena top so growth cannot merge down.
        let top = h.allocate(64).unwrap();
        let before = h.free_spans();
        assert_eq!(before.len(), 1);

        h.allocate(2 * MIN_GROWTH_UNITS * crate::segment::UNIT_BYTES)
            .unwrap();
        let stats = h.stats();
        assert_eq!(stats.grow_calls, 2);
        assert_eq!(stats.coalesces, 0);
        assert_eq!(h.free_spans(), before);
        h.release(Some(top));
    }

    #[test]
    fn refused_growth_leaves_the_free_list_intact() {
        let mut h = Heap::new(SimSegment::with_limit(MIN_GROWTH_UNITS + 2));
        h.allocate(1).unwrap();
        let before = h.free_spans();
        assert_eq!(h.allocate(MIN_GROWTH_UNITS * crate::segment::UNIT_BYTES), None);
        assert_eq!(h.free_spans(), before);
        assert_eq!(h.stats().grow_failures, 1);
    }
}
