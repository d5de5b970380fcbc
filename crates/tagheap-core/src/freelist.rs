//! The address-ordered free list.
//!
//! Free blocks form a doubly-linked list, strictly increasing by
//! address: forward links live in headers, backward links in footers.
//! Address order is what makes coalescing checks O(1) at insertion
//! time: the list neighbors are the only candidates for physical
//! adjacency. Every mutation here keeps both link directions
//! consistent; a stale link silently corrupts the whole heap.

use crate::heap::Heap;
use crate::segment::{Segment, UnitIndex};
use crate::tag;

impl<S: Segment> Heap<S> {
    /// Finds the consecutive free blocks `(prev, next)` bracketing
    /// `addr`, either end open. O(n) in the number of free blocks.
    pub(crate) fn locate_insertion_point(
        &self,
        addr: UnitIndex,
    ) -> (Option<UnitIndex>, Option<UnitIndex>) {
        let mut prev = None;
        let mut cur = self.free_head;
        while let Some(block) = cur {
            if block > addr {
                break;
            }
            debug_assert!(block < addr, "block at {addr:?} is already on the free list");
            prev = Some(block);
            cur = tag::next_free(&self.seg, block);
        }
        (prev, cur)
    }

    /// Marks `block` free, links it between `prev` and `next`, then
    /// merges it with whichever of the two is physically adjacent
    /// (possibly both). Returns the surviving block; a merge always
    /// keeps the lower-address header, and the absorbed block's tag
    /// pair decays into payload bytes of the survivor.
    pub(crate) fn insert_and_coalesce(
        &mut self,
        prev: Option<UnitIndex>,
        next: Option<UnitIndex>,
        block: UnitIndex,
    ) -> UnitIndex {
        debug_assert!(tag::is_header(&self.seg, block));
        debug_assert!(
            tag::is_allocated(&self.seg, block),
            "inserted block must arrive allocated"
        );
        debug_assert!(prev.is_none_or(|p| p < block));
        debug_assert!(next.is_none_or(|n| n > block));

        tag::set_free(&mut self.seg, block);
        tag::set_next_free(&mut self.seg, block, next);
        let footer = tag::footer_of(&self.seg, block);
        tag::set_prev_free(&mut self.seg, footer, prev);
        match prev {
            None => self.free_head = Some(block),
            Some(p) => tag::set_next_free(&mut self.seg, p, Some(block)),
        }
        if let Some(n) = next {
            let n_footer = tag::footer_of(&self.seg, n);
            tag::set_prev_free(&mut self.seg, n_footer, Some(block));
        }

        let mut block = block;
        if let Some(p) = prev {
            if tag::prev_block(&self.seg, block, self.heap_lo) == Some(p) {
                block = self.coalesce_two(p, block);
            }
        }
        if let Some(n) = next {
            if tag::next_block(&self.seg, block, self.heap_hi) == Some(n) {
                block = self.coalesce_two(block, n);
            }
        }
        block
    }

    /// Removes `block` from the list and marks it allocated. `prev`
    /// is its current list predecessor (`None` when it is the head).
    pub(crate) fn detach(&mut self, prev: Option<UnitIndex>, block: UnitIndex) {
        debug_assert!(!tag::is_allocated(&self.seg, block));
        debug_assert!(match prev {
            None => self.free_head == Some(block),
            Some(p) => tag::next_free(&self.seg, p) == Some(block),
        });

        let next = tag::next_free(&self.seg, block);
        match prev {
            None => self.free_head = next,
            Some(p) => tag::set_next_free(&mut self.seg, p, next),
        }
        if let Some(n) = next {
            let n_footer = tag::footer_of(&self.seg, n);
            tag::set_prev_free(&mut self.seg, n_footer, prev);
        }

        let footer = tag::footer_of(&self.seg, block);
        tag::set_next_free(&mut self.seg, block, None);
        tag::set_prev_free(&mut self.seg, footer, None);
        tag::set_allocated(&mut self.seg, block);
    }

    /// Merges two free, physically adjacent list neighbors into one
    /// block headed at `lower`. The merged footer lands on `upper`'s
    /// old footer and inherits `lower`'s backward link.
    fn coalesce_two(&mut self, lower: UnitIndex, upper: UnitIndex) -> UnitIndex {
        debug_assert!(lower < upper);
        debug_assert!(!tag::is_allocated(&self.seg, lower));
        debug_assert!(!tag::is_allocated(&self.seg, upper));
        debug_assert!(tag::next_block(&self.seg, lower, self.heap_hi) == Some(upper));
        debug_assert!(tag::next_free(&self.seg, lower) == Some(upper));

        let upper_next = tag::next_free(&self.seg, upper);
        let merged_span = tag::span_of(&self.seg, lower) + tag::span_of(&self.seg, upper);
        tag::set_span(&mut self.seg, lower, merged_span);
        tag::set_next_free(&mut self.seg, lower, upper_next);
        if let Some(n) = upper_next {
            let n_footer = tag::footer_of(&self.seg, n);
            tag::set_prev_free(&mut self.seg, n_footer, Some(lower));
        }
        self.stats.coalesces += 1;
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;
    use crate::heap::HeapStats;
    use crate::segment::SimSegment;
    use crate::tag::init_block;

    /// A hand-built arena of four allocated span-3 blocks.
    fn raw_heap() -> Heap<SimSegment> {
        let mut seg = SimSegment::new();
        seg.extend(12).unwrap();
        for i in 0..4 {
            init_block(&mut seg, UnitIndex(i * 3), 3, true);
        }
        Heap {
            seg,
            free_head: None,
            heap_lo: UnitIndex(0),
            heap_hi: UnitIndex(12),
            booted: true,
            events: EventLog::default(),
            stats: HeapStats::default(),
        }
    }

    const B0: UnitIndex = UnitIndex(0);
    const B1: UnitIndex = UnitIndex(3);
    const B2: UnitIndex = UnitIndex(6);
    const B3: UnitIndex = UnitIndex(9);

    #[test]
    fn insert_without_adjacency_keeps_blocks_separate() {
        let mut h = raw_heap();
        assert_eq!(h.insert_and_coalesce(None, None, B1), B1);
        assert_eq!(h.free_head, Some(B1));

        let (prev, next) = h.locate_insertion_point(B3);
        assert_eq!((prev, next), (Some(B1), None));
        assert_eq!(h.insert_and_coalesce(prev, next, B3), B3);

        assert_eq!(tag::next_free(&h.seg, B1), Some(B3));
        assert_eq!(tag::prev_free(&h.seg, tag::footer_of(&h.seg, B3)), Some(B1));
        assert_eq!(h.stats.coalesces, 0);
        h.assert_valid();
    }

    #[test]
    fn insert_merges_with_lower_neighbor() {
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B1);
        let merged = h.insert_and_coalesce(Some(B1), None, B2);
        assert_eq!(merged, B1);
        assert_eq!(h.free_head, Some(B1));
        assert_eq!(tag::span_of(&h.seg, B1), 6);
        assert_eq!(tag::span_of(&h.seg, UnitIndex(8)), 6);
        assert_eq!(h.stats.coalesces, 1);
        h.assert_valid();
    }

    #[test]
    fn insert_merges_with_upper_neighbor() {
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B2);
        let merged = h.insert_and_coalesce(None, Some(B2), B1);
        assert_eq!(merged, B1);
        assert_eq!(h.free_head, Some(B1));
        assert_eq!(tag::span_of(&h.seg, B1), 6);
        assert_eq!(tag::next_free(&h.seg, B1), None);
        h.assert_valid();
    }

    #[test]
    fn insert_between_two_neighbors_merges_all_three() {
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B1);
        h.insert_and_coalesce(Some(B1), None, B3);
        let merged = h.insert_and_coalesce(Some(B1), Some(B3), B2);
        assert_eq!(merged, B1);
        assert_eq!(h.free_head, Some(B1));
        assert_eq!(tag::span_of(&h.seg, B1), 9);
        assert_eq!(tag::next_free(&h.seg, B1), None);
        assert_eq!(tag::prev_free(&h.seg, UnitIndex(11)), None);
        assert_eq!(h.stats.coalesces, 2);
        h.assert_valid();
    }

    #[test]
    fn merge_preserves_link_to_following_free_block() {
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B0);
        h.insert_and_coalesce(Some(B0), None, B3);
        // B1 merges down into B0; the survivor must still point at B3
        // and B3's backward link must follow the survivor.
        let merged = h.insert_and_coalesce(Some(B0), Some(B3), B1);
        assert_eq!(merged, B0);
        assert_eq!(tag::next_free(&h.seg, B0), Some(B3));
        assert_eq!(tag::prev_free(&h.seg, tag::footer_of(&h.seg, B3)), Some(B0));
        h.assert_valid();
    }

    #[test]
    fn detach_head_and_interior() {
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B1);
        h.insert_and_coalesce(Some(B1), None, B3);

        h.detach(Some(B1), B3);
        assert!(tag::is_allocated(&h.seg, B3));
        assert_eq!(tag::next_free(&h.seg, B1), None);
        h.assert_valid();

        h.detach(None, B1);
        assert_eq!(h.free_head, None);
        assert!(tag::is_allocated(&h.seg, B1));
        h.assert_valid();
    }

    #[test]
    fn detach_interior_patches_successor_back_link() {
        // List is B0 -> B2 (non-adjacent, so neither insert merges).
        let mut h = raw_heap();
        h.insert_and_coalesce(None, None, B0);
        h.insert_and_coalesce(Some(B0), None, B2);
        assert_eq!(
            h.locate_insertion_point(B3),
            (Some(B2), None),
            "scan must stop past the last free block"
        );

        // Detaching the head must clear the successor's back link.
        h.detach(None, B0);
        assert_eq!(h.free_head, Some(B2));
        assert_eq!(tag::prev_free(&h.seg, tag::footer_of(&h.seg, B2)), None);
        assert!(tag::is_allocated(&h.seg, B0));
        h.assert_valid();
    }
}
