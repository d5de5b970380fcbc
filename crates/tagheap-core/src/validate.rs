//! Debug-build heap validation.
//!
//! [`Heap::assert_valid`] cross-checks the two views of the arena.
//! Pass one walks the physical tiling: header to header by span,
//! checking that every footer agrees with its header and that no two
//! adjacent free blocks were left uncoalesced. Pass two walks the
//! free list and requires it to describe exactly the free blocks the
//! tiling found, in address order, with consistent backward links.
//!
//! The whole check is compiled out of release builds; it runs on
//! entry and exit of every public heap operation in debug builds and
//! is the main line of defense the tests lean on.

use crate::heap::Heap;
use crate::segment::{Segment, UnitIndex};
use crate::tag::{self, MIN_BLOCK_SPAN};

impl<S: Segment> Heap<S> {
    /// Panics if any heap invariant is broken. Debug builds only.
    pub(crate) fn assert_valid(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        if !self.booted {
            assert!(self.free_head.is_none(), "free list exists before bootstrap");
            return;
        }

        // Pass one: the arena must tile exactly into valid blocks.
        let mut free_blocks = Vec::new();
        let mut prev_was_free = false;
        let mut cur = self.heap_lo;
        while cur < self.heap_hi {
            let header = tag::tag_at(&self.seg, cur);
            assert!(header.is_header, "unit {cur:?} is not a block header");
            let span = header.span as usize;
            assert!(
                span >= MIN_BLOCK_SPAN,
                "block at {cur:?} has span {span}, below the minimum"
            );
            let end = cur.offset(span);
            assert!(end <= self.heap_hi, "block at {cur:?} overruns the arena top");
            let footer = tag::tag_at(&self.seg, end.back(1));
            assert!(
                !footer.is_header && footer.span as usize == span,
                "footer of block at {cur:?} disagrees with its header"
            );
            if !header.allocated {
                assert!(
                    !prev_was_free,
                    "adjacent free blocks left uncoalesced at {cur:?}"
                );
                free_blocks.push(cur);
            }
            prev_was_free = !header.allocated;
            cur = end;
        }

        // Pass two: the free list must describe exactly those blocks.
        let mut listed = Vec::new();
        let mut prev: Option<UnitIndex> = None;
        let mut cursor = self.free_head;
        while let Some(block) = cursor {
            assert!(
                listed.len() < free_blocks.len() + 1,
                "free list visits more blocks than the arena holds"
            );
            let header = tag::tag_at(&self.seg, block);
            assert!(
                header.is_header && !header.allocated,
                "listed block at {block:?} is not a free header"
            );
            assert!(
                prev.is_none_or(|p| p < block),
                "free list breaks address order at {block:?}"
            );
            let footer = tag::tag_at(&self.seg, block.offset(header.span as usize - 1));
            assert!(
                footer.link == prev,
                "backward link of block at {block:?} does not match its predecessor"
            );
            listed.push(block);
            prev = Some(block);
            cursor = header.link;
        }
        assert!(
            listed == free_blocks,
            "free list does not describe the arena's free blocks: {listed:?} vs {free_blocks:?}"
        );
    }
}
