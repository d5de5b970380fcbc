//! Heap state and the public allocate/release pair.
//!
//! [`Heap`] owns a [`Segment`] and the free-list head, plus the arena
//! bounds `[heap_lo, heap_hi)`. Bounds are established lazily: the
//! first allocation queries the segment's current top once and grows
//! from there. The arena only ever grows.
//!
//! Allocation is first-fit over the address-ordered free list. A
//! found block is split when the leftover would still be a usable
//! block (header + at least one payload unit + footer); otherwise the
//! whole block is detached, accepting a little internal waste over
//! creating a fragment nothing can use.

use crate::event::{EventLog, HeapEvent, HeapEventLevel};
use crate::segment::{Segment, UNIT_BYTES, UnitIndex};
use crate::tag::{self, MIN_BLOCK_SPAN};

/// Counter snapshot for one heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Allocation requests served (zero-byte requests excluded).
    pub allocations: u64,
    /// Release calls that returned a block to the free list.
    pub releases: u64,
    /// Allocations served by splitting a larger free block.
    pub splits: u64,
    /// Allocations served by detaching a whole free block.
    pub whole_takes: u64,
    /// Physical merges of two adjacent free blocks.
    pub coalesces: u64,
    /// Successful arena extensions.
    pub grow_calls: u64,
    /// Refused or failed arena extensions.
    pub grow_failures: u64,
    /// Current arena size in units.
    pub heap_units: usize,
}

/// A boundary-tag heap over one growable segment.
///
/// Single-threaded by design: all state is mutated in place with no
/// locking, and the metadata lives inside the managed units, so
/// concurrent unsynchronized use would be a data race by
/// construction. Callers that need sharing must serialize access
/// externally (the ABI crate does exactly that).
pub struct Heap<S: Segment> {
    pub(crate) seg: S,
    /// Lowest-address free block, or none.
    pub(crate) free_head: Option<UnitIndex>,
    pub(crate) heap_lo: UnitIndex,
    pub(crate) heap_hi: UnitIndex,
    pub(crate) booted: bool,
    pub(crate) events: EventLog,
    pub(crate) stats: HeapStats,
}

impl<S: Segment> Heap<S> {
    /// A heap over `seg`. No arena is claimed until the first
    /// allocation.
    pub fn new(seg: S) -> Self {
        Self {
            seg,
            free_head: None,
            heap_lo: UnitIndex(0),
            heap_hi: UnitIndex(0),
            booted: false,
            events: EventLog::default(),
            stats: HeapStats::default(),
        }
    }

    /// Allocates at least `bytes` bytes, returning the first payload
    /// unit of the allocated block.
    ///
    /// Returns `None` for a zero-byte request (no mutation) or when
    /// the growth primitive cannot extend the arena (no mutation
    /// either; detect-before-mutate).
    pub fn allocate(&mut self, bytes: usize) -> Option<UnitIndex> {
        if bytes == 0 {
            self.record(
                HeapEventLevel::Warn,
                "allocate",
                "zero_request",
                None,
                None,
                "denied",
            );
            return None;
        }
        if !self.booted {
            self.bootstrap();
        }
        self.assert_valid();

        let need = bytes.div_ceil(UNIT_BYTES);

        let mut prevprev: Option<UnitIndex> = None;
        let mut prev: Option<UnitIndex> = None;
        let mut cur = self.free_head;
        while let Some(block) = cur {
            let payload = tag::span_of(&self.seg, block) - 2;
            if payload >= need {
                let carved = self.take_from(prev, block, need);
                self.stats.allocations += 1;
                self.assert_valid();
                return Some(carved.offset(1));
            }
            prevprev = prev;
            prev = Some(block);
            cur = tag::next_free(&self.seg, block);
        }

        // Nothing on the list fits: extend the arena. The grown
        // region may have merged into the list tail during insertion,
        // in which case the trailing pointer must step back one.
        let Some(grown) = self.grow_and_link(prev, need) else {
            self.assert_valid();
            return None;
        };
        if Some(grown) == prev {
            prev = prevprev;
        }
        let carved = self.take_from(prev, grown, need);
        self.stats.allocations += 1;
        self.assert_valid();
        Some(carved.offset(1))
    }

    /// Returns a block to the free list, coalescing with physically
    /// adjacent free neighbors. `None` is a no-op.
    ///
    /// `ptr` must be a payload pointer previously returned by
    /// [`Heap::allocate`] and not yet released; anything else is an
    /// internal-consistency failure caught in debug builds only.
    /// Payload bytes are neither read nor cleared.
    pub fn release(&mut self, ptr: Option<UnitIndex>) {
        let Some(payload) = ptr else {
            self.record(
                HeapEventLevel::Trace,
                "release",
                "release_null",
                None,
                None,
                "noop",
            );
            return;
        };
        self.assert_valid();

        let block = payload.back(1);
        debug_assert!(
            block >= self.heap_lo && block < self.heap_hi,
            "released pointer lies outside the arena"
        );
        debug_assert!(
            tag::is_header(&self.seg, block) && tag::is_allocated(&self.seg, block),
            "released pointer does not denote an allocated block"
        );

        let (prev, next) = self.locate_insertion_point(block);
        let merged = self.insert_and_coalesce(prev, next, block);
        self.stats.releases += 1;
        self.record(
            HeapEventLevel::Trace,
            "release",
            "release",
            Some(payload),
            Some(tag::span_of(&self.seg, merged)),
            "success",
        );
        self.assert_valid();
    }

    /// Counter snapshot.
    pub fn stats(&self) -> HeapStats {
        let mut stats = self.stats;
        stats.heap_units = self.arena_units();
        stats
    }

    /// Drains the structured lifecycle event log.
    pub fn drain_events(&mut self) -> Vec<HeapEvent> {
        self.events.drain()
    }

    /// The backing segment.
    pub fn segment(&self) -> &S {
        &self.seg
    }

    /// Address-ordered `(header, span)` pairs of every free block,
    /// gathered by walking the physical arena rather than the free
    /// list. Serves as the fragmentation oracle in tests: the free
    /// list must describe exactly these blocks.
    pub fn free_spans(&self) -> Vec<(UnitIndex, usize)> {
        let mut spans = Vec::new();
        if !self.booted {
            return spans;
        }
        let mut cur = self.heap_lo;
        while cur < self.heap_hi {
            let span = tag::span_of(&self.seg, cur);
            if !tag::is_allocated(&self.seg, cur) {
                spans.push((cur, span));
            }
            cur = cur.offset(span);
        }
        spans
    }

    /// Splits `need` payload units off the tail of a free block, or
    /// detaches the whole block when the remainder would be below the
    /// minimum usable span. Either way the returned header is marked
    /// allocated and off the list.
    fn take_from(&mut self, prev: Option<UnitIndex>, block: UnitIndex, need: usize) -> UnitIndex {
        let payload = tag::span_of(&self.seg, block) - 2;
        debug_assert!(payload >= need);
        let carved = if payload - need >= MIN_BLOCK_SPAN {
            self.stats.splits += 1;
            self.split_tail(block, need)
        } else {
            self.stats.whole_takes += 1;
            self.detach(prev, block);
            block
        };
        let event = if carved == block { "detach_whole" } else { "split" };
        self.record(
            HeapEventLevel::Trace,
            "allocate",
            event,
            Some(carved.offset(1)),
            Some(need),
            "success",
        );
        carved
    }

    /// Shrinks the free block in place and carves an allocated block
    /// of `need` payload units at its former tail end.
    fn split_tail(&mut self, block: UnitIndex, need: usize) -> UnitIndex {
        let old_span = tag::span_of(&self.seg, block);
        let carved_span = need + 2;
        let remain = old_span - carved_span;
        debug_assert!(remain >= MIN_BLOCK_SPAN);
        tag::set_span(&mut self.seg, block, remain);
        let carved = block.offset(remain);
        tag::init_block(&mut self.seg, carved, carved_span, true);
        carved
    }

    /// Establishes the arena bounds from the segment's current top.
    /// Runs once, on the first allocation.
    fn bootstrap(&mut self) {
        debug_assert!(!self.booted);
        let top = self.seg.top();
        self.heap_lo = top;
        self.heap_hi = top;
        self.booted = true;
        self.record(
            HeapEventLevel::Info,
            "allocate",
            "bootstrap",
            None,
            None,
            "success",
        );
    }

    fn arena_units(&self) -> usize {
        if self.booted {
            self.heap_hi.0 - self.heap_lo.0
        } else {
            0
        }
    }

    pub(crate) fn record(
        &mut self,
        level: HeapEventLevel,
        op: &'static str,
        event: &'static str,
        ptr: Option<UnitIndex>,
        units: Option<usize>,
        outcome: &'static str,
    ) {
        let heap_units = self.arena_units();
        self.events
            .push(level, op, event, ptr, units, outcome, heap_units);
    }
}
