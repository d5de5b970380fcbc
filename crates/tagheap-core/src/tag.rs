//! Boundary tags: block metadata encoded into the managed units.
//!
//! Every block starts with a header unit and ends with a footer unit.
//! Both carry the block's span (total units, header and footer
//! included), so a neighbor can be reached from either end in O(1).
//! The header additionally carries the allocated flag and, while the
//! block is free, the forward free-list link; the footer carries the
//! backward free-list link. Allocation status is authoritative only
//! at the header; a footer answers the question by walking back
//! `span - 1` units.
//!
//! Unit layout (16 bytes, little-endian):
//!
//! ```text
//! byte 0      flags (bit 0 = allocated, bit 1 = header)
//! bytes 1..4  unused
//! bytes 4..8  span (u32)
//! bytes 8..16 free-list link (u64, u64::MAX = none)
//! ```
//!
//! Every mutator checks its preconditions with `debug_assert!`:
//! violating one is an internal-consistency bug, fatal in debug
//! builds and compiled out in release. No mutator partially applies
//! a change.

use crate::segment::{RawUnit, Segment, UnitIndex};

const FLAG_ALLOCATED: u8 = 1 << 0;
const FLAG_HEADER: u8 = 1 << 1;
const LINK_NONE: u64 = u64::MAX;

/// Smallest span a block handed to a caller can have: header, one
/// payload unit, footer. Splits never leave a free remainder smaller
/// than this either.
pub(crate) const MIN_BLOCK_SPAN: usize = 3;

/// A decoded tag unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    pub is_header: bool,
    /// Meaningful on headers only; footer queries go through
    /// [`is_allocated`].
    pub allocated: bool,
    pub span: u32,
    /// `next_free` on a header, `prev_free` on a footer. Valid only
    /// while the block is free.
    pub link: Option<UnitIndex>,
}

impl Tag {
    pub(crate) fn decode(raw: &RawUnit) -> Tag {
        let flags = raw[0];
        let mut span = [0u8; 4];
        span.copy_from_slice(&raw[4..8]);
        let mut link = [0u8; 8];
        link.copy_from_slice(&raw[8..16]);
        let link = u64::from_le_bytes(link);
        Tag {
            is_header: flags & FLAG_HEADER != 0,
            allocated: flags & FLAG_ALLOCATED != 0,
            span: u32::from_le_bytes(span),
            link: (link != LINK_NONE).then(|| UnitIndex(link as usize)),
        }
    }

    pub(crate) fn encode(&self) -> RawUnit {
        let mut raw = [0u8; crate::segment::UNIT_BYTES];
        let mut flags = 0u8;
        if self.is_header {
            flags |= FLAG_HEADER;
        }
        if self.allocated {
            flags |= FLAG_ALLOCATED;
        }
        raw[0] = flags;
        raw[4..8].copy_from_slice(&self.span.to_le_bytes());
        let link = self.link.map_or(LINK_NONE, |idx| idx.0 as u64);
        raw[8..16].copy_from_slice(&link.to_le_bytes());
        raw
    }
}

pub(crate) fn tag_at<S: Segment>(seg: &S, idx: UnitIndex) -> Tag {
    Tag::decode(&seg.read(idx))
}

pub(crate) fn is_header<S: Segment>(seg: &S, idx: UnitIndex) -> bool {
    tag_at(seg, idx).is_header
}

/// Whether the block this unit belongs to is allocated. Works on a
/// header or a footer; a footer walks back to its header first.
pub(crate) fn is_allocated<S: Segment>(seg: &S, idx: UnitIndex) -> bool {
    let tag = tag_at(seg, idx);
    if tag.is_header {
        tag.allocated
    } else {
        let header = idx.back(tag.span as usize - 1);
        let htag = tag_at(seg, header);
        debug_assert!(htag.is_header, "footer at {idx:?} walks back to a non-header");
        htag.allocated
    }
}

/// Total units of the block, read from either end.
pub(crate) fn span_of<S: Segment>(seg: &S, idx: UnitIndex) -> usize {
    tag_at(seg, idx).span as usize
}

/// The footer unit of the block headed at `header`.
pub(crate) fn footer_of<S: Segment>(seg: &S, header: UnitIndex) -> UnitIndex {
    debug_assert!(is_header(seg, header));
    header.offset(span_of(seg, header) - 1)
}

/// Marks a free block allocated. Header only; span must be above the
/// minimum.
pub(crate) fn set_allocated<S: Segment>(seg: &mut S, header: UnitIndex) {
    let mut tag = tag_at(seg, header);
    debug_assert!(tag.is_header, "allocated flag set on a non-header");
    debug_assert!(!tag.allocated, "block at {header:?} is already allocated");
    debug_assert!(tag.span as usize >= MIN_BLOCK_SPAN);
    tag.allocated = true;
    seg.write(header, tag.encode());
}

/// Marks an allocated block free. Header only; span must be above the
/// minimum.
pub(crate) fn set_free<S: Segment>(seg: &mut S, header: UnitIndex) {
    let mut tag = tag_at(seg, header);
    debug_assert!(tag.is_header, "free flag set on a non-header");
    debug_assert!(tag.allocated, "block at {header:?} is already free");
    debug_assert!(tag.span as usize >= MIN_BLOCK_SPAN);
    tag.allocated = false;
    seg.write(header, tag.encode());
}

/// Forward free-list link. Free header only.
pub(crate) fn next_free<S: Segment>(seg: &S, header: UnitIndex) -> Option<UnitIndex> {
    let tag = tag_at(seg, header);
    debug_assert!(tag.is_header && !tag.allocated);
    tag.link
}

/// Sets the forward free-list link. Free header only; the target, if
/// any, must itself be a free header.
pub(crate) fn set_next_free<S: Segment>(seg: &mut S, header: UnitIndex, target: Option<UnitIndex>) {
    let mut tag = tag_at(seg, header);
    debug_assert!(tag.is_header && !tag.allocated);
    debug_assert!(target.is_none_or(|t| is_header(seg, t) && !is_allocated(seg, t)));
    tag.link = target;
    seg.write(header, tag.encode());
}

/// Backward free-list link. Free footer only.
pub(crate) fn prev_free<S: Segment>(seg: &S, footer: UnitIndex) -> Option<UnitIndex> {
    let tag = tag_at(seg, footer);
    debug_assert!(!tag.is_header && !is_allocated(seg, footer));
    tag.link
}

/// Sets the backward free-list link. Free footer only; the target, if
/// any, must be a free header.
pub(crate) fn set_prev_free<S: Segment>(seg: &mut S, footer: UnitIndex, target: Option<UnitIndex>) {
    let mut tag = tag_at(seg, footer);
    debug_assert!(!tag.is_header && !is_allocated(seg, footer));
    debug_assert!(target.is_none_or(|t| is_header(seg, t) && !is_allocated(seg, t)));
    tag.link = target;
    seg.write(footer, tag.encode());
}

/// Changes a free block's span in place, writing a complete footer at
/// the new end. The backward link stored in the old footer is carried
/// to the new one, so shrinking a front block to carve a tail (and
/// growing one over an absorbed neighbor) keeps the list intact.
pub(crate) fn set_span<S: Segment>(seg: &mut S, header: UnitIndex, new_span: usize) {
    let mut tag = tag_at(seg, header);
    debug_assert!(tag.is_header, "span set on a non-header");
    debug_assert!(!tag.allocated, "span change on an allocated block");
    debug_assert!(new_span >= MIN_BLOCK_SPAN);
    debug_assert!(new_span != tag.span as usize);

    let carried = tag_at(seg, header.offset(tag.span as usize - 1)).link;
    tag.span = new_span as u32;
    seg.write(header, tag.encode());
    let footer = Tag {
        is_header: false,
        allocated: false,
        span: new_span as u32,
        link: carried,
    };
    seg.write(header.offset(new_span - 1), footer.encode());
}

/// Writes a fresh header/footer pair for a block of `span` units at
/// `header`, links cleared. Used for newly grown regions and the
/// allocated block carved by a split.
pub(crate) fn init_block<S: Segment>(seg: &mut S, header: UnitIndex, span: usize, allocated: bool) {
    debug_assert!(span >= MIN_BLOCK_SPAN);
    let htag = Tag {
        is_header: true,
        allocated,
        span: span as u32,
        link: None,
    };
    seg.write(header, htag.encode());
    let ftag = Tag {
        is_header: false,
        allocated: false,
        span: span as u32,
        link: None,
    };
    seg.write(header.offset(span - 1), ftag.encode());
}

/// The block immediately below `header`, or `None` at the arena
/// bottom. Reached through the neighbor's footer one unit back.
pub(crate) fn prev_block<S: Segment>(seg: &S, header: UnitIndex, lo: UnitIndex) -> Option<UnitIndex> {
    debug_assert!(header >= lo);
    if header == lo {
        return None;
    }
    let footer = header.back(1);
    let span = span_of(seg, footer);
    let prev = footer.back(span - 1);
    debug_assert!(prev >= lo, "predecessor block underruns the arena");
    Some(prev)
}

/// The block immediately above `header`, or `None` at the arena top.
pub(crate) fn next_block<S: Segment>(seg: &S, header: UnitIndex, hi: UnitIndex) -> Option<UnitIndex> {
    let next = header.offset(span_of(seg, header));
    if next >= hi {
        return None;
    }
    Some(next)
}
