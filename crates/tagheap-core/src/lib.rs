//! # tagheap-core
//!
//! A boundary-tag heap manager: one growable arena carved from the
//! operating system a coarse extension at a time, served to callers as
//! arbitrarily sized blocks with low fragmentation.
//!
//! Every block carries a header and a footer tag inside the managed
//! bytes themselves; free blocks form a doubly-linked list kept in
//! strict address order so deallocation can coalesce with both
//! physical neighbors in O(1) once the insertion point is known.
//!
//! The crate is pure safe Rust. The arena is an indexable buffer of
//! fixed-size units addressed by [`UnitIndex`]; raw storage and the
//! OS growth primitive live behind the [`Segment`] trait, so the core
//! never touches a real pointer. An `sbrk`-backed segment is provided
//! by the `tagheap-abi` crate; [`SimSegment`] here backs deterministic
//! tests and benchmarks.

#![deny(unsafe_code)]

pub mod event;
pub mod heap;
pub mod segment;

mod freelist;
mod growth;
mod tag;
mod validate;

pub use event::{HeapEvent, HeapEventLevel};
pub use growth::MIN_GROWTH_UNITS;
pub use heap::{Heap, HeapStats};
pub use segment::{GrowError, RawUnit, Segment, SimSegment, UNIT_BYTES, UnitIndex};
