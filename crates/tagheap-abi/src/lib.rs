//! # tagheap-abi
//!
//! C-callable boundary for the boundary-tag heap: `tagheap_malloc`
//! and `tagheap_free` over one process-wide [`Heap`] backed by the
//! program break.
//!
//! The core heap is single-threaded by contract, so the global
//! instance sits behind a `parking_lot::Mutex`; every entry point
//! takes the lock for its whole duration. The heap is created lazily
//! on the first call that needs it.

mod brk;

pub use brk::BrkSegment;

use std::ffi::c_void;

use parking_lot::Mutex;
use tagheap_core::{Heap, UNIT_BYTES, UnitIndex};

static HEAP: Mutex<Option<Heap<BrkSegment>>> = Mutex::new(None);

fn with_heap<R>(f: impl FnOnce(&mut Heap<BrkSegment>) -> R) -> Option<R> {
    let mut guard = HEAP.lock();
    if guard.is_none() {
        *guard = BrkSegment::new().map(Heap::new);
    }
    guard.as_mut().map(f)
}

/// Allocates at least `size` bytes, aligned to the allocation unit.
///
/// Returns null for a zero-byte request, when the arena cannot grow,
/// or when the program break is unusable.
///
/// # Safety
///
/// The returned pointer must be passed to [`tagheap_free`] exactly
/// once, and not be accessed afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagheap_malloc(size: usize) -> *mut c_void {
    with_heap(|heap| match heap.allocate(size) {
        Some(unit) => (unit.0 * UNIT_BYTES) as *mut c_void,
        None => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Returns a block to the heap. A null `ptr` is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`tagheap_malloc`]
/// that has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tagheap_free(ptr: *mut c_void) {
    if ptr.is_null() {
        if let Some(heap) = HEAP.lock().as_mut() {
            heap.release(None);
        }
        return;
    }
    let addr = ptr as usize;
    if !addr.is_multiple_of(UNIT_BYTES) {
        // Not one of ours; better to leak it than to corrupt the
        // arena walking tags at a bogus address.
        return;
    }
    with_heap(|heap| heap.release(Some(UnitIndex(addr / UNIT_BYTES))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagheap_core::Segment;

    // Both tests move the real program break and can race each other
    // (and the rest of the test process) for it, so they bail out
    // instead of failing whenever the break is not theirs to move.

    #[test]
    fn brk_segment_round_trips_units() {
        let Some(mut seg) = BrkSegment::new() else {
            return;
        };
        let base = seg.top();
        let Ok(prev_top) = seg.extend(4) else {
            return;
        };
        assert_eq!(prev_top, base);
        assert_eq!(seg.top(), base.offset(4));

        let unit = [0xC3u8; UNIT_BYTES];
        seg.write(base.offset(2), unit);
        assert_eq!(seg.read(base.offset(2)), unit);
    }

    #[test]
    fn malloc_and_free_round_trip() {
        unsafe {
            tagheap_free(std::ptr::null_mut());

            let p = tagheap_malloc(64);
            if p.is_null() {
                return;
            }
            assert!((p as usize).is_multiple_of(UNIT_BYTES));
            let payload = std::slice::from_raw_parts_mut(p.cast::<u8>(), 64);
            payload.fill(0x5A);
            assert!(payload.iter().all(|&b| b == 0x5A));
            tagheap_free(p);

            assert!(tagheap_malloc(0).is_null());
        }
    }
}
