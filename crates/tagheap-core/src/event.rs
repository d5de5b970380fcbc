//! Structured lifecycle events.
//!
//! The heap records a bounded in-memory log of what each public
//! operation did and why. There is no logging framework behind this:
//! an allocator cannot log through machinery that may call back into
//! an allocator, so records stay in a fixed-capacity queue the
//! embedding process drains when it wants them.

use std::collections::VecDeque;

use crate::segment::UnitIndex;

/// Severity of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapEventLevel {
    Trace,
    Info,
    Warn,
}

/// One record of allocator activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapEvent {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Severity level.
    pub level: HeapEventLevel,
    /// Public operation (`allocate`, `release`, `grow`).
    pub op: &'static str,
    /// Event kind (`split`, `detach_whole`, `grow_failed`, ...).
    pub event: &'static str,
    /// Payload unit involved, if any.
    pub ptr: Option<UnitIndex>,
    /// Unit count involved, if any.
    pub units: Option<usize>,
    /// Machine-readable outcome (`success`, `noop`, `oom`, `denied`).
    pub outcome: &'static str,
    /// Snapshot: arena size in units at the time of the event.
    pub heap_units: usize,
}

/// Oldest records are discarded once the log is full.
const MAX_RECORDS: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct EventLog {
    records: VecDeque<HeapEvent>,
    next_seq: u64,
}

impl EventLog {
    pub(crate) fn push(
        &mut self,
        level: HeapEventLevel,
        op: &'static str,
        event: &'static str,
        ptr: Option<UnitIndex>,
        units: Option<usize>,
        outcome: &'static str,
        heap_units: usize,
    ) {
        if self.records.len() == MAX_RECORDS {
            self.records.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.records.push_back(HeapEvent {
            seq,
            level,
            op,
            event,
            ptr,
            units,
            outcome,
            heap_units,
        });
    }

    pub(crate) fn drain(&mut self) -> Vec<HeapEvent> {
        self.records.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_and_keeps_newest() {
        let mut log = EventLog::default();
        for i in 0..(MAX_RECORDS + 10) {
            log.push(
                HeapEventLevel::Trace,
                "allocate",
                "alloc",
                None,
                Some(i),
                "success",
                0,
            );
        }
        let drained = log.drain();
        assert_eq!(drained.len(), MAX_RECORDS);
        assert_eq!(drained[0].units, Some(10));
        assert_eq!(drained.last().unwrap().seq, (MAX_RECORDS + 9) as u64);
    }

    #[test]
    fn drain_empties_the_log() {
        let mut log = EventLog::default();
        log.push(
            HeapEventLevel::Info,
            "grow",
            "grow",
            None,
            Some(1026),
            "success",
            1026,
        );
        assert_eq!(log.drain().len(), 1);
        assert!(log.drain().is_empty());
    }
}
