//! OVS flow-execute correlation
//!
//! Each `op_flow_execute` firing asks the operation batcher for the
//! operation being issued and marks its queue id as in flight. The matching
//! kernel-side dequeue removes the entry again. A queue id that is already
//! in flight is never overwritten: the firing reports a duplicate instead.
//!
//! ```text
//! queue_id:  ABSENT --(track_flow_exec)--> IN_FLIGHT --(dequeue hook)--> ABSENT
//!                                          IN_FLIGHT --(track_flow_exec)--> Duplicate
//! ```

use crate::{
    constants::{EEXIST, RET_FLOW_EXEC_DUPLICATE, RET_FLOW_EXEC_TABLE_ERROR, RET_OK},
    trigger::Trigger,
    types::{OvsOpType, OvsOperationEvent},
};

/// Decodes a USDT firing into the operation being issued
pub trait OperationBatcher<T: ?Sized> {
    /// Operation for this firing, or `None` when batching is deferred or the
    /// operation is filtered out
    fn batch_process_op(&mut self, op_type: OvsOpType, trigger: &T) -> Option<&OvsOperationEvent>;
}

/// Shared set of in-flight flow-execute queue ids
pub trait FlowExecTable {
    /// Atomically insert `queue_id` unless it is already present. An existing
    /// entry is left untouched.
    ///
    /// Callers on different CPUs may race on the same queue id; exactly one
    /// of them succeeds and the others get `TrackError::Duplicate`.
    fn insert_if_absent(&self, queue_id: u32) -> Result<(), TrackError>;
}

/// Result of a flow-execute firing that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowExecOutcome {
    /// Queue id recorded as in flight
    Tracked { queue_id: u32 },
    /// The batcher produced no operation
    NoOperation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackError {
    /// An execute operation with the same queue id is still in flight
    Duplicate { queue_id: u32 },
    /// The table refused the insert (e.g. it is full)
    Table { queue_id: u32, errno: i64 },
}

impl TrackError {
    /// Classify a negative errno returned by an insert-if-absent
    pub const fn from_errno(queue_id: u32, ret: i64) -> Self {
        if ret == -EEXIST {
            Self::Duplicate { queue_id }
        } else {
            Self::Table {
                queue_id,
                errno: ret,
            }
        }
    }

    pub const fn queue_id(&self) -> u32 {
        match self {
            Self::Duplicate { queue_id } | Self::Table { queue_id, .. } => *queue_id,
        }
    }

    /// Status reported to the execution environment
    pub const fn status(&self) -> u32 {
        match self {
            Self::Duplicate { .. } => RET_FLOW_EXEC_DUPLICATE,
            Self::Table { .. } => RET_FLOW_EXEC_TABLE_ERROR,
        }
    }
}

impl FlowExecOutcome {
    pub const fn status(&self) -> u32 {
        RET_OK
    }
}

/// Handle one `op_flow_execute` firing
#[inline(always)]
pub fn track_flow_exec<T, B, F>(
    trigger: &T,
    batcher: &mut B,
    table: &F,
) -> Result<FlowExecOutcome, TrackError>
where
    T: Trigger + ?Sized,
    B: OperationBatcher<T> + ?Sized,
    F: FlowExecTable + ?Sized,
{
    let queue_id = match batcher.batch_process_op(OvsOpType::Exec, trigger) {
        Some(op) => op.queue_id,
        None => return Ok(FlowExecOutcome::NoOperation),
    };

    // TODO: forward duplicates to userspace once the event format carries
    // correlation errors; for now only the status reports them.
    table.insert_if_absent(queue_id)?;

    Ok(FlowExecOutcome::Tracked { queue_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTrigger, MemoryTable, ScriptedBatcher};
    use std::{sync::Barrier, thread, vec::Vec};

    #[test]
    fn test_first_exec_is_tracked() {
        let table = MemoryTable::with_capacity(16);
        let mut batcher = ScriptedBatcher::new(&[Some(42)]);

        let ret = track_flow_exec(&FakeTrigger::on_cpu(0), &mut batcher, &table);

        assert_eq!(ret, Ok(FlowExecOutcome::Tracked { queue_id: 42 }));
        assert_eq!(ret.unwrap().status(), 0);
        assert!(table.contains(42));
        assert_eq!(batcher.requested, [OvsOpType::Exec]);
    }

    #[test]
    fn test_duplicate_exec_is_reported_and_not_overwritten() {
        let table = MemoryTable::with_capacity(16);
        let mut batcher = ScriptedBatcher::new(&[Some(42), Some(42)]);
        let trigger = FakeTrigger::on_cpu(1);

        assert!(track_flow_exec(&trigger, &mut batcher, &table).is_ok());
        let err = track_flow_exec(&trigger, &mut batcher, &table).unwrap_err();

        assert_eq!(err, TrackError::Duplicate { queue_id: 42 });
        assert_eq!(err.status(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.contains(42));
    }

    #[test]
    fn test_no_operation_leaves_table_untouched() {
        let table = MemoryTable::with_capacity(16);
        let mut batcher = ScriptedBatcher::new(&[None]);

        let ret = track_flow_exec(&FakeTrigger::on_cpu(0), &mut batcher, &table);

        assert_eq!(ret, Ok(FlowExecOutcome::NoOperation));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_reinsert_after_dequeue_succeeds() {
        let table = MemoryTable::with_capacity(16);
        let mut batcher = ScriptedBatcher::new(&[Some(7), Some(7)]);
        let trigger = FakeTrigger::on_cpu(0);

        track_flow_exec(&trigger, &mut batcher, &table).unwrap();
        assert!(table.remove(7));
        let ret = track_flow_exec(&trigger, &mut batcher, &table);

        assert_eq!(ret, Ok(FlowExecOutcome::Tracked { queue_id: 7 }));
        assert!(table.contains(7));
    }

    #[test]
    fn test_queue_ids_are_independent() {
        let table = MemoryTable::with_capacity(16);
        let mut batcher = ScriptedBatcher::new(&[Some(1), Some(2), Some(1)]);
        let trigger = FakeTrigger::on_cpu(0);

        track_flow_exec(&trigger, &mut batcher, &table).unwrap();
        track_flow_exec(&trigger, &mut batcher, &table).unwrap();
        assert!(table.remove(1));
        assert!(table.contains(2));

        track_flow_exec(&trigger, &mut batcher, &table).unwrap();
        assert!(table.contains(1));
        assert!(table.contains(2));

        assert!(table.remove(2));
        assert!(table.contains(1));
    }

    #[test]
    fn test_full_table_is_a_distinct_error() {
        let table = MemoryTable::with_capacity(1);
        let mut batcher = ScriptedBatcher::new(&[Some(1), Some(2)]);
        let trigger = FakeTrigger::on_cpu(0);

        track_flow_exec(&trigger, &mut batcher, &table).unwrap();
        let err = track_flow_exec(&trigger, &mut batcher, &table).unwrap_err();

        assert!(matches!(err, TrackError::Table { queue_id: 2, .. }));
        assert_eq!(err.status(), RET_FLOW_EXEC_TABLE_ERROR);
        assert_ne!(err.status(), RET_FLOW_EXEC_DUPLICATE);
        assert!(!table.contains(2));
    }

    #[test]
    fn test_racing_execs_track_once() {
        const RACERS: usize = 8;

        let table = MemoryTable::with_capacity(16);
        let barrier = Barrier::new(RACERS);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..RACERS)
                .map(|cpu| {
                    let table = &table;
                    let barrier = &barrier;
                    s.spawn(move || {
                        let mut batcher = ScriptedBatcher::new(&[Some(99)]);
                        barrier.wait();
                        track_flow_exec(&FakeTrigger::on_cpu(cpu as u32), &mut batcher, table)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let tracked = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(tracked, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.err())
            .all(|err| err == TrackError::Duplicate { queue_id: 99 }));
        assert_eq!(table.len(), 1);
        assert!(table.contains(99));
    }

    #[test]
    fn test_errno_classification() {
        assert_eq!(
            TrackError::from_errno(3, -17),
            TrackError::Duplicate { queue_id: 3 }
        );
        assert_eq!(
            TrackError::from_errno(3, -7),
            TrackError::Table {
                queue_id: 3,
                errno: -7
            }
        );
        assert_eq!(TrackError::from_errno(9, -17).queue_id(), 9);
    }
}
