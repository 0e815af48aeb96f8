//! Operation batcher over the OVS batch maps
//!
//! The handler thread issuing the operation selects its batch through
//! PID_TO_BATCH. The resulting operation is written to the per-CPU scratch
//! slot so it can be handed out by reference.

use hook_common::{types::*, OperationBatcher, Trigger};

use crate::{helpers::ProbeTrigger, maps::*};

pub struct MapBatcher;

impl OperationBatcher<ProbeTrigger<'_>> for MapBatcher {
    #[inline(always)]
    fn batch_process_op(
        &mut self,
        op_type: OvsOpType,
        trigger: &ProbeTrigger<'_>,
    ) -> Option<&OvsOperationEvent> {
        let tid = trigger.tid();
        let batch_idx = unsafe { *PID_TO_BATCH.get(&tid)? };

        // Each batch is only written by its own handler thread
        let batch = unsafe { &mut *UPCALL_BATCHES.get_ptr_mut(batch_idx)? };
        let op = batch.next_operation(op_type, batch_idx)?;

        let scratch = unsafe { &mut *OPERATION_SCRATCH.get_ptr_mut(0)? };
        *scratch = op;
        Some(scratch)
    }
}
