//! Upcall batch bookkeeping
//!
//! An OVS handler thread receives a batch of upcalls, then issues the
//! datapath operations (flow put, flow execute) for each of them in order.
//! The batch records, per upcall, how many operations are still expected, so
//! an operation firing can be attributed to the upcall, and thus the queue
//! id, it answers.

use crate::{
    constants::UPCALL_BATCH_MAX,
    types::{OvsOpType, OvsOperationEvent, UpcallBatch},
};

impl UpcallBatch {
    /// Attribute one operation to the current upcall.
    ///
    /// Returns `None` when the batch is idle or exhausted, or when the
    /// current upcall is marked `skip_event`. The operation is accounted for
    /// in every case where an upcall was current.
    #[inline(always)]
    pub fn next_operation(&mut self, op_type: OvsOpType, batch_idx: u32) -> Option<OvsOperationEvent> {
        if self.processing == 0 || self.is_exhausted() {
            return None;
        }

        let current = self.current_upcall as usize;
        if current >= UPCALL_BATCH_MAX {
            return None;
        }
        let upcall = self.upcalls.get_mut(current)?;

        let queue_id = upcall.queue_id;
        let skip = upcall.skip_event != 0;

        if upcall.process_ops > 1 {
            upcall.process_ops -= 1;
        } else {
            upcall.process_ops = 0;
            self.current_upcall += 1;
        }

        if skip {
            return None;
        }

        Some(OvsOperationEvent {
            batch_ts: self.leader_ts,
            queue_id,
            op_type: op_type as u8,
            batch_idx: batch_idx as u8,
            _padding: [0; 2],
        })
    }

    /// True once every upcall of the batch had its operations issued
    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.current_upcall >= self.total
    }
}
