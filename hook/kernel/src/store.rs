//! Map-backed slot store and tracking table

use aya_ebpf::bindings::BPF_NOEXIST;
use hook_common::{types::HookContext, ContextSlots, FlowExecTable, TrackError};

use crate::maps::{FLOW_EXEC_TRACKING, HOOK_CONTEXT_MAP};

/// Per-CPU slots held in HOOK_CONTEXT_MAP
pub struct MapSlots;

impl ContextSlots for MapSlots {
    #[inline(always)]
    fn slot_mut(&mut self, cpu: u32) -> Option<&mut HookContext> {
        // A CPU runs one handler at a time, so its slot has a single writer
        HOOK_CONTEXT_MAP
            .get_ptr_mut(cpu)
            .map(|ptr| unsafe { &mut *ptr })
    }
}

/// In-flight flow-execute queue ids held in FLOW_EXEC_TRACKING
pub struct MapTable;

impl FlowExecTable for MapTable {
    #[inline(always)]
    fn insert_if_absent(&self, queue_id: u32) -> Result<(), TrackError> {
        let sentinel = 0u32;
        FLOW_EXEC_TRACKING
            .insert(&queue_id, &sentinel, BPF_NOEXIST as u64)
            .map_err(|ret| TrackError::from_errno(queue_id, ret as i64))
    }
}
