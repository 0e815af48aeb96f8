//! Probe handlers
//!
//! Implements the eBPF programs the loader attaches: the generic
//! function-entry probe and the OVS flow-execute USDT hook.

use aya_ebpf::{
    macros::{kprobe, uprobe},
    programs::ProbeContext,
};
use aya_log_ebpf::{debug, warn};
use hook_common::{
    capture_kprobe, constants::*, track_flow_exec, CaptureError, FlowExecOutcome, TrackError,
};

use crate::{
    batcher::MapBatcher,
    chain::EventChain,
    helpers::*,
    store::{MapSlots, MapTable},
};

/// Capture a function-entry firing
///
/// Attached to: every kernel function the loader was asked to probe
///
/// Fills the current CPU's HookContext and runs the event chain on it.
#[kprobe]
pub fn probe_kprobe(ctx: ProbeContext) -> u32 {
    match try_probe_kprobe(&ctx) {
        Ok(ret) => ret,
        Err(err) => {
            increment_stat(STAT_SLOT_MISSES);
            let CaptureError::SlotUnavailable { cpu } = err;
            debug!(&ctx, "no context slot for cpu {}, event dropped", cpu);
            err.status()
        }
    }
}

fn try_probe_kprobe(ctx: &ProbeContext) -> Result<u32, CaptureError> {
    increment_stat(STAT_KPROBE_EVENTS);

    let trigger = ProbeTrigger::new(ctx);
    capture_kprobe(&trigger, &mut MapSlots, &EventChain)
}

/// Track OVS flow-execute operations
///
/// Attached to: usdt dpif_netlink_operate__::op_flow_execute
///
/// Marks the queue id of the operation as in flight. Returns a non-zero
/// status when the queue id already was.
#[uprobe]
pub fn ovs_op_flow_execute(ctx: ProbeContext) -> u32 {
    match try_ovs_op_flow_execute(&ctx) {
        Ok(outcome) => outcome.status(),
        Err(err) => {
            let queue_id = err.queue_id();
            match err {
                TrackError::Duplicate { .. } => {
                    increment_stat(STAT_FLOW_EXEC_DUPLICATES);
                    warn!(&ctx, "flow exec queue_id {} already in flight", queue_id);
                }
                TrackError::Table { errno, .. } => {
                    increment_stat(STAT_FLOW_EXEC_TABLE_ERRORS);
                    warn!(&ctx, "could not track flow exec queue_id {}: {}", queue_id, errno);
                }
            }
            err.status()
        }
    }
}

fn try_ovs_op_flow_execute(ctx: &ProbeContext) -> Result<FlowExecOutcome, TrackError> {
    increment_stat(STAT_FLOW_EXEC_EVENTS);

    let trigger = ProbeTrigger::new(ctx);
    let outcome = track_flow_exec(&trigger, &mut MapBatcher, &MapTable)?;

    match outcome {
        FlowExecOutcome::Tracked { .. } => increment_stat(STAT_FLOW_EXEC_TRACKED),
        FlowExecOutcome::NoOperation => increment_stat(STAT_FLOW_EXEC_NO_OPERATION),
    }

    Ok(outcome)
}
