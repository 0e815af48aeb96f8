//! Event chain run after every context capture
//!
//! Turns a populated HookContext into a KernelEvent on the EVENTS perf
//! buffer. The context is copied into the event, never kept.

use aya_ebpf::{bindings::BPF_F_FAST_STACK_CMP, EbpfContext};
use hook_common::{constants::*, types::*, HookChain, Trigger};

use crate::{helpers::*, maps::*};

/// Chain emitting one KernelEvent per configured probe firing
pub struct EventChain;

#[inline(always)]
fn collection_enabled() -> bool {
    match GLOBAL_CONFIG.get(0) {
        Some(cfg) => cfg.enabled != 0,
        None => false,
    }
}

impl HookChain<ProbeTrigger<'_>> for EventChain {
    #[inline(always)]
    fn chain(&self, trigger: &ProbeTrigger<'_>, context: &HookContext) -> u32 {
        if !collection_enabled() {
            increment_stat(STAT_EVENTS_FILTERED);
            return RET_OK;
        }

        let cfg = match unsafe { PROBE_CONFIG.get(&context.symbol_addr) } {
            Some(cfg) => *cfg,
            None => {
                increment_stat(STAT_EVENTS_FILTERED);
                return RET_OK;
            }
        };

        let ctx = trigger.ctx();
        let stack_id = if cfg.stack_trace != 0 {
            unsafe { STACK_MAP.get_stackid(ctx, BPF_F_FAST_STACK_CMP as u64) }.unwrap_or(-1)
        } else {
            -1
        };

        let event = KernelEvent {
            timestamp: context.timestamp,
            symbol_addr: context.symbol_addr,
            stack_id,
            pid_tgid: trigger.pid_tgid(),
            regs: context.regs,
            cpu: trigger.cpu_id(),
            probe_type: context.probe_type,
            comm: ctx.command().unwrap_or_default(),
        };

        EVENTS.output(ctx, &event, 0);
        increment_stat(STAT_EVENTS_SENT);

        RET_OK
    }
}
