//! Helper functions for eBPF programs
//!
//! Provides the Trigger implementation over a probe context and safe
//! wrappers around the BPF helpers the handlers need.

use aya_ebpf::{
    helpers::{bpf_get_func_ip, bpf_get_smp_processor_id, bpf_ktime_get_ns},
    programs::ProbeContext,
    EbpfContext,
};
use hook_common::Trigger;

/// Get current timestamp in nanoseconds
#[inline(always)]
pub fn get_timestamp() -> u64 {
    unsafe { bpf_ktime_get_ns() }
}

/// Get the CPU the program runs on
#[inline(always)]
pub fn get_cpu() -> u32 {
    unsafe { bpf_get_smp_processor_id() }
}

/// Trigger backed by a kprobe/uprobe context
pub struct ProbeTrigger<'a> {
    ctx: &'a ProbeContext,
}

impl<'a> ProbeTrigger<'a> {
    #[inline(always)]
    pub fn new(ctx: &'a ProbeContext) -> Self {
        Self { ctx }
    }

    #[inline(always)]
    pub fn ctx(&self) -> &'a ProbeContext {
        self.ctx
    }
}

impl Trigger for ProbeTrigger<'_> {
    #[inline(always)]
    fn cpu_id(&self) -> u32 {
        get_cpu()
    }

    #[inline(always)]
    fn ktime_ns(&self) -> u64 {
        get_timestamp()
    }

    #[inline(always)]
    fn func_ip(&self) -> u64 {
        unsafe { bpf_get_func_ip(self.ctx.as_ptr()) }
    }

    #[inline(always)]
    fn arg(&self, n: usize) -> u64 {
        self.ctx.arg::<u64>(n).unwrap_or(0)
    }

    #[inline(always)]
    fn pid_tgid(&self) -> u64 {
        ((self.ctx.tgid() as u64) << 32) | self.ctx.pid() as u64
    }
}

/// Increment a statistics counter
///
/// STATS is per-CPU, so a plain add does not race with other CPUs.
#[inline(always)]
pub fn increment_stat(stat_id: u32) {
    use crate::maps::STATS;

    if let Some(count) = STATS.get_ptr_mut(stat_id) {
        unsafe { *count += 1 };
    }
}
