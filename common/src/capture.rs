//! Context capture for function-entry probes
//!
//! A firing resolves its CPU's slot, wipes it, fills it from the trigger and
//! hands it to the hook chain. The slot is reused on the next firing on the
//! same CPU, so chains must not keep the reference past the call.
//!
//! ```text
//! kernel call -> capture_kprobe() -> ContextSlots::slot_mut(cpu)
//!                                  -> HookChain::chain(trigger, context)
//! ```

use crate::{
    constants::REG_MAX,
    trigger::{read_args, Trigger},
    types::{HookContext, ProbeType},
};

/// Fixed table of reusable contexts, one per CPU
///
/// Slots for different CPUs may be used concurrently. Access to a given slot
/// must be serialized by the caller; in the kernel this holds because a CPU
/// runs one handler at a time and the monitored probes do not re-enter.
pub trait ContextSlots {
    /// Slot for `cpu`, or `None` when the table holds no such entry
    fn slot_mut(&mut self, cpu: u32) -> Option<&mut HookContext>;
}

/// Downstream processing chain
pub trait HookChain<T: ?Sized> {
    /// Process a populated context and return the handler status
    fn chain(&self, trigger: &T, context: &HookContext) -> u32;
}

impl<T: ?Sized, F> HookChain<T> for F
where
    F: Fn(&T, &HookContext) -> u32,
{
    fn chain(&self, trigger: &T, context: &HookContext) -> u32 {
        self(trigger, context)
    }
}

/// Capture failures. All are silent drops of a single event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// No slot exists for the current CPU
    SlotUnavailable { cpu: u32 },
}

impl CaptureError {
    /// Status reported to the execution environment
    pub const fn status(&self) -> u32 {
        match self {
            Self::SlotUnavailable { .. } => crate::constants::RET_OK,
        }
    }
}

/// Populate the current CPU's slot from a function-entry firing and run the
/// chain on it. Returns the chain's status unchanged.
#[inline(always)]
pub fn capture_kprobe<T, S, C>(trigger: &T, slots: &mut S, chain: &C) -> Result<u32, CaptureError>
where
    T: Trigger + ?Sized,
    S: ContextSlots + ?Sized,
    C: HookChain<T> + ?Sized,
{
    let cpu = trigger.cpu_id();
    let context = slots
        .slot_mut(cpu)
        .ok_or(CaptureError::SlotUnavailable { cpu })?;

    // Nothing from the previous firing on this CPU may survive
    *context = HookContext::zeroed();

    context.timestamp = trigger.ktime_ns();
    context.symbol_addr = trigger.func_ip();
    context.probe_type = ProbeType::Kprobe as u32;
    context.regs.values = read_args(trigger);
    context.regs.count = REG_MAX as u32;

    Ok(chain.chain(trigger, context))
}

/// In-memory slot table for `N` CPUs
pub struct SlotArena<const N: usize> {
    slots: [HookContext; N],
}

impl<const N: usize> SlotArena<N> {
    pub const fn new() -> Self {
        Self {
            slots: [HookContext::zeroed(); N],
        }
    }

    pub fn slot(&self, cpu: u32) -> Option<&HookContext> {
        self.slots.get(cpu as usize)
    }

    pub const fn cpus(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SlotArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ContextSlots for SlotArena<N> {
    fn slot_mut(&mut self, cpu: u32) -> Option<&mut HookContext> {
        self.slots.get_mut(cpu as usize)
    }
}
