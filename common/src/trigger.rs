//! View of the execution point a handler was invoked from
//!
//! Kernel handlers implement [`Trigger`] over the probe context and the BPF
//! helpers; tests implement it with fixed values.

use crate::constants::REG_MAX;

/// Everything the core reads from the firing probe
pub trait Trigger {
    /// Logical CPU the handler runs on
    fn cpu_id(&self) -> u32;

    /// Monotonic clock (nanoseconds)
    fn ktime_ns(&self) -> u64;

    /// Address of the function the probe is attached to
    fn func_ip(&self) -> u64;

    /// Raw value of call-argument register `n`, in calling-convention order.
    /// Registers beyond the probed function's arity hold whatever the caller
    /// left in them.
    fn arg(&self, n: usize) -> u64;

    /// `tgid << 32 | pid` of the current task
    fn pid_tgid(&self) -> u64;

    /// Thread id of the current task
    fn tid(&self) -> u32 {
        (self.pid_tgid() & 0xFFFF_FFFF) as u32
    }
}

/// Read the first `REG_MAX` argument registers
#[inline(always)]
pub fn read_args<T: Trigger + ?Sized>(trigger: &T) -> [u64; REG_MAX] {
    [
        trigger.arg(0),
        trigger.arg(1),
        trigger.arg(2),
        trigger.arg(3),
        trigger.arg(4),
    ]
}
