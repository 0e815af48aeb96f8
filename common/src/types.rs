//! Shared data structures between kernel and userspace
//!
//! These structures must be repr(C) to ensure consistent memory layout
//! between eBPF programs and userspace code. Field order and widths are a
//! contract with downstream consumers. Padding is spelled out as fields so
//! that zeroing a record through its fields clears every byte.

use core::mem::{offset_of, size_of};

use crate::constants::{REG_MAX, TASK_COMM_LEN, UPCALL_BATCH_MAX};

/// Probe kinds able to produce a [`HookContext`]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeType {
    /// Function-entry probe
    Kprobe = 0,
    /// Function-return probe
    Kretprobe = 1,
    /// Raw tracepoint
    RawTracepoint = 2,
}

impl ProbeType {
    /// Decode a raw `probe_type` field
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Kprobe),
            1 => Some(Self::Kretprobe),
            2 => Some(Self::RawTracepoint),
            _ => None,
        }
    }

    /// Short name used in reports
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kprobe => "kprobe",
            Self::Kretprobe => "kretprobe",
            Self::RawTracepoint => "raw_tracepoint",
        }
    }
}

/// Snapshot of the first call-argument registers
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeRegisters {
    /// Raw register values, in calling-convention order
    pub values: [u64; REG_MAX],
    /// Number of valid entries in `values`, never above `REG_MAX`
    pub count: u32,
    /// Padding for alignment
    pub _padding: u32,
}

impl ProbeRegisters {
    pub const fn zeroed() -> Self {
        Self {
            values: [0; REG_MAX],
            count: 0,
            _padding: 0,
        }
    }

    /// Valid register values
    pub fn as_slice(&self) -> &[u64] {
        let count = (self.count as usize).min(REG_MAX);
        &self.values[..count]
    }
}

/// Canonical per-firing context, reused from a per-CPU slot
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookContext {
    /// Monotonic clock at capture time (nanoseconds)
    pub timestamp: u64,
    /// Raw [`ProbeType`]
    pub probe_type: u32,
    /// Padding for alignment
    pub _padding: u32,
    /// Address of the probed function
    pub symbol_addr: u64,
    /// Argument registers at the time of the firing
    pub regs: ProbeRegisters,
}

impl HookContext {
    pub const fn zeroed() -> Self {
        Self {
            timestamp: 0,
            probe_type: 0,
            _padding: 0,
            symbol_addr: 0,
            regs: ProbeRegisters::zeroed(),
        }
    }

    pub const fn probe_type(&self) -> Option<ProbeType> {
        ProbeType::from_raw(self.probe_type)
    }
}

/// Event emitted to userspace by the event chain
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct KernelEvent {
    /// Capture timestamp (nanoseconds, monotonic)
    pub timestamp: u64,
    /// Address of the probed function
    pub symbol_addr: u64,
    /// Stack id in the stack map, -1 when not collected
    pub stack_id: i64,
    /// `tgid << 32 | pid` of the current task
    pub pid_tgid: u64,
    /// Argument registers
    pub regs: ProbeRegisters,
    /// CPU the probe fired on
    pub cpu: u32,
    /// Raw [`ProbeType`]
    pub probe_type: u32,
    /// Current task command name
    pub comm: [u8; TASK_COMM_LEN],
}

impl KernelEvent {
    pub fn pid(&self) -> u32 {
        (self.pid_tgid & 0xFFFF_FFFF) as u32
    }

    pub fn tgid(&self) -> u32 {
        (self.pid_tgid >> 32) as u32
    }

    /// Command name up to the first NUL byte
    pub fn comm_bytes(&self) -> &[u8] {
        let end = self
            .comm
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TASK_COMM_LEN);
        &self.comm[..end]
    }
}

/// OVS datapath operation kinds issued by handler threads
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OvsOpType {
    /// Flow execute (packet sent back to the datapath with actions)
    Exec = 0,
    /// Flow put (new datapath flow installed)
    Put = 1,
}

/// Operation decoded from a handler's USDT firing
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OvsOperationEvent {
    /// Timestamp of the batch the operation belongs to
    pub batch_ts: u64,
    /// Queue id of the upcall the operation answers
    pub queue_id: u32,
    /// Raw [`OvsOpType`]
    pub op_type: u8,
    /// Index of the handler batch
    pub batch_idx: u8,
    /// Padding for alignment
    pub _padding: [u8; 2],
}

impl OvsOperationEvent {
    pub const fn zeroed() -> Self {
        Self {
            batch_ts: 0,
            queue_id: 0,
            op_type: 0,
            batch_idx: 0,
            _padding: [0; 2],
        }
    }
}

/// One upcall received by a handler thread
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserUpcallInfo {
    /// Queue id computed when the upcall was enqueued by the kernel
    pub queue_id: u32,
    /// Operations still expected for this upcall
    pub process_ops: u8,
    /// Non-zero when operations for this upcall must not be reported
    pub skip_event: u8,
    /// Padding for alignment
    pub _padding: [u8; 2],
}

/// Batch of upcalls owned by a single handler thread
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct UpcallBatch {
    /// Timestamp of the first upcall of the batch
    pub leader_ts: u64,
    /// Non-zero while the handler is issuing operations for the batch
    pub processing: u8,
    /// Upcall operations are currently attributed to
    pub current_upcall: u8,
    /// Number of valid entries in `upcalls`
    pub total: u8,
    /// Padding for alignment
    pub _padding: [u8; 5],
    pub upcalls: [UserUpcallInfo; UPCALL_BATCH_MAX],
}

impl UpcallBatch {
    pub const fn zeroed() -> Self {
        Self {
            leader_ts: 0,
            processing: 0,
            current_upcall: 0,
            total: 0,
            _padding: [0; 5],
            upcalls: [UserUpcallInfo {
                queue_id: 0,
                process_ops: 0,
                skip_event: 0,
                _padding: [0; 2],
            }; UPCALL_BATCH_MAX],
        }
    }
}

/// Collection-wide switch (GLOBAL_CONFIG[0])
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalConfig {
    /// Non-zero once userspace finished attaching
    pub enabled: u32,
}

/// Per-probe configuration, keyed by symbol address
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeConfig {
    /// Non-zero to collect a kernel stack id with each event
    pub stack_trace: u32,
    /// Padding for alignment
    pub _padding: u32,
}

impl ProbeConfig {
    pub const fn new(stack_trace: bool) -> Self {
        Self {
            stack_trace: stack_trace as u32,
            _padding: 0,
        }
    }
}

// Compile-time layout checks
// HookContext and KernelEvent layouts are consumed by downstream decoders
const _: () = {
    assert!(size_of::<ProbeRegisters>() == 48);
    assert!(size_of::<HookContext>() == 72);
    assert!(offset_of!(HookContext, timestamp) == 0);
    assert!(offset_of!(HookContext, probe_type) == 8);
    assert!(offset_of!(HookContext, symbol_addr) == 16);
    assert!(offset_of!(HookContext, regs) == 24);
    assert!(size_of::<KernelEvent>() == 104);
    assert!(size_of::<OvsOperationEvent>() == 16);
    assert!(size_of::<UserUpcallInfo>() == 8);
    assert!(size_of::<UpcallBatch>() == 16 + 8 * UPCALL_BATCH_MAX);
    assert!(size_of::<ProbeConfig>() % core::mem::align_of::<ProbeConfig>() == 0);
};

// Implement Aya's Pod trait for userspace usage
#[cfg(feature = "userspace")]
mod userspace_impls {
    use super::*;

    // Pod trait implementations for map access and perf buffer decoding
    unsafe impl aya::Pod for HookContext {}
    unsafe impl aya::Pod for KernelEvent {}
    unsafe impl aya::Pod for OvsOperationEvent {}
    unsafe impl aya::Pod for UpcallBatch {}
    unsafe impl aya::Pod for GlobalConfig {}
    unsafe impl aya::Pod for ProbeConfig {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_type_round_trips_known_values() {
        for ty in [ProbeType::Kprobe, ProbeType::Kretprobe, ProbeType::RawTracepoint] {
            assert_eq!(ProbeType::from_raw(ty as u32), Some(ty));
        }
        assert_eq!(ProbeType::from_raw(7), None);
    }

    #[test]
    fn registers_slice_is_bounded_by_capacity() {
        let mut regs = ProbeRegisters::zeroed();
        regs.values = [1, 2, 3, 4, 5];
        regs.count = 3;
        assert_eq!(regs.as_slice(), &[1, 2, 3]);

        // A corrupted count never reads past the array
        regs.count = 99;
        assert_eq!(regs.as_slice().len(), REG_MAX);
    }

    #[test]
    fn kernel_event_splits_pid_tgid_and_comm() {
        let mut comm = [0u8; TASK_COMM_LEN];
        comm[..5].copy_from_slice(b"ovs-v");
        let event = KernelEvent {
            timestamp: 1,
            symbol_addr: 0xffff_ffff_8100_0000,
            stack_id: -1,
            pid_tgid: (4242u64 << 32) | 4243,
            regs: ProbeRegisters::zeroed(),
            cpu: 0,
            probe_type: ProbeType::Kprobe as u32,
            comm,
        };

        assert_eq!(event.tgid(), 4242);
        assert_eq!(event.pid(), 4243);
        assert_eq!(event.comm_bytes(), b"ovs-v");
    }
}
