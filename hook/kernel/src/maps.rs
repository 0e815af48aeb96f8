//! BPF map definitions for context capture and flow-execute correlation
//!
//! Defines the maps used for communication between kernel and userspace,
//! and for holding per-CPU and in-flight state.

use aya_ebpf::{
    macros::map,
    maps::{Array, HashMap, PerCpuArray, PerfEventArray, StackTrace},
};
use hook_common::{constants::*, types::*};

/// Per-CPU context slots
///
/// Key: CPU id
/// Value: HookContext reused by every probe firing on that CPU
///
/// Resized by the loader to the number of possible CPUs.
#[map]
pub static HOOK_CONTEXT_MAP: Array<HookContext> = Array::with_max_entries(MAX_CPUS, 0);

/// Flow-execute operations in flight
///
/// Key: queue id
/// Value: unused sentinel (always 0)
///
/// Inserted with BPF_NOEXIST by the op_flow_execute hook, removed by the
/// dequeue-side hook.
#[map]
pub static FLOW_EXEC_TRACKING: HashMap<u32, u32> =
    HashMap::with_max_entries(FLOW_EXEC_TRACKING_MAX, 0);

/// Collection switch, flipped once userspace is done attaching
#[map]
pub static GLOBAL_CONFIG: Array<GlobalConfig> = Array::with_max_entries(1, 0);

/// Per-probe configuration
///
/// Key: symbol address of the probed function
/// Value: ProbeConfig
#[map]
pub static PROBE_CONFIG: HashMap<u64, ProbeConfig> = HashMap::with_max_entries(PROBE_MAX, 0);

/// Perf event array to send kernel events to userspace
#[map]
pub static EVENTS: PerfEventArray<KernelEvent> = PerfEventArray::new(0);

/// Kernel stack traces referenced by KernelEvent::stack_id
#[map]
pub static STACK_MAP: StackTrace = StackTrace::with_max_entries(STACK_MAP_MAX, 0);

/// Statistics counters
///
/// Key: stat_id (see STAT_* constants)
/// Value: u64 counter, one per CPU
#[map]
pub static STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(MAX_STATS, 0);

/// OVS handler thread to batch index
///
/// Key: handler thread id
/// Value: index in UPCALL_BATCHES
#[map]
pub static PID_TO_BATCH: HashMap<u32, u32> = HashMap::with_max_entries(UPCALL_HANDLERS_MAX, 0);

/// Upcall batches, one per OVS handler thread
#[map]
pub static UPCALL_BATCHES: Array<UpcallBatch> = Array::with_max_entries(UPCALL_HANDLERS_MAX, 0);

/// Scratch space for the operation produced by the batcher
#[map]
pub static OPERATION_SCRATCH: PerCpuArray<OvsOperationEvent> = PerCpuArray::with_max_entries(1, 0);
