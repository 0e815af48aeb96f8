//! Shared constants for the hook probes
//!
//! These constants are used by both kernel and userspace programs
//! to ensure consistency in map sizing, status codes and stat indices.

// ============================================================================
// BPF Map Sizes
// ============================================================================

/// Upper bound of per-CPU context slots (resized at load to possible CPUs)
pub const MAX_CPUS: u32 = 1024;

/// Default capacity of the flow-execute tracking table
pub const FLOW_EXEC_TRACKING_MAX: u32 = 8192;

/// Maximum number of configured kernel probes
pub const PROBE_MAX: u32 = 1024;

/// Number of stack traces kept in the stack map
pub const STACK_MAP_MAX: u32 = 4096;

/// Upper bound of OVS handler threads (resized at load to the real count)
pub const UPCALL_HANDLERS_MAX: u32 = 256;

/// Number of upcalls a single handler batch can hold
pub const UPCALL_BATCH_MAX: usize = 64;

// ============================================================================
// Register Snapshot
// ============================================================================

/// Number of call-argument registers captured by function-entry probes
pub const REG_MAX: usize = 5;

/// Length of a task command name
pub const TASK_COMM_LEN: usize = 16;

// ============================================================================
// Handler Return Codes
// ============================================================================

/// Event processed, dropped for a missing slot, or nothing to correlate
pub const RET_OK: u32 = 0;

/// A flow-execute operation with the same queue id is still in flight
pub const RET_FLOW_EXEC_DUPLICATE: u32 = 1;

/// The tracking table refused the insert for another reason (e.g. full)
pub const RET_FLOW_EXEC_TABLE_ERROR: u32 = 2;

/// errno returned by the kernel when an insert-if-absent hits an existing key
pub const EEXIST: i64 = 17;

// ============================================================================
// Statistics Counter Indices (for STATS map)
// ============================================================================

/// Function-entry probe firings
pub const STAT_KPROBE_EVENTS: u32 = 0;

/// Firings dropped because no per-CPU slot was found
pub const STAT_SLOT_MISSES: u32 = 1;

/// Events emitted by the event chain
pub const STAT_EVENTS_SENT: u32 = 2;

/// Firings not emitted (collection disabled or probe not configured)
pub const STAT_EVENTS_FILTERED: u32 = 3;

/// Flow-execute tracepoint firings
pub const STAT_FLOW_EXEC_EVENTS: u32 = 4;

/// Flow-execute operations recorded as in flight
pub const STAT_FLOW_EXEC_TRACKED: u32 = 5;

/// Flow-execute operations whose queue id was already in flight
pub const STAT_FLOW_EXEC_DUPLICATES: u32 = 6;

/// Flow-execute inserts refused by the table for other reasons
pub const STAT_FLOW_EXEC_TABLE_ERRORS: u32 = 7;

/// Flow-execute firings where the batcher produced no operation
pub const STAT_FLOW_EXEC_NO_OPERATION: u32 = 8;

/// Total number of statistics counters
pub const MAX_STATS: u32 = 9;
