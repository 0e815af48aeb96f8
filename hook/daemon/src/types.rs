//! Userspace type definitions
//!
//! Defines the data structures used by the userspace program for
//! trace summaries and export.
//!
//! ## Organization
//!
//! This module separates kernel and userspace types:
//! - **Kernel Types**: Types shared with eBPF programs (from hook_common)
//! - **Userspace Types**: Types used only in userspace for aggregation and export

use hook_common::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Kernel Types (from eBPF programs)
// ============================================================================

pub mod kernel {
    //! Types shared between kernel eBPF programs and userspace
    //!
    //! These are re-exported from the hook-common crate and must
    //! maintain binary compatibility with the eBPF programs.

    pub use hook_common::constants;
    pub use hook_common::types::{HookContext, KernelEvent, ProbeRegisters, ProbeType};
}

pub use kernel::{KernelEvent, ProbeType};

// ============================================================================
// Userspace Types
// ============================================================================

/// Summary of one collection run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TraceSummary {
    /// RFC 3339 timestamp when the summary was generated
    pub timestamp: String,
    /// Duration of collection period in seconds
    pub duration_seconds: u64,
    /// Total number of events received
    pub total_events: u64,
    /// Events carrying a stack id
    pub stack_traces: u64,
    /// Per-function counts, busiest first
    pub symbols: Vec<SymbolSummary>,
    /// Events per CPU
    pub cpus: BTreeMap<u32, u64>,
    /// Events per probe type
    pub probe_types: BTreeMap<String, u64>,
    /// Kernel timestamp of the first event (ns)
    pub first_timestamp_ns: Option<u64>,
    /// Kernel timestamp of the last event (ns)
    pub last_timestamp_ns: Option<u64>,
    /// Counters kept by the kernel programs
    pub stats: StatsSnapshot,
    /// Flow-execute queue ids still marked in flight at shutdown
    pub flow_exec_in_flight: Vec<u32>,
}

/// Event count for a probed function
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SymbolSummary {
    /// Resolved name, or the hex address when unknown
    pub symbol: String,
    /// Address reported by the probe
    pub address: String,
    pub events: u64,
}

/// Totals of the STATS per-CPU counters
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub kprobe_events: u64,
    pub slot_misses: u64,
    pub events_sent: u64,
    pub events_filtered: u64,
    pub flow_exec_events: u64,
    pub flow_exec_tracked: u64,
    pub flow_exec_duplicates: u64,
    pub flow_exec_table_errors: u64,
    pub flow_exec_no_operation: u64,
}

impl StatsSnapshot {
    /// Build from counters indexed by the STAT_* constants
    pub fn from_counters(counters: &[u64; MAX_STATS as usize]) -> Self {
        let get = |idx: u32| counters[idx as usize];
        Self {
            kprobe_events: get(STAT_KPROBE_EVENTS),
            slot_misses: get(STAT_SLOT_MISSES),
            events_sent: get(STAT_EVENTS_SENT),
            events_filtered: get(STAT_EVENTS_FILTERED),
            flow_exec_events: get(STAT_FLOW_EXEC_EVENTS),
            flow_exec_tracked: get(STAT_FLOW_EXEC_TRACKED),
            flow_exec_duplicates: get(STAT_FLOW_EXEC_DUPLICATES),
            flow_exec_table_errors: get(STAT_FLOW_EXEC_TABLE_ERRORS),
            flow_exec_no_operation: get(STAT_FLOW_EXEC_NO_OPERATION),
        }
    }
}

/// Command name of an event as text
pub fn comm_to_string(event: &KernelEvent) -> String {
    String::from_utf8_lossy(event.comm_bytes()).into_owned()
}
