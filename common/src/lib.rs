//! Shared types and capture/correlation logic for the hook probes
//!
//! This crate provides the data structures and constants shared between the
//! eBPF programs and the userspace loader, plus the target-independent core
//! the eBPF programs run: per-CPU context capture and OVS flow-execute
//! correlation. The core only talks to its collaborators (slot table, hook
//! chain, operation batcher, tracking table) through traits, so it runs the
//! same against BPF maps and against the in-memory doubles used in tests.

#![cfg_attr(not(test), no_std)]

pub mod batch;
pub mod capture;
pub mod constants;
pub mod correlation;
pub mod trigger;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use capture::{capture_kprobe, CaptureError, ContextSlots, HookChain, SlotArena};
pub use constants::*;
pub use correlation::{
    track_flow_exec, FlowExecOutcome, FlowExecTable, OperationBatcher, TrackError,
};
pub use trigger::Trigger;
pub use types::{
    GlobalConfig, HookContext, KernelEvent, OvsOpType, OvsOperationEvent, ProbeConfig,
    ProbeRegisters, ProbeType, UpcallBatch, UserUpcallInfo,
};
