//! eBPF Hook Probe - Kernel Space Program
//!
//! Captures a fixed-shape context at every function-entry probe firing and
//! correlates OVS flow-execute operations issued from ovs-vswitchd.
//!
//! ## Architecture
//!
//! ```text
//! kprobe          -> HOOK_CONTEXT_MAP[cpu] zeroed and filled
//!                    |
//!                    v
//!                    EventChain -> EVENTS (if enabled and configured)
//!
//! usdt exec op    -> MapBatcher (PID_TO_BATCH, UPCALL_BATCHES)
//!                    |
//!                    v
//!                    FLOW_EXEC_TRACKING insert-if-absent
//! ```
//!
//! ## Usage
//!
//! This program must be compiled for the bpfel-unknown-none target:
//!
//! ```bash
//! cargo build --release --target=bpfel-unknown-none -Z build-std=core
//! ```
//!
//! The compiled bytecode is then loaded by the userspace program. On any
//! other target this crate builds an empty binary.

#![cfg_attr(target_arch = "bpf", no_std)]
#![cfg_attr(target_arch = "bpf", no_main)]

#[cfg(target_arch = "bpf")]
mod batcher;
#[cfg(target_arch = "bpf")]
mod chain;
#[cfg(target_arch = "bpf")]
mod handlers;
#[cfg(target_arch = "bpf")]
mod helpers;
#[cfg(target_arch = "bpf")]
mod maps;
#[cfg(target_arch = "bpf")]
mod store;

// Re-export probe functions so they're visible to the loader
#[cfg(target_arch = "bpf")]
pub use handlers::{ovs_op_flow_execute, probe_kprobe};

#[cfg(target_arch = "bpf")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // Unreachable once the verifier accepted the program
    loop {}
}

#[cfg(target_arch = "bpf")]
#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(not(target_arch = "bpf"))]
fn main() {}
