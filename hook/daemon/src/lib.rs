//! Hook Probe Userspace Library
//!
//! Provides reusable components for loading, configuring and reading the
//! eBPF hook probe.

pub mod collector;
pub mod events;
pub mod exporter;
pub mod kallsyms;
pub mod loader;
pub mod ovs;
pub mod types;

pub use collector::TraceCollector;
pub use events::EventProcessor;
pub use exporter::{JsonExporter, SummaryExporter};
pub use kallsyms::Kallsyms;
pub use loader::{MapSizing, ProbeLoader};
pub use types::*;
