//! Event aggregation
//!
//! Counts captured events per probed function, CPU and probe type.
//! Addresses are resolved to names only when the summary is generated.

use crate::{kallsyms::Kallsyms, types::*};
use std::collections::{BTreeMap, HashMap};

/// Aggregates events read from the perf buffers
#[derive(Default)]
pub struct TraceCollector {
    per_symbol: HashMap<u64, u64>,
    per_cpu: BTreeMap<u32, u64>,
    per_probe_type: BTreeMap<String, u64>,
    stack_traces: u64,
    total_events: u64,
    first_timestamp_ns: Option<u64>,
    last_timestamp_ns: Option<u64>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the collector
    pub fn add_event(&mut self, event: &KernelEvent) {
        *self.per_symbol.entry(event.symbol_addr).or_default() += 1;
        *self.per_cpu.entry(event.cpu).or_default() += 1;

        let probe_type = ProbeType::from_raw(event.probe_type)
            .map(|ty| ty.as_str().to_string())
            .unwrap_or_else(|| format!("unknown({})", event.probe_type));
        *self.per_probe_type.entry(probe_type).or_default() += 1;

        if event.stack_id >= 0 {
            self.stack_traces += 1;
        }

        // Perf buffers are read per CPU, so arrival order is not time order
        self.first_timestamp_ns = Some(
            self.first_timestamp_ns
                .map_or(event.timestamp, |ts| ts.min(event.timestamp)),
        );
        self.last_timestamp_ns = Some(
            self.last_timestamp_ns
                .map_or(event.timestamp, |ts| ts.max(event.timestamp)),
        );

        self.total_events += 1;
    }

    /// Generate the run summary
    ///
    /// # Arguments
    ///
    /// * `elapsed_secs` - Duration of collection period in seconds
    /// * `symbols` - Symbol table used to name probed addresses
    /// * `stats` - Kernel-side counters
    /// * `flow_exec_in_flight` - Queue ids still tracked at shutdown
    pub fn generate_summary(
        &self,
        elapsed_secs: u64,
        symbols: &Kallsyms,
        stats: StatsSnapshot,
        flow_exec_in_flight: Vec<u32>,
    ) -> TraceSummary {
        let mut per_symbol: Vec<SymbolSummary> = self
            .per_symbol
            .iter()
            .map(|(&addr, &events)| SymbolSummary {
                symbol: symbols.describe(addr),
                address: format!("{:#x}", addr),
                events,
            })
            .collect();
        per_symbol.sort_by(|a, b| b.events.cmp(&a.events).then_with(|| a.symbol.cmp(&b.symbol)));

        TraceSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration_seconds: elapsed_secs,
            total_events: self.total_events,
            stack_traces: self.stack_traces,
            symbols: per_symbol,
            cpus: self.per_cpu.clone(),
            probe_types: self.per_probe_type.clone(),
            first_timestamp_ns: self.first_timestamp_ns,
            last_timestamp_ns: self.last_timestamp_ns,
            stats,
            flow_exec_in_flight,
        }
    }

    /// Get current event count
    pub fn event_count(&self) -> u64 {
        self.total_events
    }

    /// Get number of distinct probed functions seen
    pub fn symbol_count(&self) -> usize {
        self.per_symbol.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(symbol_addr: u64, cpu: u32, timestamp: u64, stack_id: i64) -> KernelEvent {
        let mut event: KernelEvent = unsafe { std::mem::zeroed() };
        event.symbol_addr = symbol_addr;
        event.cpu = cpu;
        event.timestamp = timestamp;
        event.stack_id = stack_id;
        event.probe_type = ProbeType::Kprobe as u32;
        event
    }

    #[test]
    fn test_collector_counts() {
        let mut collector = TraceCollector::new();

        collector.add_event(&event(0xffffffff81001000, 0, 300, -1));
        collector.add_event(&event(0xffffffff81001000, 1, 100, 4));
        collector.add_event(&event(0xffffffff81002000, 1, 200, -1));

        assert_eq!(collector.event_count(), 3);
        assert_eq!(collector.symbol_count(), 2);
        assert_eq!(collector.stack_traces, 1);
        assert_eq!(collector.per_cpu.get(&1), Some(&2));
        assert_eq!(collector.per_probe_type.get("kprobe"), Some(&3));
        assert_eq!(collector.first_timestamp_ns, Some(100));
        assert_eq!(collector.last_timestamp_ns, Some(300));
    }

    #[test]
    fn test_unknown_probe_type_kept() {
        let mut collector = TraceCollector::new();
        let mut ev = event(0x1000, 0, 1, -1);
        ev.probe_type = 9;

        collector.add_event(&ev);

        assert_eq!(collector.per_probe_type.get("unknown(9)"), Some(&1));
    }

    #[test]
    fn test_summary_resolves_and_orders_symbols() {
        let symbols = Kallsyms::parse(
            "ffffffff81001000 T do_one_initcall\nffffffff81002000 t helper_local\n",
        );
        let mut collector = TraceCollector::new();
        collector.add_event(&event(0xffffffff81001000, 0, 1, -1));
        collector.add_event(&event(0xffffffff81002000, 0, 2, -1));
        collector.add_event(&event(0xffffffff81002000, 0, 3, -1));

        let summary =
            collector.generate_summary(10, &symbols, StatsSnapshot::default(), vec![7, 9]);

        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.symbols[0].symbol, "helper_local");
        assert_eq!(summary.symbols[0].events, 2);
        assert_eq!(summary.symbols[1].symbol, "do_one_initcall");
        assert_eq!(summary.symbols[1].address, "0xffffffff81001000");
        assert_eq!(summary.flow_exec_in_flight, vec![7, 9]);
    }

    #[test]
    fn test_empty_summary() {
        let collector = TraceCollector::new();
        let summary =
            collector.generate_summary(0, &Kallsyms::default(), StatsSnapshot::default(), Vec::new());

        assert_eq!(summary.total_events, 0);
        assert!(summary.symbols.is_empty());
        assert_eq!(summary.first_timestamp_ns, None);
    }
}
