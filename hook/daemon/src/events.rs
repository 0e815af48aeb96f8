//! Event processing from eBPF perf buffers
//!
//! Handles reading events from per-CPU perf buffers and processing them asynchronously.

use crate::{collector::TraceCollector, types::*};
use anyhow::Result;
use aya::{
    maps::{perf::AsyncPerfEventArray, MapData},
    util::online_cpus,
};
use bytes::BytesMut;
use log::{debug, info, warn};
use std::{mem::size_of, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::interval};

/// Buffers handed to each read of a CPU's perf ring
const READ_BATCH: usize = 16;

/// Event processor that reads from perf buffers
pub struct EventProcessor {
    collector: Arc<Mutex<TraceCollector>>,
    verbose: bool,
}

impl EventProcessor {
    /// Create a new event processor
    ///
    /// # Arguments
    ///
    /// * `collector` - Shared trace collector
    /// * `verbose` - Log every event at debug level
    pub fn new(collector: Arc<Mutex<TraceCollector>>, verbose: bool) -> Self {
        Self { collector, verbose }
    }

    /// Spawn per-CPU event readers
    ///
    /// Creates a task for each online CPU to read events from its perf buffer.
    pub fn spawn_cpu_readers(&self, mut perf_array: AsyncPerfEventArray<MapData>) -> Result<()> {
        let cpus = online_cpus()?;
        info!("Spawning event readers for {} CPUs", cpus.len());

        for cpu_id in cpus {
            let mut buf = perf_array.open(cpu_id, None)?;
            let collector = Arc::clone(&self.collector);
            let verbose = self.verbose;

            tokio::spawn(async move {
                let mut buffers = (0..READ_BATCH)
                    .map(|_| BytesMut::with_capacity(size_of::<KernelEvent>()))
                    .collect::<Vec<_>>();

                loop {
                    let events = match buf.read_events(&mut buffers).await {
                        Ok(events) => events,
                        Err(e) => {
                            warn!("Error reading events from CPU {}: {}", cpu_id, e);
                            continue;
                        }
                    };

                    if events.lost > 0 {
                        warn!("Lost {} events on CPU {}", events.lost, cpu_id);
                    }

                    let mut collector = collector.lock().await;
                    for raw in buffers.iter().take(events.read) {
                        let Some(event) = decode_event(raw) else {
                            warn!("Short event ({} bytes) on CPU {}", raw.len(), cpu_id);
                            continue;
                        };

                        if verbose {
                            debug!(
                                "Event: {:#x} cpu={} pid={} comm={} stack_id={} args={:x?}",
                                event.symbol_addr,
                                event.cpu,
                                event.pid(),
                                comm_to_string(&event),
                                event.stack_id,
                                event.regs.as_slice()
                            );
                        }

                        collector.add_event(&event);
                    }
                }
            });
        }

        Ok(())
    }

    /// Spawn progress reporter
    ///
    /// Creates a task that periodically reports collection progress.
    pub fn spawn_progress_reporter(&self, interval_secs: u64) {
        if interval_secs == 0 {
            return;
        }

        let collector = Arc::clone(&self.collector);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));

            loop {
                ticker.tick().await;

                let collector = collector.lock().await;
                info!(
                    "Progress: {} events collected from {} functions",
                    collector.event_count(),
                    collector.symbol_count()
                );
            }
        });
    }
}

/// Decode one perf record into a KernelEvent
pub fn decode_event(raw: &[u8]) -> Option<KernelEvent> {
    if raw.len() < size_of::<KernelEvent>() {
        return None;
    }
    // Perf records carry no alignment guarantee
    let ptr = raw.as_ptr() as *const KernelEvent;
    Some(unsafe { ptr.read_unaligned() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_bytes(event: &KernelEvent) -> Vec<u8> {
        let ptr = event as *const KernelEvent as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, size_of::<KernelEvent>()) }.to_vec()
    }

    #[test]
    fn test_decode_event() {
        let mut event: KernelEvent = unsafe { std::mem::zeroed() };
        event.symbol_addr = 0xffffffffc0a01000;
        event.pid_tgid = (100u64 << 32) | 101;
        event.stack_id = -1;
        event.cpu = 3;
        event.regs.values = [0xa, 0xb, 0xc, 0xd, 0xe];
        event.regs.count = 2;

        let decoded = decode_event(&as_bytes(&event)).unwrap();

        assert_eq!(decoded.symbol_addr, 0xffffffffc0a01000);
        assert_eq!(decoded.tgid(), 100);
        assert_eq!(decoded.pid(), 101);
        assert_eq!(decoded.cpu, 3);
        assert_eq!(decoded.regs.as_slice(), &[0xa, 0xb]);
    }

    #[test]
    fn test_decode_short_record() {
        assert!(decode_event(&[0u8; 16]).is_none());
    }

    #[test]
    fn test_decode_unaligned() {
        let event: KernelEvent = unsafe { std::mem::zeroed() };
        let mut raw = vec![0u8];
        raw.extend(as_bytes(&event));

        assert!(decode_event(&raw[1..]).is_some());
    }

    #[tokio::test]
    async fn test_event_processor_creation() {
        let collector = Arc::new(Mutex::new(TraceCollector::new()));
        let processor = EventProcessor::new(collector, false);

        assert!(!processor.verbose);
    }
}
