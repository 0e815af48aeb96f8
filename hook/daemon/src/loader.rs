//! eBPF program loader
//!
//! Loads the hook probe object with its maps sized for this host, attaches
//! the kprobe and flow-execute programs, and gives access to the maps the
//! daemon configures and reads.

use anyhow::{Context, Result};
use aya::{
    maps::{perf::AsyncPerfEventArray, Array, HashMap, MapData, PerCpuArray},
    programs::{KProbe, UProbe},
    Bpf, BpfLoader,
};
use aya_log::BpfLogger;
use hook_common::{constants::*, GlobalConfig, ProbeConfig};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::types::StatsSnapshot;

const KPROBE_PROGRAM: &str = "probe_kprobe";
const FLOW_EXEC_PROGRAM: &str = "ovs_op_flow_execute";

/// Host-dependent map sizes applied before the object is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSizing {
    /// Possible CPUs; one HOOK_CONTEXT_MAP slot each
    pub cpus: u32,
    /// Capacity of FLOW_EXEC_TRACKING
    pub tracking_capacity: u32,
    /// OVS handler threads; one upcall batch each
    pub handlers: u32,
}

impl MapSizing {
    /// Clamp every size into the range the object was compiled for
    pub fn clamped(self) -> Self {
        Self {
            cpus: self.cpus.clamp(1, MAX_CPUS),
            tracking_capacity: self.tracking_capacity.max(1),
            handlers: self.handlers.clamp(1, UPCALL_HANDLERS_MAX),
        }
    }
}

impl Default for MapSizing {
    fn default() -> Self {
        Self {
            cpus: MAX_CPUS,
            tracking_capacity: FLOW_EXEC_TRACKING_MAX,
            handlers: UPCALL_HANDLERS_MAX,
        }
    }
}

/// eBPF program loader and manager
pub struct ProbeLoader {
    ebpf: Bpf,
    sizing: MapSizing,
}

impl ProbeLoader {
    /// Load eBPF program from file or embedded bytecode
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to eBPF object file. If None, uses embedded bytecode.
    /// * `sizing` - Map sizes for this host
    pub fn load(path: Option<PathBuf>, sizing: MapSizing) -> Result<Self> {
        info!("Loading eBPF program...");

        let data = if let Some(obj_path) = path {
            info!("Loading eBPF object from: {:?}", obj_path);
            std::fs::read(&obj_path)
                .with_context(|| format!("Failed to read eBPF object file: {:?}", obj_path))?
        } else {
            #[cfg(feature = "embedded")]
            {
                info!("Loading embedded eBPF program...");
                include_bytes!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../target/bpfel-unknown-none/release/hook-probe-ebpf"
                ))
                .to_vec()
            }
            #[cfg(not(feature = "embedded"))]
            {
                anyhow::bail!(
                    "No eBPF object file provided. Use --ebpf-object or compile with 'embedded' feature"
                );
            }
        };

        let sizing = sizing.clamped();
        debug!(
            "Map sizing: {} cpus, {} tracked flow execs, {} handlers",
            sizing.cpus, sizing.tracking_capacity, sizing.handlers
        );

        let ebpf = BpfLoader::new()
            .set_max_entries("HOOK_CONTEXT_MAP", sizing.cpus)
            .set_max_entries("FLOW_EXEC_TRACKING", sizing.tracking_capacity)
            .set_max_entries("PID_TO_BATCH", sizing.handlers)
            .set_max_entries("UPCALL_BATCHES", sizing.handlers)
            .load(&data)
            .context("Failed to load eBPF program")?;

        info!("eBPF program loaded successfully");

        Ok(Self { ebpf, sizing })
    }

    /// Initialize eBPF logger
    ///
    /// Forwards aya-log records from the kernel programs. Non-fatal if it fails.
    pub fn init_logger(&mut self) {
        if let Err(e) = BpfLogger::init(&mut self.ebpf) {
            warn!("Failed to initialize eBPF logger: {}", e);
        }
    }

    /// Attach the capture program to each kernel function
    ///
    /// Functions that cannot be probed on this kernel are skipped with a
    /// warning. Fails only if none could be attached.
    ///
    /// # Returns
    ///
    /// Names of the functions the program is attached to
    pub fn attach_kprobes(&mut self, symbols: &[String]) -> Result<Vec<String>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        info!("Attaching kprobes...");

        let program: &mut KProbe = self
            .ebpf
            .program_mut(KPROBE_PROGRAM)
            .context("probe_kprobe program not found in eBPF object")?
            .try_into()
            .context("Failed to get probe_kprobe as KProbe")?;
        program.load().context("Failed to load probe_kprobe")?;

        let mut attached = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match program.attach(symbol.as_str(), 0) {
                Ok(_) => {
                    info!("  ✓ Attached to {}", symbol);
                    attached.push(symbol.clone());
                }
                Err(e) => warn!("  ⚠ Failed to attach {} (not available on this kernel): {}", symbol, e),
            }
        }

        if attached.is_empty() {
            anyhow::bail!("None of the requested kernel functions could be probed");
        }

        Ok(attached)
    }

    /// Attach the flow-execute tracker to the OVS USDT probe
    ///
    /// `offset` is the probe site inside `binary`, as listed in its
    /// `.note.stapsdt` section.
    pub fn attach_flow_exec(&mut self, binary: &Path, offset: u64, pid: Option<i32>) -> Result<()> {
        info!("Attaching flow execute probe...");

        let program: &mut UProbe = self
            .ebpf
            .program_mut(FLOW_EXEC_PROGRAM)
            .context("ovs_op_flow_execute program not found in eBPF object")?
            .try_into()
            .context("Failed to get ovs_op_flow_execute as UProbe")?;
        program.load().context("Failed to load ovs_op_flow_execute")?;
        program
            .attach(None, offset, binary, pid)
            .with_context(|| format!("Failed to attach to {:?} at {:#x}", binary, offset))?;

        info!("  ✓ Attached to {:?}+{:#x}", binary, offset);

        Ok(())
    }

    /// Enable event emission for one probed function
    pub fn configure_probe(&mut self, symbol_addr: u64, stack_trace: bool) -> Result<()> {
        let mut config: HashMap<_, u64, ProbeConfig> = HashMap::try_from(
            self.ebpf
                .map_mut("PROBE_CONFIG")
                .context("PROBE_CONFIG map not found in eBPF object")?,
        )?;

        config
            .insert(symbol_addr, ProbeConfig::new(stack_trace), 0)
            .with_context(|| format!("Failed to configure probe at {:#x}", symbol_addr))?;

        Ok(())
    }

    /// Assign one upcall batch to each handler thread
    ///
    /// Only as many threads as the batch maps were sized for are registered;
    /// operations issued by the others are not correlated.
    ///
    /// # Returns
    ///
    /// Thread ids that got a batch, in batch index order
    pub fn register_handlers(&mut self, tids: &[u32]) -> Result<Vec<u32>> {
        let registered = batch_handlers(tids, self.sizing.handlers);
        if registered.len() < tids.len() {
            warn!(
                "  ⚠ {} handler threads but only {} batches, ignoring {} threads",
                tids.len(),
                registered.len(),
                tids.len() - registered.len()
            );
        }

        let mut pid_to_batch: HashMap<_, u32, u32> = HashMap::try_from(
            self.ebpf
                .map_mut("PID_TO_BATCH")
                .context("PID_TO_BATCH map not found in eBPF object")?,
        )?;

        for (batch_idx, tid) in registered.iter().enumerate() {
            pid_to_batch
                .insert(tid, batch_idx as u32, 0)
                .with_context(|| format!("Failed to register handler thread {}", tid))?;
            debug!("Handler thread {} -> batch {}", tid, batch_idx);
        }

        info!("Registered {} handler threads", registered.len());

        Ok(registered.to_vec())
    }

    /// Turn on event emission
    pub fn enable_collection(&mut self) -> Result<()> {
        let mut global: Array<_, GlobalConfig> = Array::try_from(
            self.ebpf
                .map_mut("GLOBAL_CONFIG")
                .context("GLOBAL_CONFIG map not found in eBPF object")?,
        )?;

        global
            .set(0, GlobalConfig { enabled: 1 }, 0)
            .context("Failed to enable collection")?;

        Ok(())
    }

    /// Get the perf event array for reading captured events
    pub fn get_perf_array(&mut self) -> Result<AsyncPerfEventArray<MapData>> {
        let map = self
            .ebpf
            .take_map("EVENTS")
            .context("EVENTS map not found in eBPF object")?;

        AsyncPerfEventArray::try_from(map)
            .context("Failed to create AsyncPerfEventArray from EVENTS map")
    }

    /// Sum the per-CPU counters
    pub fn read_stats(&self) -> Result<StatsSnapshot> {
        let stats: PerCpuArray<_, u64> = PerCpuArray::try_from(
            self.ebpf
                .map("STATS")
                .context("STATS map not found in eBPF object")?,
        )?;

        let mut counters = [0u64; MAX_STATS as usize];
        for (idx, counter) in counters.iter_mut().enumerate() {
            let values = stats
                .get(&(idx as u32), 0)
                .with_context(|| format!("Failed to read stat {}", idx))?;
            *counter = values.iter().sum();
        }

        Ok(StatsSnapshot::from_counters(&counters))
    }

    /// Queue ids currently marked in flight
    pub fn flow_exec_in_flight(&self) -> Result<Vec<u32>> {
        let tracking: HashMap<_, u32, u32> = HashMap::try_from(
            self.ebpf
                .map("FLOW_EXEC_TRACKING")
                .context("FLOW_EXEC_TRACKING map not found in eBPF object")?,
        )?;

        let mut queue_ids = tracking
            .keys()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to iterate FLOW_EXEC_TRACKING")?;
        queue_ids.sort_unstable();

        Ok(queue_ids)
    }
}

/// Handler threads that fit in `batches` upcall batches
pub fn batch_handlers(tids: &[u32], batches: u32) -> &[u32] {
    &tids[..tids.len().min(batches as usize)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_clamped_to_compiled_limits() {
        let sizing = MapSizing {
            cpus: 4096,
            tracking_capacity: 0,
            handlers: 0,
        }
        .clamped();

        assert_eq!(sizing.cpus, MAX_CPUS);
        assert_eq!(sizing.tracking_capacity, 1);
        assert_eq!(sizing.handlers, 1);
    }

    #[test]
    fn test_sizing_within_limits_unchanged() {
        let sizing = MapSizing {
            cpus: 8,
            tracking_capacity: 16384,
            handlers: 12,
        };

        assert_eq!(sizing.clamped(), sizing);
    }

    #[test]
    fn test_default_sizing_matches_object() {
        let sizing = MapSizing::default();
        assert_eq!(sizing.cpus, MAX_CPUS);
        assert_eq!(sizing.tracking_capacity, FLOW_EXEC_TRACKING_MAX);
        assert_eq!(sizing.handlers, UPCALL_HANDLERS_MAX);
    }

    #[test]
    fn test_batch_handlers_capped_at_batch_count() {
        let tids: Vec<u32> = (1000..1300).collect();
        let batches = MapSizing {
            handlers: tids.len() as u32,
            ..MapSizing::default()
        }
        .clamped()
        .handlers;

        let registered = batch_handlers(&tids, batches);

        assert_eq!(registered.len(), UPCALL_HANDLERS_MAX as usize);
        assert_eq!(registered.first(), Some(&1000));
        assert_eq!(registered.last(), Some(&1255));
    }

    #[test]
    fn test_batch_handlers_all_fit() {
        let tids = [11, 12, 13];
        assert_eq!(batch_handlers(&tids, 3), &tids);
        assert_eq!(batch_handlers(&tids, 8), &tids);
        assert!(batch_handlers(&[], 1).is_empty());
    }
}
