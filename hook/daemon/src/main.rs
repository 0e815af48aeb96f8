//! eBPF Hook Probe - Userspace Program
//!
//! Loads the hook probe, attaches it to the requested kernel functions and
//! optionally to the OVS flow-execute USDT site, collects events, and
//! exports a JSON summary.
//!
//! ## Usage
//!
//! ```bash
//! # Probe two kernel functions for 30 seconds
//! sudo ./hook-probe --ebpf-object hook-probe-ebpf \
//!     --kprobe ovs_dp_upcall --kprobe ovs_execute_actions --duration 30
//!
//! # Also track flow executes issued by ovs-vswitchd
//! sudo ./hook-probe --ebpf-object hook-probe-ebpf --kprobe ovs_dp_upcall \
//!     --flow-exec-offset 0x1a2b3c --output trace.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use hook_common::constants::FLOW_EXEC_TRACKING_MAX;
use hook_probe_userspace::{
    collector::TraceCollector,
    events::EventProcessor,
    exporter::{JsonExporter, SummaryExporter},
    kallsyms::Kallsyms,
    loader::{MapSizing, ProbeLoader},
    ovs,
    types::TraceSummary,
};
use log::{info, warn};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    signal,
    sync::Mutex,
    time::{sleep, Instant},
};

/// Kernel function entry and OVS flow-execute tracing
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Kernel function to probe (repeatable)
    #[clap(short, long = "kprobe", value_name = "SYMBOL")]
    kprobes: Vec<String>,

    /// Collect a kernel stack trace with each event
    #[clap(long)]
    stack_trace: bool,

    /// ovs-vswitchd process id (looked up by name if omitted)
    #[clap(long)]
    ovs_pid: Option<u32>,

    /// ovs-vswitchd binary holding the flow-execute USDT site
    #[clap(long, default_value = "/usr/sbin/ovs-vswitchd")]
    ovs_binary: PathBuf,

    /// Offset of dpif_netlink_operate__::op_flow_execute in the binary
    #[clap(long, value_parser = parse_offset)]
    flow_exec_offset: Option<u64>,

    /// Capacity of the in-flight flow-execute table
    #[clap(long, default_value_t = FLOW_EXEC_TRACKING_MAX)]
    tracking_capacity: u32,

    /// Duration to run the probe (in seconds, 0 = infinite)
    #[clap(short, long, default_value_t = 60)]
    duration: u64,

    /// Output file for the summary (`-` for stdout)
    #[clap(short, long, default_value = "hook-trace.json")]
    output: PathBuf,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,

    /// Path to eBPF object file (if not embedded)
    #[clap(long)]
    ebpf_object: Option<PathBuf>,

    /// Progress reporting interval in seconds (0 = off)
    #[clap(long, default_value_t = 10)]
    progress_interval: u64,
}

/// Accept decimal or 0x-prefixed hex
fn parse_offset(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{}': {}", s, e))
}

/// OVS process to correlate flow executes for
struct OvsTarget {
    pid: u32,
    handlers: Vec<u32>,
}

fn resolve_ovs(args: &Args) -> Result<Option<OvsTarget>> {
    if args.flow_exec_offset.is_none() {
        return Ok(None);
    }

    let pid = match args.ovs_pid {
        Some(pid) => pid,
        None => ovs::find_pid_by_comm(ovs::OVS_VSWITCHD_COMM)?
            .context("ovs-vswitchd is not running; pass --ovs-pid")?,
    };

    let handlers = ovs::handler_threads(pid)?;
    if handlers.is_empty() {
        warn!("ovs-vswitchd ({}) has no handler threads, no operations will be tracked", pid);
    }

    Ok(Some(OvsTarget { pid, handlers }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if args.kprobes.is_empty() && args.flow_exec_offset.is_none() {
        anyhow::bail!("Nothing to probe: pass --kprobe and/or --flow-exec-offset");
    }

    info!("Starting eBPF hook probe...");
    info!(
        "   Duration: {} seconds",
        if args.duration == 0 {
            "infinite".to_string()
        } else {
            args.duration.to_string()
        }
    );
    info!("   Output: {:?}", args.output);
    info!("   Kprobes: {}", args.kprobes.join(", "));

    let symbols = Kallsyms::load()?;
    if symbols.is_empty() {
        warn!("/proc/kallsyms exposes no addresses; run as root to get events");
    }

    let ovs_target = resolve_ovs(&args)?;

    let sizing = MapSizing {
        cpus: aya::util::nr_cpus().context("Failed to count possible CPUs")? as u32,
        tracking_capacity: args.tracking_capacity,
        handlers: ovs_target.as_ref().map_or(1, |t| t.handlers.len() as u32),
    };

    // Load eBPF program
    let mut loader = ProbeLoader::load(args.ebpf_object.clone(), sizing)?;

    // Initialize eBPF logger (optional)
    loader.init_logger();

    let attached = loader.attach_kprobes(&args.kprobes)?;
    for symbol in &attached {
        match symbols.address_of(symbol) {
            Some(addr) => loader.configure_probe(addr, args.stack_trace)?,
            None => warn!("  ⚠ No address for {}, its events will be filtered", symbol),
        }
    }

    if let (Some(target), Some(offset)) = (&ovs_target, args.flow_exec_offset) {
        let registered = loader.register_handlers(&target.handlers)?;
        info!("   Handler threads: {:?}", registered);
        loader.attach_flow_exec(&args.ovs_binary, offset, Some(target.pid as i32))?;
    }

    let perf_array = loader.get_perf_array()?;

    let collector = Arc::new(Mutex::new(TraceCollector::new()));
    let processor = EventProcessor::new(Arc::clone(&collector), args.verbose);

    // Spawn per-CPU event readers
    processor.spawn_cpu_readers(perf_array)?;

    // Spawn progress reporter
    processor.spawn_progress_reporter(args.progress_interval);

    // Everything is attached: start emitting
    loader.enable_collection()?;

    info!("Collecting events...");

    let start_time = Instant::now();
    if args.duration > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {
                info!("Duration reached, shutting down...");
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
            }
        }
    } else {
        signal::ctrl_c().await?;
        info!("Interrupted, shutting down...");
    }

    let elapsed = start_time.elapsed().as_secs();

    let stats = loader.read_stats()?;
    let in_flight = loader.flow_exec_in_flight()?;

    let summary = collector
        .lock()
        .await
        .generate_summary(elapsed, &symbols, stats, in_flight);

    let exporter = JsonExporter::new(args.output.clone(), true);
    exporter.export(&summary)?;

    info!("Summary written to {:?}", args.output);

    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &TraceSummary) {
    let stats = &summary.stats;

    info!("");
    info!("============================================");
    info!("             Summary Report");
    info!("============================================");
    info!("");
    info!("  Total events:       {}", summary.total_events);
    info!("  Stack traces:       {}", summary.stack_traces);
    info!("  Duration:           {} seconds", summary.duration_seconds);
    info!("");
    info!("  Events by function:");
    for symbol in &summary.symbols {
        info!("    {:<32} {:>10}", symbol.symbol, symbol.events);
    }
    info!("");
    info!("  Kernel counters:");
    info!("    kprobe firings:      {:>10}", stats.kprobe_events);
    info!("    slot misses:         {:>10}", stats.slot_misses);
    info!("    events sent:         {:>10}", stats.events_sent);
    info!("    events filtered:     {:>10}", stats.events_filtered);
    info!("    flow exec firings:   {:>10}", stats.flow_exec_events);
    info!("    flow exec tracked:   {:>10}", stats.flow_exec_tracked);
    info!("    flow exec duplicate: {:>10}", stats.flow_exec_duplicates);
    info!("    flow exec errors:    {:>10}", stats.flow_exec_table_errors);
    info!("    no operation:        {:>10}", stats.flow_exec_no_operation);
    info!("");
    info!("  In flight at exit:   {}", summary.flow_exec_in_flight.len());
    info!("============================================");
}
