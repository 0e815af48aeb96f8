//! Test doubles for the collaborator traits

use std::{
    cell::RefCell,
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
    vec::Vec,
};

use crate::{
    capture::HookChain,
    constants::{EEXIST, REG_MAX},
    correlation::{FlowExecTable, OperationBatcher, TrackError},
    trigger::Trigger,
    types::{HookContext, OvsOpType, OvsOperationEvent, UpcallBatch},
};

#[derive(Clone, Copy, Debug)]
pub struct FakeTrigger {
    pub cpu: u32,
    pub now: u64,
    pub ip: u64,
    pub args: [u64; REG_MAX],
    pub pid_tgid: u64,
}

impl FakeTrigger {
    pub fn on_cpu(cpu: u32) -> Self {
        Self {
            cpu,
            now: 1,
            ip: 0xffff_ffff_8100_0000,
            args: [0; REG_MAX],
            pid_tgid: 0,
        }
    }
}

impl Trigger for FakeTrigger {
    fn cpu_id(&self) -> u32 {
        self.cpu
    }

    fn ktime_ns(&self) -> u64 {
        self.now
    }

    fn func_ip(&self) -> u64 {
        self.ip
    }

    fn arg(&self, n: usize) -> u64 {
        self.args[n]
    }

    fn pid_tgid(&self) -> u64 {
        self.pid_tgid
    }
}

/// Chain that copies every context it is given
pub struct RecordingChain {
    status: u32,
    seen: RefCell<Vec<HookContext>>,
}

impl RecordingChain {
    pub fn returning(status: u32) -> Self {
        Self {
            status,
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn last(&self) -> Option<HookContext> {
        self.seen.borrow().last().copied()
    }
}

impl<T: ?Sized> HookChain<T> for RecordingChain {
    fn chain(&self, _trigger: &T, context: &HookContext) -> u32 {
        self.seen.borrow_mut().push(*context);
        self.status
    }
}

/// Tracking table with a fixed capacity, shareable across threads
///
/// The check and the insert happen under one lock, the way BPF_NOEXIST
/// makes them one step in the kernel.
pub struct MemoryTable {
    capacity: usize,
    entries: Mutex<BTreeSet<u32>>,
}

impl MemoryTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(BTreeSet::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.entries.lock().unwrap()
    }

    pub fn contains(&self, queue_id: u32) -> bool {
        self.entries().contains(&queue_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Dequeue-side removal
    pub fn remove(&self, queue_id: u32) -> bool {
        self.entries().remove(&queue_id)
    }
}

impl FlowExecTable for MemoryTable {
    fn insert_if_absent(&self, queue_id: u32) -> Result<(), TrackError> {
        let mut entries = self.entries();
        if entries.contains(&queue_id) {
            return Err(TrackError::from_errno(queue_id, -EEXIST));
        }
        if entries.len() >= self.capacity {
            // E2BIG, as returned by a full BPF hash map
            return Err(TrackError::from_errno(queue_id, -7));
        }
        entries.insert(queue_id);
        Ok(())
    }
}

/// Batcher yielding a scripted sequence of operations
pub struct ScriptedBatcher {
    script: Vec<Option<u32>>,
    next: usize,
    event: OvsOperationEvent,
    pub requested: Vec<OvsOpType>,
}

impl ScriptedBatcher {
    /// One entry per firing: `Some(queue_id)` or `None` for no event
    pub fn new(script: &[Option<u32>]) -> Self {
        Self {
            script: script.to_vec(),
            next: 0,
            event: OvsOperationEvent::zeroed(),
            requested: Vec::new(),
        }
    }
}

impl<T: Trigger + ?Sized> OperationBatcher<T> for ScriptedBatcher {
    fn batch_process_op(&mut self, op_type: OvsOpType, _trigger: &T) -> Option<&OvsOperationEvent> {
        self.requested.push(op_type);
        let idx = self.next;
        self.next += 1;
        let queue_id = (*self.script.get(idx)?)?;
        self.event = OvsOperationEvent {
            queue_id,
            op_type: op_type as u8,
            ..OvsOperationEvent::zeroed()
        };
        Some(&self.event)
    }
}

/// Batch holding `queue_ids`, each expecting `ops` operations
pub fn batch_of(queue_ids: &[u32], ops: u8) -> UpcallBatch {
    let mut batch = UpcallBatch::zeroed();
    batch.leader_ts = 1234;
    batch.processing = 1;
    batch.total = queue_ids.len() as u8;
    for (upcall, &queue_id) in batch.upcalls.iter_mut().zip(queue_ids) {
        upcall.queue_id = queue_id;
        upcall.process_ops = ops;
    }
    batch
}
