//! Task control block fields used by the trap-return path.
//!
//! The scheduler owns every [`Tcb`]; the trap path only reads its identity,
//! register handle and address environment, and the
//! [`CriticalSection`](crate::sync::CriticalSection) updates its
//! [`CriticalState`].

use core::sync::atomic::AtomicUsize;

use crate::id::{AddrEnvId, CpuId, TaskId};
use crate::regs::RegsHandle;
use crate::sync::loom_compat::{AtomicU32, Ordering};

/// Per-task record of the kernel critical section.
///
/// `depth` is the nesting depth the task held the lock at when it last ran
/// (zero means "not held"). `cpu` is the CPU it last held the lock on.
/// Only [`CriticalSection`](crate::sync::CriticalSection) writes these.
pub struct CriticalState {
    depth: AtomicU32,
    cpu: AtomicU32,
}

impl CriticalState {
    /// Creates a state for a task that does not hold the lock.
    #[cfg(not(all(test, any(loom, shuttle))))]
    pub const fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            cpu: AtomicU32::new(CpuId::NONE_RAW),
        }
    }

    /// Creates a state for a task that does not hold the lock.
    #[cfg(all(test, any(loom, shuttle)))]
    pub fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            cpu: AtomicU32::new(CpuId::NONE_RAW),
        }
    }

    /// Returns the recorded nesting depth.
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Acquire)
    }

    /// Returns `true` if the task held the lock when it last ran.
    pub fn is_held(&self) -> bool {
        self.depth() != 0
    }

    /// Returns the CPU the task last held the lock on.
    pub fn cpu(&self) -> Option<CpuId> {
        CpuId::from_raw(self.cpu.load(Ordering::Acquire))
    }

    pub(crate) fn record(&self, cpu: CpuId, depth: u32) {
        self.cpu.store(
            if depth == 0 { CpuId::NONE_RAW } else { cpu.as_u32() },
            Ordering::Release,
        );
        self.depth.store(depth, Ordering::Release);
    }
}

impl core::fmt::Debug for CriticalState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CriticalState")
            .field("depth", &self.depth())
            .field("cpu", &self.cpu())
            .finish()
    }
}

impl Default for CriticalState {
    fn default() -> Self {
        Self::new()
    }
}

/// The parts of a task control block the trap-return path needs.
#[derive(Debug)]
pub struct Tcb {
    id: TaskId,
    regs: AtomicUsize,
    addrenv: Option<AddrEnvId>,
    critical: CriticalState,
}

impl Tcb {
    /// Creates a kernel-only task whose registers are saved at `regs`.
    pub fn new(id: TaskId, regs: RegsHandle) -> Self {
        Self {
            id,
            regs: AtomicUsize::new(regs.addr()),
            addrenv: None,
            critical: CriticalState::new(),
        }
    }

    /// Attaches a user address environment.
    #[must_use]
    pub fn with_addrenv(mut self, addrenv: AddrEnvId) -> Self {
        self.addrenv = Some(addrenv);
        self
    }

    /// Returns the task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the handle of the task's saved register image.
    pub fn regs(&self) -> RegsHandle {
        RegsHandle::decode(self.regs.load(core::sync::atomic::Ordering::Acquire))
            .unwrap_or_else(|| unreachable!("task {} has a null register handle", self.id))
    }

    /// Moves the task's saved register image, e.g. when it is preempted on
    /// a different kernel stack.
    pub fn set_regs(&self, regs: RegsHandle) {
        self.regs.store(regs.addr(), core::sync::atomic::Ordering::Release);
    }

    /// Returns the task's address environment, if it has one.
    pub fn addrenv(&self) -> Option<AddrEnvId> {
        self.addrenv
    }

    /// Returns the task's critical-section record.
    pub fn critical(&self) -> &CriticalState {
        &self.critical
    }
}
