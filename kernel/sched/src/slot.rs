//! Per-CPU execution context slot.
//!
//! While a CPU services a trap, its [`ContextSlot`] holds the handle of the
//! register image that will be resumed when the trap returns. The slot is
//! handed to the dispatcher, and a scheduler decision to run a different
//! task lands here through [`ContextSlot::request_switch`], which also
//! raises an explicit switch flag for the trap path to consume.
//!
//! Only the owning CPU writes its slot. Other CPUs may read it for crash
//! reports and must tolerate a stale value.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tessera_core::cpu_local::{CpuLocal, MAX_CPUS};
use tessera_core::id::CpuId;
use tessera_core::kwarn;
use tessera_core::regs::RegsHandle;

use crate::ops::Scheduler;

/// One CPU's trap context.
pub struct ContextSlot {
    /// Encoded `Option<RegsHandle>`, zero when no trap is active.
    regs: AtomicUsize,
    switched: AtomicBool,
}

impl ContextSlot {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            regs: AtomicUsize::new(0),
            switched: AtomicBool::new(false),
        }
    }

    /// Records the register image of a trap that is starting.
    ///
    /// Returns whatever the slot held before, which is `None` unless a
    /// previous trap on this CPU never ended.
    pub fn begin_trap(&self, regs: RegsHandle) -> Option<RegsHandle> {
        self.switched.store(false, Ordering::Relaxed);
        RegsHandle::decode(self.regs.swap(regs.addr(), Ordering::AcqRel))
    }

    /// Clears the slot after the trap's context switch, if any, is fully
    /// committed.
    pub fn end_trap(&self) {
        self.switched.store(false, Ordering::Relaxed);
        self.regs.store(0, Ordering::Release);
    }

    /// Returns the register image that will resume, or `None` outside a trap.
    pub fn current(&self) -> Option<RegsHandle> {
        RegsHandle::decode(self.regs.load(Ordering::Acquire))
    }

    /// Redirects the trap return to another task's register image.
    ///
    /// Called by the scheduler (through the dispatcher) when it decides a
    /// different task should run on this CPU.
    pub fn request_switch(&self, regs: RegsHandle) {
        self.regs.store(regs.addr(), Ordering::Release);
        self.switched.store(true, Ordering::Release);
    }

    /// Consumes the switch flag, returning whether a switch was requested
    /// since the trap began or since the last call.
    pub fn take_switch(&self) -> bool {
        self.switched.swap(false, Ordering::AcqRel)
    }

    /// Returns `true` while a trap is being serviced.
    pub fn in_trap(&self) -> bool {
        self.regs.load(Ordering::Relaxed) != 0
    }
}

impl Default for ContextSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`ContextSlot`] per CPU.
pub struct ContextSlots {
    slots: CpuLocal<ContextSlot>,
}

impl ContextSlots {
    /// Creates a table of empty slots.
    pub const fn new() -> Self {
        Self {
            slots: CpuLocal::new([const { ContextSlot::new() }; MAX_CPUS]),
        }
    }

    /// Returns the slot of `cpu`.
    pub fn slot(&self, cpu: CpuId) -> &ContextSlot {
        self.slots.get_for(cpu)
    }

    /// Returns the slot of the CPU `sched` reports as current, e.g. for an
    /// exception handler that wants the pending resume image.
    pub fn this_slot<S: Scheduler>(&self, sched: &S) -> &ContextSlot {
        self.slot(sched.this_cpu())
    }

    /// Records `regs` as the trap context of `cpu` and returns the previous
    /// value. A non-empty previous value means a trap leaked and is logged.
    pub fn begin_trap(&self, cpu: CpuId, regs: RegsHandle) -> Option<RegsHandle> {
        let previous = self.slot(cpu).begin_trap(regs);
        if let Some(stale) = previous {
            kwarn!("trap: cpu {cpu} entered a trap with stale context {stale}");
        }
        previous
    }

    /// Moves the pending resume image of `from` into the slot of `to` and
    /// clears `from`, for a trap that continues on another CPU.
    ///
    /// Any switch request still pending on `from` is dropped. Returns the
    /// moved image, or `None` (leaving both slots untouched) if `from` is
    /// not in a trap.
    pub fn migrate(&self, from: CpuId, to: CpuId) -> Option<RegsHandle> {
        let regs = self.current(from)?;
        self.begin_trap(to, regs);
        self.end_trap(from);
        Some(regs)
    }

    /// Clears the trap context of `cpu`.
    pub fn end_trap(&self, cpu: CpuId) {
        self.slot(cpu).end_trap();
    }

    /// Returns the trap context of `cpu`, or `None` if it is not in a trap.
    pub fn current(&self, cpu: CpuId) -> Option<RegsHandle> {
        self.slot(cpu).current()
    }

    /// Returns `true` if `cpu` is servicing a trap.
    pub fn in_trap(&self, cpu: CpuId) -> bool {
        self.slot(cpu).in_trap()
    }

    /// Iterates over every CPU's slot.
    pub fn iter(&self) -> impl Iterator<Item = (CpuId, &ContextSlot)> {
        self.slots.iter()
    }
}

impl Default for ContextSlots {
    fn default() -> Self {
        Self::new()
    }
}
