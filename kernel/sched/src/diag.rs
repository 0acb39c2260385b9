//! Crash-time view of per-CPU trap state.
//!
//! Reads every CPU's context slot and running-task entry without any
//! synchronization beyond the atomics themselves, so a snapshot taken while
//! other CPUs are still running can be slightly stale. That is acceptable
//! for a panic report and is the only thing this module is for.

use core::fmt;

use planck_noalloc::vec::ArrayVec;
use tessera_core::id::{CpuId, TaskId};
use tessera_core::kprintln;
use tessera_core::regs::RegsHandle;

use crate::registry::RunningTasks;
use crate::slot::ContextSlots;

/// CPUs listed by [`dump`]. Further active CPUs are only counted.
pub const DUMP_CPUS: usize = 32;

/// Trap state of one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSnapshot {
    /// The CPU.
    pub cpu: CpuId,
    /// Register image it will resume, if it is in a trap.
    pub regs: Option<RegsHandle>,
    /// Task last resumed on it.
    pub task: Option<TaskId>,
}

impl CpuSnapshot {
    fn is_active(&self) -> bool {
        self.regs.is_some() || self.task.is_some()
    }
}

impl fmt::Display for CpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu {:>3}: task ", self.cpu.as_u32())?;
        match self.task {
            Some(task) => write!(f, "{task}")?,
            None => write!(f, "-")?,
        }
        match self.regs {
            Some(regs) => write!(f, ", in trap, resume {regs}"),
            None => write!(f, ", not in trap"),
        }
    }
}

fn active(slots: &ContextSlots, running: &RunningTasks) -> impl Iterator<Item = CpuSnapshot> {
    slots
        .iter()
        .map(|(cpu, slot)| CpuSnapshot {
            cpu,
            regs: slot.current(),
            task: running.get(cpu),
        })
        .filter(CpuSnapshot::is_active)
}

/// Fills up to `N` snapshots and counts the active CPUs that did not fit,
/// in one pass over the slots.
fn collect<const N: usize>(
    slots: &ContextSlots,
    running: &RunningTasks,
) -> (ArrayVec<CpuSnapshot, N>, usize) {
    let mut out = ArrayVec::new();
    let mut more = 0;
    for snap in active(slots, running) {
        if out.is_full() {
            more += 1;
        } else {
            out.push(snap);
        }
    }
    (out, more)
}

/// Collects up to `N` CPUs that are in a trap or have a task recorded,
/// in CPU order.
pub fn snapshot<const N: usize>(
    slots: &ContextSlots,
    running: &RunningTasks,
) -> ArrayVec<CpuSnapshot, N> {
    collect(slots, running).0
}

/// Prints the per-CPU trap state to the raw console.
pub fn dump(slots: &ContextSlots, running: &RunningTasks) {
    let (snaps, more) = collect::<DUMP_CPUS>(slots, running);
    kprintln!("per-cpu trap state:");
    if snaps.as_slice().is_empty() {
        kprintln!("  (no cpu in a trap or running a task)");
        return;
    }
    for snap in snaps.iter() {
        kprintln!("  {snap}");
    }
    if more > 0 {
        kprintln!("  ... {more} more");
    }
}
