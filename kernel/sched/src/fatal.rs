//! Unrecoverable trap-return inconsistencies.

use core::fmt;

use tessera_core::id::{CpuId, TaskId};
use tessera_core::kfatal;

use crate::diag;
use crate::ops::AddrEnvError;
use crate::registry::RunningTasks;
use crate::slot::ContextSlots;

/// A condition the trap-return path cannot recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapFatal {
    /// The incoming task's address space could not be installed.
    AddressEnvironment {
        /// CPU that was switching.
        cpu: CpuId,
        /// Task being switched to.
        task: TaskId,
        /// Collaborator error.
        error: AddrEnvError,
    },
    /// The scheduler reported a switch but has no current task.
    NoCurrentTask {
        /// CPU with no task.
        cpu: CpuId,
    },
    /// A switch was requested but the context slot holds no registers.
    EmptySlot {
        /// CPU whose slot is empty.
        cpu: CpuId,
    },
    /// Committing a switch kept triggering further switches.
    NestedSwitchLimit {
        /// CPU that was switching.
        cpu: CpuId,
        /// Switches committed in this trap before giving up.
        count: u32,
    },
}

impl fmt::Display for TrapFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressEnvironment { cpu, task, error } => {
                write!(f, "cpu {cpu}: switching to task {task} failed: {error}")
            }
            Self::NoCurrentTask { cpu } => write!(f, "cpu {cpu}: no current task after switch"),
            Self::EmptySlot { cpu } => write!(f, "cpu {cpu}: switch requested with empty context"),
            Self::NestedSwitchLimit { cpu, count } => {
                write!(f, "cpu {cpu}: still switching after {count} switches in one trap")
            }
        }
    }
}

/// Reports `err`, dumps per-CPU trap state and panics.
#[cold]
#[inline(never)]
pub fn fatal(err: &TrapFatal, slots: &ContextSlots, running: &RunningTasks) -> ! {
    kfatal!("trap: {err}");
    diag::dump(slots, running);
    panic!("trap: {err}");
}
