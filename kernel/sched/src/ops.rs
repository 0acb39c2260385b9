//! Collaborators the trap-return path calls out to.
//!
//! The coordinator does not know how tasks are scheduled, how a trap is
//! decoded, or how address spaces are built. Those belong to the
//! [`Scheduler`], the [`TrapDispatch`] and the [`AddressEnvironment`]
//! respectively.

use core::fmt;

use tessera_core::id::{AddrEnvId, CpuId};
use tessera_core::regs::RegsHandle;
use tessera_core::sync::CriticalSection;
use tessera_core::task::Tcb;

use crate::slot::ContextSlot;

/// The scheduler as seen from the trap-return path.
pub trait Scheduler {
    /// Returns the CPU the caller is executing on.
    fn this_cpu(&self) -> CpuId;

    /// Returns the task the scheduler has chosen to run on `cpu`.
    fn current_task(&self, cpu: CpuId) -> Option<&Tcb>;

    /// Returns the kernel-wide critical section.
    fn critical_section(&self) -> &CriticalSection;

    /// Reinstates the critical-section state `task` held when it last ran.
    fn restore_critical_section(&self, task: &Tcb, cpu: CpuId) {
        self.critical_section().restore(task, cpu);
    }
}

/// Services one trap: a system call, a software interrupt or an exception.
///
/// A dispatcher that makes the scheduler pick another task reports it with
/// [`ContextSlot::request_switch`] on the slot it was handed.
pub trait TrapDispatch {
    /// Handles the trap whose registers are saved at `regs`.
    fn dispatch(&self, regs: RegsHandle, slot: &ContextSlot);
}

impl<F> TrapDispatch for F
where
    F: Fn(RegsHandle, &ContextSlot),
{
    fn dispatch(&self, regs: RegsHandle, slot: &ContextSlot) {
        self(regs, slot);
    }
}

/// Per-task user address spaces.
pub trait AddressEnvironment {
    /// Whether the kernel is built with per-task address spaces. When
    /// `false`, the coordinator never calls [`switch_to`](Self::switch_to).
    const ENABLED: bool = true;

    /// Quiesces the outgoing address space and installs the one of `next`.
    /// `None` selects the kernel-only space.
    fn switch_to(&self, next: Option<&Tcb>) -> Result<(), AddrEnvError>;
}

/// Address environment for kernels without user address spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAddressEnvironment;

impl AddressEnvironment for NoAddressEnvironment {
    const ENABLED: bool = false;

    fn switch_to(&self, _next: Option<&Tcb>) -> Result<(), AddrEnvError> {
        Ok(())
    }
}

/// Errors from [`AddressEnvironment::switch_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrEnvError {
    /// The address space has no page tables (never built or already freed).
    Unmapped(AddrEnvId),
    /// The address space is being torn down.
    Dying(AddrEnvId),
}

impl fmt::Display for AddrEnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped(id) => write!(f, "address environment {id} has no page tables"),
            Self::Dying(id) => write!(f, "address environment {id} is being torn down"),
        }
    }
}
