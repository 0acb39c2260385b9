//! Trap-return path for the Tessera kernel.
//!
//! After a system call or exception trap, [`TrapCoordinator::handle_trap`]
//! runs the dispatcher, notices whether the scheduler switched the CPU to a
//! different task while doing so, and if it did, brings the address space,
//! the per-CPU running-task registry and the kernel critical section in
//! line with the task that is about to resume.
//!
//! The per-CPU state the coordinator maintains ([`CONTEXT_SLOTS`] and
//! [`RUNNING_TASKS`] in kernel builds) is advisory for every CPU but the
//! one writing it; [`diag`] reads it when the kernel dies.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod diag;
pub mod fatal;
pub mod ops;
pub mod registry;
pub mod slot;
pub mod trap;

#[cfg(test)]
pub(crate) mod test_support;

pub use ops::{AddrEnvError, AddressEnvironment, NoAddressEnvironment, Scheduler, TrapDispatch};
pub use registry::RunningTasks;
pub use slot::{ContextSlot, ContextSlots};
pub use trap::{TrapCoordinator, TrapFlags, TrapReturn};

/// Kernel-wide per-CPU trap context slots.
pub static CONTEXT_SLOTS: ContextSlots = ContextSlots::new();

/// Kernel-wide per-CPU running-task registry.
pub static RUNNING_TASKS: RunningTasks = RunningTasks::new();
