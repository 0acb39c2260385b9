//! Trap-return coordination.
//!
//! The architecture's trap entry saves the interrupted task's registers and
//! calls [`TrapCoordinator::handle_trap`] with a handle to them. The
//! returned handle is the register image to restore on the way out. When
//! it differs from the one passed in, the scheduler switched this CPU to
//! another task while the trap was being serviced and the glue must do a
//! full context restore.
//!
//! A switch is committed before returning:
//!
//! 1. the incoming task's address space is installed (if the kernel has
//!    per-task address spaces),
//! 2. the task is recorded in the [`RunningTasks`] registry,
//! 3. the kernel critical section is put back into the state the task held
//!    it in when it was preempted.
//!
//! Committing can itself make the scheduler pick yet another task (for
//! instance when restoring the critical section lets a pending wakeup run),
//! so the commit repeats until the slot stops reporting switches. If the
//! scheduler reports a different CPU after a switch, the trap carries on
//! with that CPU's slot.

use bitflags::bitflags;
use tessera_core::id::CpuId;
use tessera_core::ktrace;
use tessera_core::regs::RegsHandle;
use tessera_core::task::Tcb;

use crate::fatal::{TrapFatal, fatal};
use crate::ops::{AddressEnvironment, NoAddressEnvironment, Scheduler, TrapDispatch};
use crate::registry::RunningTasks;
use crate::slot::ContextSlots;

/// Switches that may follow the first one within a single trap before the
/// kernel gives up.
pub const MAX_NESTED_SWITCHES: u32 = 8;

bitflags! {
    /// What happened while returning from a trap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrapFlags: u8 {
        /// The CPU resumes a different task than the one that trapped.
        const SWITCHED         = 1 << 0;
        /// An address space was installed for the incoming task.
        const ADDRENV_SWITCHED = 1 << 1;
        /// Committing a switch triggered at least one more switch.
        const NESTED_SWITCH    = 1 << 2;
        /// The scheduler reported a different CPU after the switch.
        const CPU_MIGRATED     = 1 << 3;
    }
}

/// Result of [`TrapCoordinator::handle_trap_detailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapReturn {
    /// Register image to restore.
    pub resume: RegsHandle,
    /// What happened on the way.
    pub flags: TrapFlags,
}

impl TrapReturn {
    /// Returns `true` if the glue must restore a different task's full
    /// register image instead of returning to the trapping task.
    pub fn needs_full_restore(&self) -> bool {
        self.flags.contains(TrapFlags::SWITCHED)
    }
}

/// Runs the trap-return path.
///
/// Borrows the per-CPU tables it maintains. Kernel builds pass
/// [`CONTEXT_SLOTS`](crate::CONTEXT_SLOTS) and
/// [`RUNNING_TASKS`](crate::RUNNING_TASKS).
pub struct TrapCoordinator<'a, S, D, A = NoAddressEnvironment> {
    slots: &'a ContextSlots,
    running: &'a RunningTasks,
    sched: &'a S,
    dispatch: D,
    addrenv: A,
}

impl<'a, S, D> TrapCoordinator<'a, S, D>
where
    S: Scheduler,
    D: TrapDispatch,
{
    /// Creates a coordinator for a kernel without per-task address spaces.
    pub fn new(
        slots: &'a ContextSlots,
        running: &'a RunningTasks,
        sched: &'a S,
        dispatch: D,
    ) -> Self {
        Self {
            slots,
            running,
            sched,
            dispatch,
            addrenv: NoAddressEnvironment,
        }
    }
}

impl<'a, S, D, A> TrapCoordinator<'a, S, D, A>
where
    S: Scheduler,
    D: TrapDispatch,
    A: AddressEnvironment,
{
    /// Replaces the address environment.
    pub fn with_address_environment<B: AddressEnvironment>(
        self,
        addrenv: B,
    ) -> TrapCoordinator<'a, S, D, B> {
        TrapCoordinator {
            slots: self.slots,
            running: self.running,
            sched: self.sched,
            dispatch: self.dispatch,
            addrenv,
        }
    }

    /// Returns the address environment.
    pub fn address_environment(&self) -> &A {
        &self.addrenv
    }

    /// Services the trap whose registers are saved at `regs` and returns the
    /// register image to resume.
    ///
    /// # Panics
    ///
    /// Panics (after logging and dumping per-CPU state) if a switch cannot
    /// be committed; see [`TrapFatal`].
    pub fn handle_trap(&self, regs: RegsHandle) -> RegsHandle {
        self.handle_trap_detailed(regs).resume
    }

    /// Like [`handle_trap`](Self::handle_trap), also reporting what
    /// happened.
    ///
    /// # Panics
    ///
    /// Same as [`handle_trap`](Self::handle_trap).
    pub fn handle_trap_detailed(&self, regs: RegsHandle) -> TrapReturn {
        let entry_cpu = self.sched.this_cpu();
        self.slots.begin_trap(entry_cpu, regs);
        self.dispatch.dispatch(regs, self.slots.slot(entry_cpu));

        let mut flags = TrapFlags::empty();
        let mut cpu = entry_cpu;
        let mut switches: u32 = 0;
        // After a migration the trap continues on the new CPU's slot, which
        // is where a nested switch request lands.
        while self.slots.slot(cpu).take_switch() {
            if switches > MAX_NESTED_SWITCHES {
                self.die(&TrapFatal::NestedSwitchLimit {
                    cpu,
                    count: switches,
                });
            }
            if switches > 0 {
                flags |= TrapFlags::NESTED_SWITCH;
            }
            switches += 1;
            flags |= TrapFlags::SWITCHED;

            if !self.slots.in_trap(cpu) {
                self.die(&TrapFatal::EmptySlot { cpu });
            }
            cpu = self.commit_switch(cpu, &mut flags);
        }

        let resume = self
            .slots
            .current(cpu)
            .unwrap_or_else(|| self.die(&TrapFatal::EmptySlot { cpu }));
        self.slots.end_trap(cpu);

        TrapReturn { resume, flags }
    }

    /// Brings the address space, registry and critical section in line with
    /// the task the scheduler now reports as current. Returns the CPU the
    /// switch was committed on.
    ///
    /// If that is not `prev_cpu`, the pending resume image moves to the new
    /// CPU's slot and any critical-section hold `prev_cpu` had on behalf of
    /// the outgoing task is dropped.
    fn commit_switch(&self, prev_cpu: CpuId, flags: &mut TrapFlags) -> CpuId {
        let cpu = self.sched.this_cpu();
        if cpu != prev_cpu {
            *flags |= TrapFlags::CPU_MIGRATED;
            if self.slots.migrate(prev_cpu, cpu).is_none() {
                self.die(&TrapFatal::EmptySlot { cpu: prev_cpu });
            }
            self.sched.critical_section().release_held_by(prev_cpu);
        }
        let task = self
            .sched
            .current_task(cpu)
            .unwrap_or_else(|| self.die(&TrapFatal::NoCurrentTask { cpu }));

        if A::ENABLED {
            self.install_address_space(cpu, task);
            *flags |= TrapFlags::ADDRENV_SWITCHED;
        }

        self.running.set(cpu, task.id());
        self.sched.restore_critical_section(task, cpu);

        ktrace!("trap: cpu {cpu} switched to task {}", task.id());
        cpu
    }

    fn install_address_space(&self, cpu: CpuId, task: &Tcb) {
        if let Err(error) = self.addrenv.switch_to(Some(task)) {
            self.die(&TrapFatal::AddressEnvironment {
                cpu,
                task: task.id(),
                error,
            });
        }
    }

    fn die(&self, err: &TrapFatal) -> ! {
        fatal(err, self.slots, self.running)
    }
}
