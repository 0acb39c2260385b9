//! Test doubles for the trap-return collaborators.

use core::fmt;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use tessera_core::id::{CpuId, TaskId};
use tessera_core::log::{self, LogLevel};
use tessera_core::regs::RegsHandle;
use tessera_core::sync::CriticalSection;
use tessera_core::task::Tcb;

use crate::ops::{AddrEnvError, AddressEnvironment, Scheduler};
use crate::slot::ContextSlot;

/// CPUs a [`MockSched`] tracks current tasks for.
const MOCK_CPUS: usize = 8;

pub(crate) fn handle(addr: usize) -> RegsHandle {
    RegsHandle::from_addr(addr).unwrap()
}

pub(crate) fn task(id: u64, regs: usize) -> Tcb {
    Tcb::new(TaskId(id), handle(regs))
}

/// Console and log output produced on one thread.
#[derive(Default)]
pub(crate) struct Captured {
    print: String,
    logs: Vec<(LogLevel, String)>,
}

impl Captured {
    pub(crate) fn lines(&self) -> Vec<&str> {
        self.print.lines().collect()
    }

    pub(crate) fn logs(&self) -> &[(LogLevel, String)] {
        &self.logs
    }
}

thread_local! {
    static CAPTURED: RefCell<Captured> = RefCell::new(Captured::default());
}

fn capture_print(args: fmt::Arguments<'_>) {
    CAPTURED.with(|c| c.borrow_mut().print.push_str(&args.to_string()));
}

fn capture_log(level: LogLevel, args: fmt::Arguments<'_>) {
    CAPTURED.with(|c| c.borrow_mut().logs.push((level, args.to_string())));
}

/// Runs `f` and returns what it printed and logged on this thread.
pub(crate) fn capture_output<R>(f: impl FnOnce() -> R) -> (R, Captured) {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // SAFETY: the capture sinks only touch a thread-local buffer.
        unsafe {
            log::set_print_fn(capture_print);
            log::set_log_fn(capture_log);
        }
    });
    CAPTURED.with(RefCell::take);
    let ret = f();
    (ret, CAPTURED.with(RefCell::take))
}

/// Dispatcher that makes `next` current on `cpu` and redirects the trap
/// return to it.
pub(crate) fn switch_to<'s, 't: 's>(
    sched: &'s MockSched<'t>,
    cpu: CpuId,
    next: &'t Tcb,
) -> impl Fn(RegsHandle, &ContextSlot) + 's {
    move |_: RegsHandle, slot: &ContextSlot| {
        sched.set_current(cpu, next);
        slot.request_switch(next.regs());
    }
}

#[derive(Clone, Copy)]
struct RestoreSwitch<'t> {
    slot: &'t ContextSlot,
    cpu: CpuId,
    next: &'t Tcb,
    every: bool,
}

/// Scheduler whose CPU and current tasks are set by the test, with its own
/// critical section and call counters.
pub(crate) struct MockSched<'t> {
    cpu: AtomicU32,
    current: Mutex<[Option<&'t Tcb>; MOCK_CPUS]>,
    lock: CriticalSection,
    on_restore: Mutex<Option<RestoreSwitch<'t>>>,
    this_cpu_calls: AtomicUsize,
    current_task_calls: AtomicUsize,
    restore_calls: AtomicUsize,
}

impl<'t> MockSched<'t> {
    pub(crate) fn new() -> Self {
        Self {
            cpu: AtomicU32::new(CpuId::BOOT.as_u32()),
            current: Mutex::new([None; MOCK_CPUS]),
            lock: CriticalSection::new(),
            on_restore: Mutex::new(None),
            this_cpu_calls: AtomicUsize::new(0),
            current_task_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_cpu(&self, cpu: CpuId) {
        self.cpu.store(cpu.as_u32(), Ordering::Relaxed);
    }

    pub(crate) fn set_current(&self, cpu: CpuId, task: &'t Tcb) {
        self.current.lock().unwrap()[cpu.as_usize()] = Some(task);
    }

    /// The next critical-section restore makes `next` current and requests
    /// a switch to it on `slot`.
    pub(crate) fn switch_on_restore(&self, slot: &'t ContextSlot, cpu: CpuId, next: &'t Tcb) {
        *self.on_restore.lock().unwrap() = Some(RestoreSwitch {
            slot,
            cpu,
            next,
            every: false,
        });
    }

    /// Like [`switch_on_restore`](Self::switch_on_restore), for every
    /// restore.
    pub(crate) fn switch_on_every_restore(
        &self,
        slot: &'t ContextSlot,
        cpu: CpuId,
        next: &'t Tcb,
    ) {
        *self.on_restore.lock().unwrap() = Some(RestoreSwitch {
            slot,
            cpu,
            next,
            every: true,
        });
    }

    pub(crate) fn this_cpu_calls(&self) -> usize {
        self.this_cpu_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn current_task_calls(&self) -> usize {
        self.current_task_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::Relaxed)
    }
}

impl Scheduler for MockSched<'_> {
    fn this_cpu(&self) -> CpuId {
        self.this_cpu_calls.fetch_add(1, Ordering::Relaxed);
        CpuId::new(self.cpu.load(Ordering::Relaxed))
    }

    fn current_task(&self, cpu: CpuId) -> Option<&Tcb> {
        self.current_task_calls.fetch_add(1, Ordering::Relaxed);
        self.current.lock().unwrap()[cpu.as_usize()]
    }

    fn critical_section(&self) -> &CriticalSection {
        &self.lock
    }

    fn restore_critical_section(&self, task: &Tcb, cpu: CpuId) {
        self.restore_calls.fetch_add(1, Ordering::Relaxed);
        self.lock.restore(task, cpu);

        let hook = {
            let mut guard = self.on_restore.lock().unwrap();
            if guard.is_some_and(|h| h.every) {
                *guard
            } else {
                guard.take()
            }
        };
        if let Some(h) = hook {
            self.set_current(h.cpu, h.next);
            h.slot.request_switch(h.next.regs());
        }
    }
}

/// Address environment that records calls and optionally fails.
pub(crate) struct CountingAddrEnv {
    calls: AtomicUsize,
    last: Mutex<Option<TaskId>>,
    fail: Option<AddrEnvError>,
}

impl CountingAddrEnv {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            fail: None,
        }
    }

    pub(crate) fn failing(err: AddrEnvError) -> Self {
        Self {
            fail: Some(err),
            ..Self::new()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn last(&self) -> Option<TaskId> {
        *self.last.lock().unwrap()
    }
}

impl AddressEnvironment for CountingAddrEnv {
    fn switch_to(&self, next: Option<&Tcb>) -> Result<(), AddrEnvError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap() = next.map(Tcb::id);
        self.fail.map_or(Ok(()), Err)
    }
}
