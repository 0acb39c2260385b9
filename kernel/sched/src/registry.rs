//! Per-CPU running-task registry.
//!
//! Records which task the trap path last resumed on each CPU. Nothing
//! schedules from it; it exists so that assertion and crash reporting on
//! any CPU can say what every other CPU was running. Reads from other
//! CPUs may be momentarily stale.

use core::sync::atomic::{AtomicU64, Ordering};

use tessera_core::cpu_local::{CpuLocal, MAX_CPUS};
use tessera_core::id::{CpuId, TaskId};

/// CPU → running task, advisory.
pub struct RunningTasks {
    tasks: CpuLocal<AtomicU64>,
}

impl RunningTasks {
    /// Creates a registry with no task recorded on any CPU.
    pub const fn new() -> Self {
        Self {
            tasks: CpuLocal::new([const { AtomicU64::new(TaskId::NONE_RAW) }; MAX_CPUS]),
        }
    }

    /// Records `task` as running on `cpu`. Only `cpu` itself calls this.
    pub fn set(&self, cpu: CpuId, task: TaskId) {
        self.tasks.get_for(cpu).store(task.0, Ordering::Release);
    }

    /// Returns the task last recorded on `cpu`.
    pub fn get(&self, cpu: CpuId) -> Option<TaskId> {
        TaskId::from_raw(self.tasks.get_for(cpu).load(Ordering::Acquire))
    }

    /// Forgets the task recorded on `cpu`, e.g. when the CPU goes offline.
    pub fn clear(&self, cpu: CpuId) {
        self.tasks.get_for(cpu).store(TaskId::NONE_RAW, Ordering::Release);
    }

    /// Iterates over every CPU that has a task recorded.
    pub fn iter(&self) -> impl Iterator<Item = (CpuId, TaskId)> + '_ {
        self.tasks.iter().filter_map(|(cpu, raw)| {
            TaskId::from_raw(raw.load(Ordering::Relaxed)).map(|task| (cpu, task))
        })
    }
}

impl Default for RunningTasks {
    fn default() -> Self {
        Self::new()
    }
}
