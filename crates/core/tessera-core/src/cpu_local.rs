//! Fixed-size per-CPU storage.
//!
//! [`CpuLocal`] holds one `T` per possible CPU and is always indexed with
//! an explicit [`CpuId`]. The trap path re-derives the CPU identity from
//! the scheduler after a context switch, so there is no implicit
//! "current CPU" accessor here.

use crate::id::CpuId;

/// Maximum supported CPUs.
pub const MAX_CPUS: usize = 256;

const _: () = assert!(
    MAX_CPUS < CpuId::NONE_RAW as usize,
    "the none sentinel must not be a valid CPU index"
);

/// Per-CPU storage. Wraps `[T; MAX_CPUS]`, indexed by [`CpuId`].
pub struct CpuLocal<T> {
    data: [T; MAX_CPUS],
}

impl<T> CpuLocal<T> {
    /// Creates a new `CpuLocal` wrapping the given array.
    pub const fn new(data: [T; MAX_CPUS]) -> Self {
        Self { data }
    }

    /// Returns a reference to a specific CPU's instance.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= MAX_CPUS`.
    pub fn get_for(&self, cpu: CpuId) -> &T {
        &self.data[cpu.as_usize()]
    }

    /// Returns a reference to a CPU's instance, or `None` if out of range.
    pub fn try_get_for(&self, cpu: CpuId) -> Option<&T> {
        self.data.get(cpu.as_usize())
    }

    /// Iterates over every slot together with its CPU id.
    pub fn iter(&self) -> impl Iterator<Item = (CpuId, &T)> {
        self.data.iter().enumerate().map(|(i, v)| {
            #[allow(clippy::cast_possible_truncation, reason = "i < MAX_CPUS < u32::MAX")]
            let cpu = CpuId::new(i as u32);
            (cpu, v)
        })
    }
}
