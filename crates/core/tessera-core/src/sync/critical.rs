//! Kernel-wide critical section with migrating ownership.
//!
//! The lock is held by a CPU, not by a guard object: a task enters it,
//! may be switched out at a trap while still holding it, and later resumes
//! (possibly on another CPU) expecting to hold it again at the same depth.
//! The trap path calls [`CriticalSection::restore`] for every task it
//! switches to so that the lock always follows the task that owns it.
//!
//! Owner and depth live in one `AtomicU64` (owner in the high word, depth
//! in the low word) so that no observer can ever see a nonzero depth
//! without an owner, or an owner with a zero depth.

use crate::id::CpuId;
use crate::task::Tcb;

use super::loom_compat::{AtomicU64, Ordering, spin_loop};

/// Packed state of a free lock.
const FREE: u64 = pack(CpuId::NONE_RAW, 0);

const fn pack(owner: u32, depth: u32) -> u64 {
    ((owner as u64) << 32) | depth as u64
}

#[allow(clippy::cast_possible_truncation, reason = "halves of a packed u64")]
const fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

fn nest(cpu: CpuId, depth: u32) -> u32 {
    depth
        .checked_add(1)
        .unwrap_or_else(|| panic!("critical section depth overflow on cpu {cpu}"))
}

/// The kernel-wide, CPU-owned, recursive critical section.
///
/// At most one CPU holds it at a time. The holder may nest entries; the
/// nesting depth is mirrored into the running task's
/// [`CriticalState`](crate::task::CriticalState) so it can be reinstated
/// when the task resumes.
pub struct CriticalSection {
    state: AtomicU64,
}

impl CriticalSection {
    /// Creates a free critical section.
    #[cfg(not(all(test, any(loom, shuttle))))]
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(FREE),
        }
    }

    /// Creates a free critical section.
    #[cfg(all(test, any(loom, shuttle)))]
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(FREE),
        }
    }

    /// Returns the holding CPU and nesting depth, or `None` if free.
    pub fn holder(&self) -> Option<(CpuId, u32)> {
        let (owner, depth) = unpack(self.state.load(Ordering::Acquire));
        CpuId::from_raw(owner).map(|cpu| (cpu, depth))
    }

    /// Returns `true` if `cpu` currently holds the lock.
    pub fn is_held_by(&self, cpu: CpuId) -> bool {
        self.holder().is_some_and(|(owner, _)| owner == cpu)
    }

    /// Returns the current nesting depth, zero when free.
    pub fn depth(&self) -> u32 {
        unpack(self.state.load(Ordering::Acquire)).1
    }

    /// Enters the critical section on `cpu` on behalf of `task`.
    ///
    /// Nests if `cpu` already holds it, otherwise spins until it is free.
    /// Returns the new depth.
    ///
    /// # Panics
    ///
    /// Panics if the depth would overflow.
    pub fn enter(&self, cpu: CpuId, task: &Tcb) -> u32 {
        let depth = self.take(cpu, |held| held.map_or(1, |depth| nest(cpu, depth)));
        task.critical().record(cpu, depth);
        depth
    }

    /// Enters the critical section only if no other CPU holds it.
    ///
    /// Returns the new depth, or `None` if another CPU is the holder.
    ///
    /// # Panics
    ///
    /// Panics if the depth would overflow, like [`enter`](Self::enter).
    pub fn try_enter(&self, cpu: CpuId, task: &Tcb) -> Option<u32> {
        loop {
            let current = self.state.load(Ordering::Relaxed);
            let (owner, depth) = unpack(current);
            let next = if owner == cpu.as_u32() {
                nest(cpu, depth)
            } else if owner == CpuId::NONE_RAW {
                1
            } else {
                return None;
            };
            if self
                .state
                .compare_exchange(
                    current,
                    pack(cpu.as_u32(), next),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                task.critical().record(cpu, next);
                return Some(next);
            }
        }
    }

    /// Leaves one level of the critical section held by `cpu`.
    ///
    /// Releases the lock when the depth reaches zero. Returns the new depth.
    ///
    /// # Panics
    ///
    /// Panics if `cpu` does not hold the lock. Leaving a lock you do not
    /// hold means the kernel's lock bookkeeping is already corrupt.
    pub fn leave(&self, cpu: CpuId, task: &Tcb) -> u32 {
        let (owner, depth) = unpack(self.state.load(Ordering::Relaxed));
        if owner != cpu.as_u32() || depth == 0 {
            panic!(
                "critical section left on cpu {cpu} by task {} but held by {:?}",
                task.id(),
                CpuId::from_raw(owner),
            );
        }

        // Only the holder writes while the lock is held, so a plain store
        // cannot lose another CPU's update.
        let next = depth - 1;
        let state = if next == 0 {
            FREE
        } else {
            pack(cpu.as_u32(), next)
        };
        self.state.store(state, Ordering::Release);
        task.critical().record(cpu, next);
        next
    }

    /// Reinstates the lock state `task` held when it last ran, on `cpu`.
    ///
    /// - Task did not hold it: release it if `cpu` holds it on behalf of
    ///   the outgoing task, otherwise leave it alone.
    /// - Task held it at depth N: take it for `cpu` at depth N, spinning
    ///   while another CPU holds it.
    pub fn restore(&self, task: &Tcb, cpu: CpuId) {
        let want = task.critical().depth();
        if want == 0 {
            self.release_held_by(cpu);
        } else {
            self.take(cpu, |_| want);
        }
        task.critical().record(cpu, want);
    }

    /// Drops any hold `cpu` has, whatever its depth, without touching task
    /// records. Returns `true` if `cpu` was the holder.
    ///
    /// Used when the task that held the lock on `cpu` has been switched out
    /// and the trap continues on another CPU.
    pub fn release_held_by(&self, cpu: CpuId) -> bool {
        let (owner, _) = unpack(self.state.load(Ordering::Relaxed));
        // Only the holder writes while the lock is held.
        if owner == cpu.as_u32() {
            self.state.store(FREE, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Takes the lock for `cpu` and sets its depth to `next(held)`, where
    /// `held` is the current depth if `cpu` already holds it.
    fn take(&self, cpu: CpuId, next: impl Fn(Option<u32>) -> u32) -> u32 {
        let me = cpu.as_u32();
        loop {
            let current = self.state.load(Ordering::Relaxed);
            let (owner, depth) = unpack(current);
            let held = if owner == me {
                Some(depth)
            } else if owner == CpuId::NONE_RAW {
                None
            } else {
                // TTAS: wait on a plain load until the holder lets go.
                while unpack(self.state.load(Ordering::Relaxed)).0 == owner {
                    spin_loop();
                }
                continue;
            };

            let depth = next(held);
            if self
                .state
                .compare_exchange_weak(
                    current,
                    pack(me, depth),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return depth;
            }
        }
    }
}

#[cfg(not(all(test, any(loom, shuttle))))]
impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}
