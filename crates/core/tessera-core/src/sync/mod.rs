//! Synchronization primitives for the trap-return path.
//!
//! Provides the kernel-wide [`CriticalSection`], whose ownership is handed
//! from task to task across context switches, and the kernel's single
//! instance of it, [`KERNEL_CRITICAL`].

mod critical;

pub(crate) mod loom_compat;

pub use critical::CriticalSection;

/// The kernel-wide critical section protecting scheduler state.
#[cfg(not(all(test, any(loom, shuttle))))]
pub static KERNEL_CRITICAL: CriticalSection = CriticalSection::new();
