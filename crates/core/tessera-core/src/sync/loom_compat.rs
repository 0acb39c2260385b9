//! Model-checker compatibility shim.
//!
//! Unit tests built with `--cfg loom` get loom's atomics and spin hint,
//! and tests built with `--cfg shuttle` get shuttle's atomics with a
//! cooperative yield as the spin hint. Every other build, including the
//! kernel, uses `core` directly. The swap only happens under `cfg(test)`
//! because both checkers are dev-dependencies.
//!
//! Model-checked atomics have no `const` constructors, so types built on
//! them provide a non-`const` `new` under the same cfg.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(all(test, loom))]
pub(crate) use loom::hint::spin_loop;
#[cfg(all(test, loom))]
pub(crate) use loom::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(test, shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Shuttle only switches threads at its own primitives; a bare spin would
/// never let the holder run.
#[cfg(all(test, shuttle, not(loom)))]
#[inline]
pub(crate) fn spin_loop() {
    shuttle::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(all(test, any(loom, shuttle))))]
pub(crate) use core::hint::spin_loop;
#[cfg(not(all(test, any(loom, shuttle))))]
pub(crate) use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
