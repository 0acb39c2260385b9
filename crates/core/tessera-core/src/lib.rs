//! Core types and the kernel-wide critical section for the Tessera kernel.
//!
//! This crate holds the host-testable leaves of the trap-return path:
//! CPU and task identifiers, per-CPU storage, saved-register handles, the
//! task control block fields the trap path touches, and the
//! [`CriticalSection`](sync::CriticalSection) lock whose ownership follows
//! tasks across context switches.
//!
//! Everything here builds with `cargo test` on the host, and the lock can
//! be model-checked with loom or shuttle (`--cfg loom` / `--cfg shuttle`).

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod cpu_local;
pub mod id;
pub mod log;
pub mod regs;
pub mod sync;
pub mod task;
