//! Type-safe identifiers used on the trap-return path.
//!
//! These newtypes keep CPU indices, task identities and address-space
//! descriptors from being mixed up at compile time. Each has a raw
//! sentinel used by the atomic per-CPU tables to encode "none".

use core::fmt;

/// Logical CPU identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(u32);

impl CpuId {
    /// Raw value reserved for "no CPU" in packed atomic state.
    pub const NONE_RAW: u32 = u32::MAX;

    /// The bootstrap processor.
    pub const BOOT: Self = Self(0);

    /// Creates a new `CpuId`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the value as `usize` for indexing per-CPU tables.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Decodes a raw value, mapping [`Self::NONE_RAW`] to `None`.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == Self::NONE_RAW {
            None
        } else {
            Some(Self(raw))
        }
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique task identifier, assigned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Raw value reserved for "no task" in atomic registries.
    pub const NONE_RAW: u64 = u64::MAX;

    /// Decodes a raw value, mapping [`Self::NONE_RAW`] to `None`.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        if raw == Self::NONE_RAW {
            None
        } else {
            Some(Self(raw))
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an address-environment descriptor (a user address space).
///
/// Kernel-only tasks have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AddrEnvId(u32);

impl AddrEnvId {
    /// Creates a new `AddrEnvId`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AddrEnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as{}", self.0)
    }
}
