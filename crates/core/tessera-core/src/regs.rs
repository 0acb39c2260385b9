//! Handles to saved register images.
//!
//! The trap entry glue saves a task's registers somewhere (on the kernel
//! stack or in the task control block) and hands the trap path the address
//! of that save area. The trap path never looks inside the image; it only
//! stores, compares and returns the handle. [`RegsHandle`] is that address
//! as a non-zero word so that "empty" can be encoded as `0` in the per-CPU
//! atomic slots.

use core::fmt;
use core::num::NonZeroUsize;

/// Opaque handle to a saved register image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RegsHandle(NonZeroUsize);

const _: () = assert!(size_of::<Option<RegsHandle>>() == size_of::<usize>());

impl RegsHandle {
    /// Creates a handle from a register save-area address.
    ///
    /// Returns `None` for a null address.
    pub const fn from_addr(addr: usize) -> Option<Self> {
        match NonZeroUsize::new(addr) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Creates a handle from a pointer to a register save area.
    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        Self::from_addr(ptr.expose_provenance())
    }

    /// Returns the save-area address.
    pub const fn addr(self) -> usize {
        self.0.get()
    }

    /// Returns the save area as a raw pointer.
    ///
    /// The pointer is only meaningful to the architecture glue that created
    /// the handle.
    pub fn as_ptr<T>(self) -> *mut T {
        core::ptr::with_exposed_provenance_mut(self.0.get())
    }

    /// Encodes an optional handle into a word, with `0` meaning `None`.
    pub const fn encode(handle: Option<Self>) -> usize {
        match handle {
            Some(h) => h.0.get(),
            None => 0,
        }
    }

    /// Decodes a word produced by [`encode`](Self::encode).
    pub const fn decode(raw: usize) -> Option<Self> {
        Self::from_addr(raw)
    }
}

impl fmt::Debug for RegsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegsHandle({:#x})", self.0.get())
    }
}

impl fmt::Display for RegsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}
