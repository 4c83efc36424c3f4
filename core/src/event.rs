//! Event headers and event references.
//!
//! An event is a signal plus, for dynamic events, a payload that lives in
//! a pool block directly behind the header.  Events move between producers
//! and queues as [`EventRef`] handles; the header's reference count is the
//! single source of truth for liveness.
//!
//! Two event classes exist:
//!
//! - **Static** events (`pool_id == 0`) are `const`-constructed, typically
//!   held in `static`s, never recycled.  Timers embed one.
//! - **Dynamic** events come from a registered pool (see
//!   [`pool`](crate::pool)), carry their origin pool id, and return to it
//!   when the last reference is dropped.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::Signal;

/// Marker for events that were never allocated from a pool.
pub const STATIC_POOL_ID: u8 = 0;

/// Event header.
///
/// For dynamic events the header is the first field of the pool block and
/// the payload follows it (8-aligned).  Static events are header-only.
#[repr(C)]
#[derive(Debug)]
pub struct Event {
    signal: Signal,
    pool_id: u8,
    /// Number of live references: queue slots plus producer/in-dispatch
    /// holders.  Always zero for static events.
    refcount: AtomicU8,
}

impl Event {
    /// A static, never-recycled event.  Usable in `static` items.
    pub const fn new(signal: Signal) -> Self {
        Self {
            signal,
            pool_id: STATIC_POOL_ID,
            refcount: AtomicU8::new(0),
        }
    }

    /// Header for a freshly allocated dynamic event.  The producer holds
    /// the initial reference.
    pub(crate) fn dynamic(signal: Signal, pool_id: u8) -> Self {
        Self {
            signal,
            pool_id,
            refcount: AtomicU8::new(1),
        }
    }

    #[inline]
    pub fn signal(&self) -> Signal {
        self.signal
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.pool_id == STATIC_POOL_ID
    }

    /// Origin pool id; [`STATIC_POOL_ID`] for static events.
    #[inline]
    pub fn pool_id(&self) -> u8 {
        self.pool_id
    }

    /// Current reference count.  Racy outside the critical section; use
    /// for diagnostics and tests.
    #[inline]
    pub fn refcount(&self) -> u8 {
        self.refcount.load(Ordering::Relaxed)
    }

    /// Add one reference.  Caller must hold the critical section.
    #[inline]
    pub(crate) fn retain(&self) {
        let prev = self.refcount.fetch_add(1, Ordering::Relaxed);
        if prev == u8::MAX {
            crate::framework::assert_failed(file!(), line!());
        }
    }

    /// Drop one reference; returns the remaining count.  Caller must hold
    /// the critical section and must not call this on a static event.
    #[inline]
    pub(crate) fn release(&self) -> u8 {
        let prev = self.refcount.fetch_sub(1, Ordering::Relaxed);
        if prev == 0 {
            crate::framework::assert_failed(file!(), line!());
        }
        prev - 1
    }
}

/// Byte offset of a payload with the given alignment behind the header.
#[inline]
pub(crate) const fn payload_offset(align: usize) -> usize {
    (size_of::<Event>() + align - 1) & !(align - 1)
}

/// Copyable handle to an event in transit.
///
/// The handle does not own a reference by itself; reference accounting is
/// performed by the operations that move it (post, recycle).  Dereferencing
/// is safe for static events (they live forever) and for dynamic events
/// while the holder owns at least one counted reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRef {
    ptr: *const Event,
}

// SAFETY: an EventRef is just an address; the framework's reference
// protocol (count held while the handle is in a queue or in dispatch)
// keeps the pointee alive across context handoff.
unsafe impl Send for EventRef {}
unsafe impl Sync for EventRef {}

impl EventRef {
    /// Handle to a static event.
    #[inline]
    pub fn of(evt: &'static Event) -> Self {
        Self { ptr: evt }
    }

    /// Handle to a pool block.  Caller guarantees `ptr` addresses a live,
    /// initialized event header.
    #[inline]
    pub(crate) unsafe fn from_raw(ptr: *const Event) -> Self {
        Self { ptr }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const Event {
        self.ptr
    }

    /// Borrow the event header.
    #[inline]
    pub fn event(&self) -> &Event {
        // SAFETY: see the Send/Sync justification — a handle is only held
        // while the reference protocol keeps the event alive.
        unsafe { &*self.ptr }
    }

    #[inline]
    pub fn signal(&self) -> Signal {
        self.event().signal()
    }

    /// Borrow the typed payload of a dynamic event.
    ///
    /// The caller matches `T` to the event's signal by application
    /// convention, exactly as it chose `T` at allocation time.  Static
    /// events carry no payload.
    #[inline]
    pub fn payload<T: Copy>(&self) -> &T {
        let evt = self.event();
        if evt.is_static() {
            crate::framework::assert_failed(file!(), line!());
        }
        debug_assert!(align_of::<T>() <= 8, "payload alignment above 8");
        // SAFETY: dynamic events are allocated with room for the payload
        // at this offset (checked in `new_event_with`), and the block is
        // 8-aligned.
        unsafe {
            &*(self.ptr as *const u8)
                .add(payload_offset(align_of::<T>()))
                .cast::<T>()
        }
    }

    /// Address equality (same underlying event).
    #[inline]
    pub fn same_event(&self, other: &EventRef) -> bool {
        core::ptr::eq(self.ptr, other.ptr)
    }
}
