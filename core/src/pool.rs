//! Fixed-block event pools.
//!
//! Dynamic events are carved out of caller-provided storage regions, one
//! region per pool, every block in a region the same size.  Pools are
//! registered in ascending block-size order and allocation is strict
//! smallest-fit: the first pool whose block size covers the request serves
//! it, and if that pool is empty the allocation fails.  Larger pools are
//! **not** raided — that keeps per-size exhaustion independent and
//! fragmentation bounded.
//!
//! Free blocks are threaded into an intrusive list through their own first
//! word, so pool metadata is a few words regardless of block count.  All
//! list surgery happens under the framework critical section.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr;

use reflex_lib::CritCell;

use crate::config::{MAX_POOLS, Signal};
use crate::event::{Event, EventRef, payload_offset};
use crate::trace::{self, TraceRecord};

/// Backing storage for one event pool: `COUNT` blocks of `BLOCK` bytes.
///
/// Declared by the application, typically as a `static`, and handed to
/// [`register`] once.  The 8-byte alignment covers the event header, the
/// free-list link, and any payload with alignment up to 8.
#[repr(C, align(8))]
pub struct PoolStorage<const BLOCK: usize, const COUNT: usize> {
    blocks: UnsafeCell<[[u8; BLOCK]; COUNT]>,
}

// SAFETY: block bytes are only touched through the pool's allocation
// discipline — a block is either on the free list (framework-owned, under
// the critical section) or held by exactly one event producer/queue chain.
unsafe impl<const BLOCK: usize, const COUNT: usize> Sync for PoolStorage<BLOCK, COUNT> {}

impl<const BLOCK: usize, const COUNT: usize> PoolStorage<BLOCK, COUNT> {
    pub const fn new() -> Self {
        Self {
            blocks: UnsafeCell::new([[0u8; BLOCK]; COUNT]),
        }
    }

    /// The raw region descriptor handed to [`register`].
    pub fn region(&'static self) -> PoolRegion {
        PoolRegion {
            base: self.blocks.get() as *mut u8,
            block_size: BLOCK,
            count: COUNT,
        }
    }
}

impl<const BLOCK: usize, const COUNT: usize> Default for PoolStorage<BLOCK, COUNT> {
    fn default() -> Self {
        Self::new()
    }
}

/// A caller-provided pool region: base address, block size, block count.
#[derive(Clone, Copy, Debug)]
pub struct PoolRegion {
    pub(crate) base: *mut u8,
    pub(crate) block_size: usize,
    pub(crate) count: usize,
}

// SAFETY: the region only travels from registration into the registry,
// which is accessed under the critical section.
unsafe impl Send for PoolRegion {}

/// Pool and allocation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The registry already holds [`MAX_POOLS`] pools.
    RegistryFull,
    /// Block size below the framework minimum or not 8-aligned.
    BadBlockSize,
    /// Pools must be registered in strictly ascending block-size order.
    NotAscending,
    /// The best-fit pool has no free block (or no pool fits the request).
    OutOfMemory,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::RegistryFull => write!(f, "pool registry full"),
            PoolError::BadBlockSize => write!(f, "bad pool block size"),
            PoolError::NotAscending => write!(f, "pool block sizes must ascend"),
            PoolError::OutOfMemory => write!(f, "event pool exhausted"),
        }
    }
}

/// Smallest admissible block: must hold the free-list link and the event
/// header.
const MIN_BLOCK: usize = 8;

struct Pool {
    base: *mut u8,
    block_size: usize,
    count: usize,
    /// Head of the intrusive free list; null when exhausted.
    free_head: *mut u8,
    nfree: usize,
    /// Low-water mark of `nfree` since registration.
    nmin: usize,
}

// SAFETY: pools live inside the registry CritCell; every access holds the
// critical section.
unsafe impl Send for Pool {}

impl Pool {
    /// Thread all blocks into the free list: `0 → 1 → … → count-1 → ∅`.
    fn build_free_list(&mut self) {
        let mut head: *mut u8 = ptr::null_mut();
        let mut i = self.count;
        while i > 0 {
            i -= 1;
            // SAFETY: `i < count`, so the block address is inside the
            // registered region; free blocks store the next link in their
            // first word (the region is 8-aligned, block sizes are
            // 8-multiples).
            unsafe {
                let block = self.base.add(i * self.block_size);
                block.cast::<*mut u8>().write(head);
                head = block;
            }
        }
        self.free_head = head;
        self.nfree = self.count;
        self.nmin = self.count;
    }

    fn pop_block(&mut self) -> Option<*mut u8> {
        if self.free_head.is_null() {
            return None;
        }
        let block = self.free_head;
        // SAFETY: `block` came off the free list, so its first word is a
        // valid next link written by `build_free_list` or `push_block`.
        self.free_head = unsafe { block.cast::<*mut u8>().read() };
        self.nfree -= 1;
        if self.nfree < self.nmin {
            self.nmin = self.nfree;
        }
        Some(block)
    }

    fn push_block(&mut self, block: *mut u8) {
        // SAFETY: the block belongs to this pool (checked by pool id) and
        // is no longer referenced; reusing its first word as the link is
        // the free-list representation.
        unsafe {
            block.cast::<*mut u8>().write(self.free_head);
        }
        self.free_head = block;
        self.nfree += 1;
    }
}

struct PoolRegistry {
    pools: [Option<Pool>; MAX_POOLS],
    len: usize,
}

static POOLS: CritCell<PoolRegistry> = CritCell::new(PoolRegistry {
    pools: [const { None }; MAX_POOLS],
    len: 0,
});

/// Register a pool region.  Returns the 1-based pool id.
///
/// Regions must arrive in strictly ascending block-size order; block sizes
/// must be 8-multiples of at least [`MIN_BLOCK`] bytes.
pub fn register(region: PoolRegion) -> Result<u8, PoolError> {
    let registered = POOLS.with(|reg| {
        if reg.len >= MAX_POOLS {
            return Err(PoolError::RegistryFull);
        }
        if region.block_size < MIN_BLOCK || region.block_size % 8 != 0 {
            return Err(PoolError::BadBlockSize);
        }
        if let Some(prev) = reg.pools[..reg.len].last().and_then(|p| p.as_ref()) {
            if region.block_size <= prev.block_size {
                return Err(PoolError::NotAscending);
            }
        }
        let mut pool = Pool {
            base: region.base,
            block_size: region.block_size,
            count: region.count,
            free_head: ptr::null_mut(),
            nfree: 0,
            nmin: 0,
        };
        pool.build_free_list();
        let id = reg.len as u8 + 1;
        reg.pools[reg.len] = Some(pool);
        reg.len += 1;
        Ok((id, region.block_size, region.count))
    })?;

    let (id, block_size, count) = registered;
    trace::emit(&TraceRecord::PoolRegistered {
        pool: id,
        block_size,
        count,
    });
    Ok(id)
}

/// Allocate a block of at least `size` bytes and initialize the event
/// header.  Strict smallest-fit, no fallback.
fn alloc_block(signal: Signal, size: usize) -> Result<EventRef, PoolError> {
    let result = POOLS.with(|reg| {
        for (idx, slot) in reg.pools[..reg.len].iter_mut().enumerate() {
            let Some(pool) = slot.as_mut() else { continue };
            if pool.block_size < size {
                continue;
            }
            let pool_id = idx as u8 + 1;
            return match pool.pop_block() {
                Some(block) => {
                    let header = block.cast::<Event>();
                    // SAFETY: the block is exclusively ours and large
                    // enough for the header (block_size >= MIN_BLOCK).
                    unsafe {
                        header.write(Event::dynamic(signal, pool_id));
                    }
                    // SAFETY: header was just initialized.
                    Ok(unsafe { EventRef::from_raw(header) })
                }
                None => Err((PoolError::OutOfMemory, Some(pool_id))),
            };
        }
        Err((PoolError::OutOfMemory, None))
    });

    match result {
        Ok(evt) => {
            trace::emit(&TraceRecord::EvtAllocated {
                signal,
                pool: evt.event().pool_id(),
            });
            Ok(evt)
        }
        Err((err, pool)) => {
            trace::emit(&TraceRecord::EvtExhausted { pool, size });
            Err(err)
        }
    }
}

/// Allocate a payload-less dynamic event.
///
/// The returned reference is the producer's; post it as often as needed,
/// then [`recycle`] it.
pub fn new_event(signal: Signal) -> Result<EventRef, PoolError> {
    alloc_block(signal, size_of::<Event>())
}

/// Allocate a dynamic event carrying `payload` behind the header.
///
/// The payload type is the application's contract for the signal; consume
/// it with [`EventRef::payload`].  Alignments above 8 are not supported by
/// the block layout.
pub fn new_event_with<T: Copy>(signal: Signal, payload: T) -> Result<EventRef, PoolError> {
    debug_assert!(align_of::<T>() <= 8, "payload alignment above 8");
    let offset = payload_offset(align_of::<T>());
    let evt = alloc_block(signal, offset + size_of::<T>())?;
    // SAFETY: the block is exclusively the producer's until first post,
    // and `alloc_block` guaranteed room for the payload at `offset`.
    unsafe {
        (evt.as_ptr() as *mut u8).add(offset).cast::<T>().write(payload);
    }
    Ok(evt)
}

/// Drop one reference to the event.
///
/// Static events ignore the call.  When a dynamic event's count reaches
/// zero its block returns to the origin pool.
pub fn recycle(evt: EventRef) {
    let header = evt.event();
    if header.is_static() {
        return;
    }
    let signal = header.signal();
    let pool_id = header.pool_id();
    let refs_left = POOLS.with(|reg| {
        let left = header.release();
        if left == 0 {
            let idx = pool_id as usize - 1;
            match reg.pools.get_mut(idx).and_then(|p| p.as_mut()) {
                Some(pool) => pool.push_block(evt.as_ptr() as *mut u8),
                None => crate::framework::assert_failed(file!(), line!()),
            }
        }
        left
    });
    trace::emit(&TraceRecord::EvtRecycled {
        signal,
        pool: pool_id,
        refs_left,
    });
}

/// Total blocks in the pool, free or not.
pub fn pool_block_count(pool_id: u8) -> Option<usize> {
    pool_stat(pool_id, |p| p.count)
}

/// Currently free blocks.
pub fn pool_free_count(pool_id: u8) -> Option<usize> {
    pool_stat(pool_id, |p| p.nfree)
}

/// Lowest free count observed since registration.
pub fn pool_min_free(pool_id: u8) -> Option<usize> {
    pool_stat(pool_id, |p| p.nmin)
}

fn pool_stat(pool_id: u8, f: impl Fn(&Pool) -> usize) -> Option<usize> {
    if pool_id == 0 {
        return None;
    }
    POOLS.with(|reg| {
        reg.pools
            .get(pool_id as usize - 1)
            .and_then(|p| p.as_ref())
            .map(&f)
    })
}

/// Number of registered pools.
pub fn pool_count() -> usize {
    POOLS.with(|reg| reg.len)
}

/// Forget all pools.  Outstanding dynamic events become invalid; callers
/// (framework re-init, test fixtures) guarantee none exist.
pub(crate) fn reset() {
    POOLS.with(|reg| {
        reg.pools = [const { None }; MAX_POOLS];
        reg.len = 0;
    });
}
