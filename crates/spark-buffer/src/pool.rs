//! The buffer pool (spec §3.2, §4.3): a concurrent `SlabBufferPool` and a
//! single-threaded `LocalBufferPool`, both implementing one `BufferPool`
//! trait, plus the `PooledBuffer` wrapper and `BufferRecycler` reclaim
//! protocol that ties a leased buffer back to its owning pool on release.
//!
//! # 设计背景（Why）
//! 直接照搬教师仓库 `SlabBufferPool`/`PooledBuffer`/`BufferRecycler`/
//! `ReclaimedBuffer` 的角色划分（自由链表 + 原子计数 + 租约对象），但把自由
//! 链表里存放的内容从 `bytes::BytesMut` 换成 `SparkBuffer`（见 `buf` 模块的
//! 设计说明：只读写切片需要真正共享可变存储，`BytesMut` 的拆分式所有权模型
//! 做不到）。
//!
//! # 逻辑解析（How）
//! `acquire` 先在自由链表里找第一个容量 `>= requested_size` 的缓冲区（无尺寸
//! 分级，符合契约 "any capacity >= requested"）；找不到就按
//! `max(requested_size, default_buffer_size)` 新分配。`release`
//! （经由 `BufferRecycler::reclaim`）把缓冲区放回链表，超过 `max_pool_size`
//! 时直接丢弃，复用底层分配器的析构逻辑。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::buf::{Buffer, BufferFlavor, SparkBuffer};
use crate::error::{BufferError, Result};
use crate::order::ByteOrder;

/// Where a pool's backing allocations live (spec §4.3.2 "allocation zone").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationZone {
    #[default]
    Heap,
    Direct,
    Shared,
}

/// Pool construction knobs (ambient config surface — see SPEC_FULL.md §1).
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub default_buffer_size: usize,
    pub max_pool_size: usize,
    pub zone: AllocationZone,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            default_buffer_size: 4096,
            max_pool_size: 64,
            zone: AllocationZone::Heap,
        }
    }
}

/// Cumulative pool counters (spec §4.3.1 `stats()`); never reset by `clear`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total_allocations: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub current_pool_size: usize,
    pub peak_pool_size: usize,
}

/// Receives a leased buffer back when its `PooledBuffer` wrapper is released
/// or dropped.
pub trait BufferRecycler: Send + Sync {
    fn reclaim(&self, reclaimed: ReclaimedBuffer);
}

/// What a `PooledBuffer` hands back to its recycler on release.
pub struct ReclaimedBuffer {
    capacity: usize,
    buffer: Option<SparkBuffer>,
}

impl ReclaimedBuffer {
    pub fn new(capacity: usize, buffer: Option<SparkBuffer>) -> Self {
        ReclaimedBuffer { capacity, buffer }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn into_buffer(self) -> Option<SparkBuffer> {
        self.buffer
    }
}

/// The pool-tracked wrapper of spec §3.2: delegates every `Buffer` operation
/// to the inner buffer, except that its explicit `release` returns the inner
/// buffer to the pool exactly once. Using it after release fails every
/// `Buffer` method with `BufferError::Closed`.
pub struct PooledBuffer {
    inner: Option<SparkBuffer>,
    recycler: Arc<dyn BufferRecycler>,
    capacity: usize,
    released: bool,
}

impl PooledBuffer {
    pub fn new(inner: SparkBuffer, recycler: Arc<dyn BufferRecycler>) -> Self {
        let capacity = inner.capacity();
        PooledBuffer {
            inner: Some(inner),
            recycler,
            capacity,
            released: false,
        }
    }

    /// Returns the inner buffer to the pool. Idempotent: a second call is a
    /// no-op (spec "double release is a no-op"). Takes `&mut self` rather
    /// than consuming `self` so that a use *after* release on the same
    /// binding observably fails with `BufferError::Closed` (spec "use after
    /// release") instead of being rejected at compile time by the borrow
    /// checker, which would hide the runtime contract the spec describes.
    pub fn release(&mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(buf) = self.inner.take() {
            self.recycler.reclaim(ReclaimedBuffer::new(self.capacity, Some(buf)));
        }
    }

    fn require(&self) -> Result<&SparkBuffer> {
        self.inner.as_ref().ok_or(BufferError::Closed)
    }

    fn require_mut(&mut self) -> Result<&mut SparkBuffer> {
        self.inner.as_mut().ok_or(BufferError::Closed)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.do_release();
    }
}

impl Buffer for PooledBuffer {
    fn capacity(&self) -> usize {
        self.inner.as_ref().map(Buffer::capacity).unwrap_or(0)
    }

    fn position(&self) -> usize {
        self.inner.as_ref().map(Buffer::position).unwrap_or(0)
    }

    fn limit(&self) -> usize {
        self.inner.as_ref().map(Buffer::limit).unwrap_or(0)
    }

    fn order(&self) -> ByteOrder {
        self.inner.as_ref().map(Buffer::order).unwrap_or_default()
    }

    fn set_order(&mut self, order: ByteOrder) {
        if let Some(inner) = self.inner.as_mut() {
            inner.set_order(order);
        }
    }

    fn is_read_only(&self) -> bool {
        self.inner.as_ref().map(Buffer::is_read_only).unwrap_or(true)
    }

    fn flavor(&self) -> BufferFlavor {
        self.inner.as_ref().map(Buffer::flavor).unwrap_or(BufferFlavor::Managed)
    }

    fn set_position(&mut self, pos: usize) -> Result<()> {
        self.require_mut()?.set_position(pos)
    }

    fn set_limit(&mut self, limit: usize) -> Result<()> {
        self.require_mut()?.set_limit(limit)
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        self.require_mut()?.advance(n)
    }

    fn chunk(&self) -> &[u8] {
        self.inner.as_ref().map(Buffer::chunk).unwrap_or(&[])
    }

    fn chunk_mut(&mut self) -> Result<&mut [u8]> {
        self.require_mut()?.chunk_mut()
    }

    fn get_raw(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.require()?.get_raw(index, dst)
    }

    fn put_raw(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.require_mut()?.put_raw(index, src)
    }

    fn slice(&self) -> Result<SparkBuffer> {
        self.require()?.slice()
    }

    fn raw_base_ptr(&self) -> Option<*const u8> {
        self.inner.as_ref().and_then(Buffer::raw_base_ptr)
    }
}

/// One trait shared by the single-threaded and concurrent pool variants
/// (spec §4.3.2 "expose two concrete pool types implementing one trait").
/// Intentionally has no `Send + Sync` supertrait bound, so a thread-confined
/// implementation isn't forced to pretend otherwise.
pub trait BufferPool {
    fn acquire(&self, requested_size: usize) -> Result<PooledBuffer>;
    fn clear(&self) -> usize;
    fn stats(&self) -> PoolStats;
}

fn allocate_for_zone(zone: AllocationZone, size: usize) -> SparkBuffer {
    match zone {
        AllocationZone::Direct => SparkBuffer::allocate_native(size),
        AllocationZone::Heap | AllocationZone::Shared => SparkBuffer::allocate(size),
    }
}

/// The multi-threaded pool variant: mutex-protected free list, atomic
/// counters. Internal synchronization guarantees the atomicity of `acquire`,
/// `release`, `clear`, and `stats` required by spec §5.
#[derive(Clone)]
pub struct SlabBufferPool {
    inner: Arc<SlabInner>,
}

struct SlabInner {
    free_list: Mutex<Vec<SparkBuffer>>,
    options: PoolOptions,
    total_allocations: AtomicU64,
    pool_hits: AtomicU64,
    pool_misses: AtomicU64,
    peak_pool_size: AtomicUsize,
}

impl SlabBufferPool {
    pub fn new() -> Self {
        Self::with_options(PoolOptions::default())
    }

    pub fn with_options(options: PoolOptions) -> Self {
        SlabBufferPool {
            inner: Arc::new(SlabInner {
                free_list: Mutex::new(Vec::new()),
                options,
                total_allocations: AtomicU64::new(0),
                pool_hits: AtomicU64::new(0),
                pool_misses: AtomicU64::new(0),
                peak_pool_size: AtomicUsize::new(0),
            }),
        }
    }
}

impl Default for SlabBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool for SlabBufferPool {
    fn acquire(&self, requested_size: usize) -> Result<PooledBuffer> {
        let mut buffer = {
            let mut free = self.inner.free_list.lock();
            let found = free.iter().position(|b| b.capacity() >= requested_size);
            match found {
                Some(idx) => {
                    self.inner.pool_hits.fetch_add(1, Ordering::Relaxed);
                    free.swap_remove(idx)
                }
                None => {
                    drop(free);
                    self.inner.pool_misses.fetch_add(1, Ordering::Relaxed);
                    let size = requested_size.max(self.inner.options.default_buffer_size);
                    allocate_for_zone(self.inner.options.zone, size)
                }
            }
        };
        self.inner.total_allocations.fetch_add(1, Ordering::Relaxed);
        buffer.reset_for_write()?;
        #[cfg(feature = "tracing-logs")]
        tracing::debug!(capacity = buffer.capacity(), "spark-buffer: pool acquire");
        let recycler: Arc<dyn BufferRecycler> = self.inner.clone();
        Ok(PooledBuffer::new(buffer, recycler))
    }

    fn clear(&self) -> usize {
        let mut total = 0usize;
        loop {
            let next = self.inner.free_list.lock().pop();
            match next {
                Some(buf) => total += buf.capacity(),
                None => break,
            }
        }
        total
    }

    fn stats(&self) -> PoolStats {
        let current_pool_size = self.inner.free_list.lock().len();
        PoolStats {
            total_allocations: self.inner.total_allocations.load(Ordering::Relaxed),
            pool_hits: self.inner.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.inner.pool_misses.load(Ordering::Relaxed),
            current_pool_size,
            peak_pool_size: self.inner.peak_pool_size.load(Ordering::Relaxed),
        }
    }
}

impl BufferRecycler for SlabInner {
    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        if let Some(buf) = reclaimed.into_buffer() {
            let mut free = self.free_list.lock();
            if free.len() < self.options.max_pool_size {
                free.push(buf);
                let len = free.len();
                drop(free);
                self.peak_pool_size.fetch_max(len, Ordering::Relaxed);
            }
        }
    }
}

/// The single-threaded pool variant (spec §4.3.2 "simple stack/deque; no
/// synchronization"). Uses plain `Cell`/`UnsafeCell` state instead of atomics
/// or a mutex; soundness relies on the same single-logical-owner discipline
/// documented on `SharedBytes` in the `buf` module, asserted here via a
/// manual `Send + Sync` impl exactly like the teacher's `PooledBuffer`.
pub struct LocalBufferPool {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    free_list: UnsafeCell<Vec<SparkBuffer>>,
    options: PoolOptions,
    total_allocations: Cell<u64>,
    pool_hits: Cell<u64>,
    pool_misses: Cell<u64>,
    peak_pool_size: Cell<usize>,
}

// SAFETY: `LocalBufferPool` is documented as thread-confined; callers must
// not share it across threads despite the `Send + Sync` impl existing (it
// exists only so `PooledBuffer`'s `Arc<dyn BufferRecycler>` field type-checks
// for both pool variants uniformly).
unsafe impl Send for LocalInner {}
unsafe impl Sync for LocalInner {}

impl LocalBufferPool {
    pub fn new() -> Self {
        Self::with_options(PoolOptions::default())
    }

    pub fn with_options(options: PoolOptions) -> Self {
        LocalBufferPool {
            inner: Arc::new(LocalInner {
                free_list: UnsafeCell::new(Vec::new()),
                options,
                total_allocations: Cell::new(0),
                pool_hits: Cell::new(0),
                pool_misses: Cell::new(0),
                peak_pool_size: Cell::new(0),
            }),
        }
    }

    // SAFETY: see `LocalInner`'s Send/Sync justification; exclusive access
    // is the caller's (single-thread) responsibility.
    #[allow(clippy::mut_from_ref)]
    fn free_list(&self) -> &mut Vec<SparkBuffer> {
        unsafe { &mut *self.inner.free_list.get() }
    }
}

impl Default for LocalBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool for LocalBufferPool {
    fn acquire(&self, requested_size: usize) -> Result<PooledBuffer> {
        let free = self.free_list();
        let found = free.iter().position(|b| b.capacity() >= requested_size);
        let mut buffer = match found {
            Some(idx) => {
                self.inner.pool_hits.set(self.inner.pool_hits.get() + 1);
                free.swap_remove(idx)
            }
            None => {
                self.inner.pool_misses.set(self.inner.pool_misses.get() + 1);
                let size = requested_size.max(self.inner.options.default_buffer_size);
                allocate_for_zone(self.inner.options.zone, size)
            }
        };
        self.inner
            .total_allocations
            .set(self.inner.total_allocations.get() + 1);
        buffer.reset_for_write()?;
        let recycler: Arc<dyn BufferRecycler> = self.inner.clone();
        Ok(PooledBuffer::new(buffer, recycler))
    }

    fn clear(&self) -> usize {
        let free = self.free_list();
        let total: usize = free.iter().map(|b| b.capacity()).sum();
        free.clear();
        total
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total_allocations: self.inner.total_allocations.get(),
            pool_hits: self.inner.pool_hits.get(),
            pool_misses: self.inner.pool_misses.get(),
            current_pool_size: self.free_list().len(),
            peak_pool_size: self.inner.peak_pool_size.get(),
        }
    }
}

impl BufferRecycler for LocalInner {
    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        if let Some(buf) = reclaimed.into_buffer() {
            // SAFETY: see `LocalInner`'s Send/Sync justification.
            let free = unsafe { &mut *self.free_list.get() };
            if free.len() < self.options.max_pool_size {
                free.push(buf);
                self.peak_pool_size.set(self.peak_pool_size.get().max(free.len()));
            }
        }
    }
}

/// Acquires a buffer, runs `f`, and releases on every exit path including
/// panics (spec §4.3.3 `withBuffer`).
pub fn with_buffer<P, R>(pool: &P, size: usize, f: impl FnOnce(&mut PooledBuffer) -> R) -> Result<R>
where
    P: BufferPool,
{
    let mut buffer = pool.acquire(size)?;
    let result = f(&mut buffer);
    buffer.release();
    Ok(result)
}

/// Constructs a pool, runs `f`, then `clear()`s it on every exit path (spec
/// §4.3.3 `withPool`).
pub fn with_pool<P, R>(pool: P, f: impl FnOnce(&P) -> R) -> R
where
    P: BufferPool,
{
    let result = f(&pool);
    pool.clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reusable_capacity_returns_to_pool() {
        let pool = SlabBufferPool::new();
        {
            let mut writable = pool.acquire(64).expect("acquire 应当成功");
            assert!(writable.capacity() >= 64);
            writable.write_u32(0x0102_0304).expect("写入应在容量范围内");
        }
        let snapshot = pool.stats();
        assert!(snapshot.current_pool_size >= 1);
        {
            let _second = pool.acquire(16).expect("第二次 acquire 应复用空闲链表");
        }
        let after = pool.stats();
        assert!(after.total_allocations >= snapshot.total_allocations);
    }

    #[test]
    fn pool_hit_scenario_e2() {
        let pool = SlabBufferPool::with_options(PoolOptions {
            default_buffer_size: 1024,
            max_pool_size: 4,
            zone: AllocationZone::Heap,
        });
        let first = pool.acquire(512).expect("首次 acquire 应当成功");
        drop(first);
        let _second = pool.acquire(512).expect("第二次 acquire 应命中空闲链表");
        let stats = pool.stats();
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 1);
    }

    #[test]
    fn counter_identity_law_10() {
        let pool = SlabBufferPool::new();
        for _ in 0..5 {
            let _b = pool.acquire(32).expect("acquire 应当成功");
        }
        let stats = pool.stats();
        assert_eq!(stats.pool_hits + stats.pool_misses, stats.total_allocations);
    }

    #[test]
    fn release_is_idempotent() {
        let pool = SlabBufferPool::new();
        let mut buffer = pool.acquire(16).expect("acquire 应当成功");
        buffer.release();
        let stats = pool.stats();
        assert_eq!(stats.current_pool_size, 1);
    }

    #[test]
    fn acquired_buffer_is_reset_for_write() {
        let pool = SlabBufferPool::new();
        let buffer = pool.acquire(16).expect("acquire 应当成功");
        assert_eq!(buffer.position(), 0);
        assert!(buffer.capacity() >= 16);
    }

    #[test]
    fn clear_releases_cached_buffers() {
        let pool = SlabBufferPool::new();
        let cached_capacity = {
            let buffer = pool.acquire(48).expect("acquire 应当成功");
            buffer.capacity()
        };
        let reclaimed = pool.clear();
        assert!(reclaimed >= cached_capacity);
        assert_eq!(pool.stats().current_pool_size, 0);
    }

    #[test]
    fn local_pool_mirrors_concurrent_pool_semantics() {
        let pool = LocalBufferPool::new();
        {
            let _b = pool.acquire(64).expect("acquire 应当成功");
        }
        let stats = pool.stats();
        assert_eq!(stats.total_allocations, 1);
        assert_eq!(stats.pool_misses, 1);
        let _b2 = pool.acquire(16).expect("第二次 acquire 应命中空闲链表");
        assert_eq!(pool.stats().pool_hits, 1);
    }

    #[test]
    fn with_buffer_releases_on_every_exit_path() {
        let pool = SlabBufferPool::new();
        let _ = with_buffer(&pool, 32, |buf| {
            buf.write_u8(1).unwrap();
        });
        assert_eq!(pool.stats().current_pool_size, 1);
    }
}
