//! Wire format tag and the output-buffer `Allocator` interface (spec §3.4,
//! §6.1): every compress/decompress stream owns an allocator policy that
//! decides where its output buffers come from.

use std::sync::Arc;

use spark_buffer::buf::Buffer;
use spark_buffer::error::Result;
use spark_buffer::pool::BufferPool;
use spark_buffer::SparkBuffer;

/// Which wire format a stream speaks (spec §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    RawDeflate,
    Zlib,
    Gzip,
}

/// The output-allocator seam (spec §6.1): `fn allocate(size) -> ReadWriteBuffer`.
/// Object-safe so encoders/decoders can hold `Arc<dyn Allocator>` and accept
/// a user-supplied implementation at construction.
pub trait Allocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<Box<dyn Buffer>>;
}

/// Allocates plain heap-backed `SparkBuffer`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(SparkBuffer::allocate(size)))
    }
}

/// Allocates `Native`-flavored `SparkBuffer`s (spec's "direct-zone" variant).
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectAllocator;

impl Allocator for DirectAllocator {
    fn allocate(&self, size: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(SparkBuffer::allocate_native(size)))
    }
}

/// Allocates output buffers from a `BufferPool`, returning them wrapped in
/// their `PooledBuffer` so callers that hand the output on to a
/// `StreamProcessor` get automatic release-on-drop.
pub struct PoolAllocator<P: BufferPool + Send + Sync> {
    pool: Arc<P>,
}

impl<P: BufferPool + Send + Sync> PoolAllocator<P> {
    pub fn new(pool: Arc<P>) -> Self {
        PoolAllocator { pool }
    }
}

impl<P: BufferPool + Send + Sync> Allocator for PoolAllocator<P> {
    fn allocate(&self, size: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(self.pool.acquire(size)?))
    }
}
