//! The `Buffer` contract: a positioned, limited, byte-ordered region over one
//! of five storage flavors, plus the single concrete implementation
//! `SparkBuffer`.
//!
//! # 设计背景（Why）
//! java.nio.ByteBuffer 式的游标模型（position/limit/capacity）天然需要绝对和
//! 相对两套标量读写、零拷贝切片以及跨存储风格（堆内存/原生地址/分片拼接/
//! 惰性变换）的统一契约。教师仓库把这一需求拆成 `ReadableBuffer` 与
//! `WritableBuffer` 两个只读/只写 trait；这里把它们合并回一个对象安全的
//! `Buffer` trait，因为本契约里"只读"只是运行期标志而非类型层面的区分——
//! 同一把游标在读配置和写配置之间切换（`reset_for_read`/`reset_for_write`）。
//!
//! # 契约说明（What）
//! `Buffer` 的必需方法只负责游标状态与"按绝对下标读写原始字节"；标量读写、
//! 相对/绝对两种形式、`read_bytes`/`write_buffer` 等组合操作都以 trait 默认
//! 方法的形式建在这些原语之上，风格上对应 `bytes::Buf` 用少量必需方法 + 大量
//! 默认方法覆盖全部标量类型的做法。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::UnsafeCell;

use crate::bulk;
use crate::error::{BufferError, Result};
use crate::order::ByteOrder;

/// Internal storage tag exposed for introspection and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFlavor {
    Managed,
    Native,
    Fragmented,
    Transformed,
    Slice,
}

/// Shared fixed-size byte storage behind `Arc`, written to only through a
/// scoped `unsafe` in `Core::put_raw`/`chunk_mut`.
///
/// # 设计考量（Trade-offs & Gotchas）
/// 多个 `SparkBuffer` 视图（父缓冲及其任意深度的切片）可能共享同一块
/// `SharedBytes`。`Buffer` 的所有权模型（§5：同一缓冲同一时刻只有一个逻辑
/// 所有者，并发修改未定义）是这里安全性的前提，而不是由类型系统机械强制——
/// 这与教师仓库 `PooledBuffer::chunk_mut` 对 `UninitSlice` 做裸指针转换、并为
/// `PooledBuffer` 手写 `unsafe impl Send/Sync` 时给出的理由属于同一类取舍。
struct SharedBytes(Arc<UnsafeCell<Vec<u8>>>);

unsafe impl Send for SharedBytes {}
unsafe impl Sync for SharedBytes {}

impl Clone for SharedBytes {
    fn clone(&self) -> Self {
        SharedBytes(self.0.clone())
    }
}

impl SharedBytes {
    fn new(capacity: usize) -> Self {
        SharedBytes(Arc::new(UnsafeCell::new(alloc::vec![0u8; capacity])))
    }

    fn from_vec(data: Vec<u8>) -> Self {
        SharedBytes(Arc::new(UnsafeCell::new(data)))
    }

    fn len(&self) -> usize {
        // SAFETY: shared read of the length; no outstanding `&mut` is created
        // except inside `with_mut`, which the one-owner contract above rules
        // out overlapping with this call.
        unsafe { (*self.0.get()).len() }
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: see struct docs.
        unsafe { &*self.0.get() }
    }

    /// # Safety
    /// Caller must not hold any other live borrow (shared or exclusive) of
    /// overlapping bytes for the duration of the returned reference.
    unsafe fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { &mut *self.0.get() }
    }
}

/// The storage backing a `SparkBuffer`, one case per flavor in spec §3.1.
enum Core {
    Flat(SharedBytes),
    Fragmented(Vec<SparkBuffer>),
    Transformed {
        origin: Box<SparkBuffer>,
        transform: Arc<dyn Fn(usize, u8) -> u8 + Send + Sync>,
    },
}

impl Core {
    fn get_raw(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        match self {
            Core::Flat(s) => {
                let total = s.len();
                if index + dst.len() > total {
                    return Err(BufferError::OutOfRange {
                        value: index + dst.len(),
                        min: 0,
                        max: total,
                    });
                }
                dst.copy_from_slice(&s.as_slice()[index..index + dst.len()]);
                Ok(())
            }
            Core::Fragmented(parts) => {
                let mut cursor = index;
                let mut written = 0usize;
                for part in parts {
                    if written == dst.len() {
                        break;
                    }
                    let part_len = part.capacity;
                    if cursor >= part_len {
                        cursor -= part_len;
                        continue;
                    }
                    let available = part_len - cursor;
                    let take = available.min(dst.len() - written);
                    part.core
                        .get_raw(part.base + cursor, &mut dst[written..written + take])?;
                    written += take;
                    cursor = 0;
                }
                if written != dst.len() {
                    return Err(BufferError::OutOfRange {
                        value: index + dst.len(),
                        min: 0,
                        max: self.len(),
                    });
                }
                Ok(())
            }
            Core::Transformed { origin, transform } => {
                let mut raw = alloc::vec![0u8; dst.len()];
                origin.core.get_raw(origin.base + index, &mut raw)?;
                for (i, byte) in raw.into_iter().enumerate() {
                    dst[i] = transform(index + i, byte);
                }
                Ok(())
            }
        }
    }

    fn put_raw(&self, index: usize, src: &[u8]) -> Result<()> {
        match self {
            Core::Flat(s) => {
                let total = s.len();
                if index + src.len() > total {
                    return Err(BufferError::OutOfRange {
                        value: index + src.len(),
                        min: 0,
                        max: total,
                    });
                }
                // SAFETY: see `SharedBytes` docs; only reachable through a
                // writable, non-Fragmented/Transformed `SparkBuffer`.
                let dst = unsafe { s.as_mut_slice() };
                dst[index..index + src.len()].copy_from_slice(src);
                Ok(())
            }
            Core::Fragmented(_) | Core::Transformed { .. } => {
                Err(BufferError::Unsupported { capability: "write" })
            }
        }
    }

    fn chunk(&self, index: usize, limit: usize) -> &[u8] {
        match self {
            Core::Flat(s) => {
                let end = limit.min(s.len());
                if index >= end {
                    &[]
                } else {
                    &s.as_slice()[index..end]
                }
            }
            Core::Fragmented(parts) => {
                let mut cursor = index;
                let requested = limit.saturating_sub(index);
                for part in parts {
                    let part_len = part.capacity;
                    if cursor < part_len {
                        let local_start = part.base + cursor;
                        let local_len = requested.min(part_len - cursor);
                        return part.core.chunk(local_start, local_start + local_len);
                    }
                    cursor -= part_len;
                }
                &[]
            }
            Core::Transformed { .. } => &[],
        }
    }

    fn chunk_mut(&self, index: usize, limit: usize) -> Result<&mut [u8]> {
        match self {
            Core::Flat(s) => {
                let end = limit.min(s.len());
                // SAFETY: see `SharedBytes` docs.
                let slice = unsafe { s.as_mut_slice() };
                if index >= end {
                    Ok(&mut [])
                } else {
                    Ok(&mut slice[index..end])
                }
            }
            Core::Fragmented(_) | Core::Transformed { .. } => {
                Err(BufferError::Unsupported { capability: "chunk_mut" })
            }
        }
    }

    fn raw_base_ptr(&self) -> Option<*const u8> {
        match self {
            Core::Flat(s) => Some(s.as_slice().as_ptr()),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        match self {
            Core::Flat(s) => s.len(),
            Core::Fragmented(parts) => parts.iter().map(|p| p.capacity).sum(),
            Core::Transformed { origin, .. } => origin.capacity,
        }
    }
}

/// The single concrete `Buffer` implementation, dispatching internally on
/// `Core` for the five storage flavors named in spec §3.1.
pub struct SparkBuffer {
    core: Arc<Core>,
    base: usize,
    capacity: usize,
    position: usize,
    limit: usize,
    order: ByteOrder,
    read_only: bool,
    flavor: BufferFlavor,
}

// SAFETY: `Core` is `Send + Sync` (via `SharedBytes`'s manual impls, plus
// `Fragmented`/`Transformed` composing only `Send + Sync` children), and
// every other field is a plain `Copy` value.
unsafe impl Send for SparkBuffer {}
unsafe impl Sync for SparkBuffer {}

impl SparkBuffer {
    /// A managed, zero-filled read-write buffer of the given capacity.
    pub fn allocate(capacity: usize) -> Self {
        SparkBuffer {
            core: Arc::new(Core::Flat(SharedBytes::new(capacity))),
            base: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: ByteOrder::default(),
            read_only: false,
            flavor: BufferFlavor::Managed,
        }
    }

    /// A managed read-only buffer wrapping an existing byte vector, ready
    /// for reading (`position = 0`, `limit = capacity`).
    pub fn wrap(data: Vec<u8>) -> Self {
        let capacity = data.len();
        SparkBuffer {
            core: Arc::new(Core::Flat(SharedBytes::from_vec(data))),
            base: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: ByteOrder::default(),
            read_only: true,
            flavor: BufferFlavor::Managed,
        }
    }

    /// A buffer tagged `Native`, i.e. one whose storage promises a stable
    /// base address suitable for bulk-ops/FFI consumers (spec §3.1, §4.2).
    pub fn allocate_native(capacity: usize) -> Self {
        let mut buf = Self::allocate(capacity);
        buf.flavor = BufferFlavor::Native;
        buf
    }

    /// Concatenates `parts` into one logical buffer (spec "Fragmented
    /// buffer"). Always read-only: the spec gives no write contract for a
    /// concatenation view.
    pub fn fragment(parts: Vec<SparkBuffer>) -> Self {
        let capacity: usize = parts.iter().map(|p| p.capacity).sum();
        SparkBuffer {
            core: Arc::new(Core::Fragmented(parts)),
            base: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: ByteOrder::default(),
            read_only: true,
            flavor: BufferFlavor::Fragmented,
        }
    }

    /// A read-only view over `origin` that applies `transform(absolute_index,
    /// byte) -> byte` lazily on every read (spec "Transformed view").
    pub fn transform(
        origin: SparkBuffer,
        transform: Arc<dyn Fn(usize, u8) -> u8 + Send + Sync>,
    ) -> Self {
        let capacity = origin.capacity;
        SparkBuffer {
            core: Arc::new(Core::Transformed {
                origin: Box::new(origin),
                transform,
            }),
            base: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: ByteOrder::default(),
            read_only: true,
            flavor: BufferFlavor::Transformed,
        }
    }
}

/// The abstract buffer contract. Object-safe so pools, streams, and the
/// `Allocator` interface (spec §6.1) can hold heterogeneous concrete buffers
/// behind `Box<dyn Buffer>`.
pub trait Buffer: Send + Sync {
    fn capacity(&self) -> usize;
    fn position(&self) -> usize;
    fn limit(&self) -> usize;
    fn order(&self) -> ByteOrder;
    fn set_order(&mut self, order: ByteOrder);
    fn is_read_only(&self) -> bool;
    fn flavor(&self) -> BufferFlavor;

    fn set_position(&mut self, pos: usize) -> Result<()>;
    fn set_limit(&mut self, limit: usize) -> Result<()>;

    /// Relative cursor advance; used both after a read (consuming already
    /// valid bytes) and after a write (committing freshly written bytes).
    fn advance(&mut self, n: usize) -> Result<()>;

    /// The longest contiguous readable run starting at the current
    /// position, up to `remaining()` bytes. May be shorter than `remaining`
    /// for `Fragmented` storage; always empty for `Transformed`.
    fn chunk(&self) -> &[u8];

    /// The longest contiguous writable run starting at the current
    /// position, up to `remaining()` bytes. Errors with `Unsupported` for
    /// flavors that cannot expose raw writable memory.
    fn chunk_mut(&mut self) -> Result<&mut [u8]>;

    /// Absolute bulk read; bounds-checked against `limit()`, not `capacity()`
    /// (mirrors java.nio.ByteBuffer's absolute-accessor contract).
    fn get_exact(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        if index.checked_add(dst.len()).is_none_or(|end| end > self.limit()) {
            return Err(BufferError::OutOfRange {
                value: index,
                min: 0,
                max: self.limit(),
            });
        }
        self.get_raw(index, dst)
    }

    /// Absolute bulk write; bounds-checked against `limit()`.
    fn put_exact(&mut self, index: usize, src: &[u8]) -> Result<()> {
        if self.is_read_only() {
            return Err(BufferError::Unsupported { capability: "write" });
        }
        if index.checked_add(src.len()).is_none_or(|end| end > self.limit()) {
            return Err(BufferError::OutOfRange {
                value: index,
                min: 0,
                max: self.limit(),
            });
        }
        self.put_raw(index, src)
    }

    /// Unchecked indexed read, bounds-checked only against `capacity()` by
    /// the concrete storage. Exposed for components (e.g. the pool) that
    /// need to bypass the `limit()` gate; most callers want `get_exact`.
    fn get_raw(&self, index: usize, dst: &mut [u8]) -> Result<()>;

    /// Unchecked indexed write, see `get_raw`.
    fn put_raw(&mut self, index: usize, src: &[u8]) -> Result<()>;

    /// New view over `[position, limit)` sharing storage; independent
    /// cursors; inherits byte order and read-only-ness (spec "Slicing
    /// semantics").
    fn slice(&self) -> Result<SparkBuffer>;

    /// `Some` only for `Native`-flavored storage (spec "Native ... exposes a
    /// raw base address").
    fn raw_base_ptr(&self) -> Option<*const u8>;

    fn remaining(&self) -> usize {
        self.limit() - self.position()
    }

    fn has_remaining(&self) -> bool {
        self.position() < self.limit()
    }

    fn reset_for_read(&mut self) -> Result<()> {
        let p = self.position();
        self.set_limit(p)?;
        self.set_position(0)
    }

    fn reset_for_write(&mut self) -> Result<()> {
        self.set_position(0)?;
        let c = self.capacity();
        self.set_limit(c)
    }

    // -- relative scalar reads --------------------------------------------

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_into(&mut b)?;
        Ok(b[0])
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_into(&mut b)?;
        Ok(self.order().read_u16(&b))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_into(&mut b)?;
        Ok(self.order().read_u32(&b))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_into(&mut b)?;
        Ok(self.order().read_u64(&b))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    fn read_f32(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        self.read_into(&mut b)?;
        Ok(self.order().read_f32(&b))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.read_into(&mut b)?;
        Ok(self.order().read_f64(&b))
    }

    /// Reads an `n`-byte (1..=8) signed integer in the buffer's order and
    /// sign-extends to 64 bits (spec "readNumberWithByteSize").
    fn read_int_n(&mut self, n: u8) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_into(&mut b[..n as usize])?;
        Ok(self.order().read_int_n(&b[..n as usize], n))
    }

    // -- relative scalar writes --------------------------------------------

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_from(&[v])
    }

    fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        let mut b = [0u8; 2];
        self.order().write_u16(&mut b, v);
        self.write_from(&b)
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_u16(v as u16)
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        let mut b = [0u8; 4];
        self.order().write_u32(&mut b, v);
        self.write_from(&b)
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_u32(v as u32)
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        let mut b = [0u8; 8];
        self.order().write_u64(&mut b, v);
        self.write_from(&b)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        let mut b = [0u8; 4];
        self.order().write_f32(&mut b, v);
        self.write_from(&b)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        let mut b = [0u8; 8];
        self.order().write_f64(&mut b, v);
        self.write_from(&b)
    }

    fn write_int_n(&mut self, n: u8, v: i64) -> Result<()> {
        let mut b = [0u8; 8];
        self.order().write_int_n(&mut b[..n as usize], n, v);
        self.write_from(&b[..n as usize])
    }

    // -- absolute scalar accessors ------------------------------------------

    fn get_u8(&self, index: usize) -> Result<u8> {
        let mut b = [0u8; 1];
        self.get_exact(index, &mut b)?;
        Ok(b[0])
    }

    fn get_i8(&self, index: usize) -> Result<i8> {
        Ok(self.get_u8(index)? as i8)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        let mut b = [0u8; 2];
        self.get_exact(index, &mut b)?;
        Ok(self.order().read_u16(&b))
    }

    fn get_i16(&self, index: usize) -> Result<i16> {
        Ok(self.get_u16(index)? as i16)
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        let mut b = [0u8; 4];
        self.get_exact(index, &mut b)?;
        Ok(self.order().read_u32(&b))
    }

    fn get_i32(&self, index: usize) -> Result<i32> {
        Ok(self.get_u32(index)? as i32)
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        let mut b = [0u8; 8];
        self.get_exact(index, &mut b)?;
        Ok(self.order().read_u64(&b))
    }

    fn get_i64(&self, index: usize) -> Result<i64> {
        Ok(self.get_u64(index)? as i64)
    }

    fn get_f32(&self, index: usize) -> Result<f32> {
        let mut b = [0u8; 4];
        self.get_exact(index, &mut b)?;
        Ok(self.order().read_f32(&b))
    }

    fn get_f64(&self, index: usize) -> Result<f64> {
        let mut b = [0u8; 8];
        self.get_exact(index, &mut b)?;
        Ok(self.order().read_f64(&b))
    }

    fn put_u8(&mut self, index: usize, v: u8) -> Result<()> {
        self.put_exact(index, &[v])
    }

    fn put_i8(&mut self, index: usize, v: i8) -> Result<()> {
        self.put_u8(index, v as u8)
    }

    fn put_u16(&mut self, index: usize, v: u16) -> Result<()> {
        let mut b = [0u8; 2];
        self.order().write_u16(&mut b, v);
        self.put_exact(index, &b)
    }

    fn put_i16(&mut self, index: usize, v: i16) -> Result<()> {
        self.put_u16(index, v as u16)
    }

    fn put_u32(&mut self, index: usize, v: u32) -> Result<()> {
        let mut b = [0u8; 4];
        self.order().write_u32(&mut b, v);
        self.put_exact(index, &b)
    }

    fn put_i32(&mut self, index: usize, v: i32) -> Result<()> {
        self.put_u32(index, v as u32)
    }

    fn put_u64(&mut self, index: usize, v: u64) -> Result<()> {
        let mut b = [0u8; 8];
        self.order().write_u64(&mut b, v);
        self.put_exact(index, &b)
    }

    fn put_i64(&mut self, index: usize, v: i64) -> Result<()> {
        self.put_u64(index, v as u64)
    }

    fn put_f32(&mut self, index: usize, v: f32) -> Result<()> {
        let mut b = [0u8; 4];
        self.order().write_f32(&mut b, v);
        self.put_exact(index, &b)
    }

    fn put_f64(&mut self, index: usize, v: f64) -> Result<()> {
        let mut b = [0u8; 8];
        self.order().write_f64(&mut b, v);
        self.put_exact(index, &b)
    }

    // -- bulk relative helpers ------------------------------------------------

    /// Shared implementation backing every relative scalar read: bounds
    /// checks `dst.len()` against `remaining()`, copies, then advances.
    fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.remaining() {
            return Err(BufferError::Underflow {
                requested: dst.len(),
                available: self.remaining(),
            });
        }
        let pos = self.position();
        self.get_raw(pos, dst)?;
        self.advance(dst.len())
    }

    /// Shared implementation backing every relative scalar write.
    fn write_from(&mut self, src: &[u8]) -> Result<()> {
        if self.is_read_only() {
            return Err(BufferError::Unsupported { capability: "write" });
        }
        if src.len() > self.remaining() {
            return Err(BufferError::Overflow {
                requested: src.len(),
                limit: self.remaining(),
            });
        }
        let pos = self.position();
        self.put_raw(pos, src)?;
        self.advance(src.len())
    }

    /// Zero-copy slice of the next `n` bytes; advances position by `n`
    /// (spec `readBytes`).
    fn read_bytes(&mut self, n: usize) -> Result<SparkBuffer> {
        if n > self.remaining() {
            return Err(BufferError::Underflow {
                requested: n,
                available: self.remaining(),
            });
        }
        let pos = self.position();
        let old_limit = self.limit();
        self.set_limit(pos + n)?;
        let out = self.slice();
        self.set_limit(old_limit)?;
        self.advance(n)?;
        out
    }

    /// Copy of the next `n` bytes into a fresh `Vec` (spec `readByteArray`).
    fn read_byte_array(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = alloc::vec![0u8; n];
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Bulk copy of `src` into `self`, advancing position (spec
    /// `writeBytes`).
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.write_from(src)
    }

    /// Bulk copy of `other`'s remaining bytes into `self`; advances both
    /// cursors (spec `write(other)`).
    fn write_buffer(&mut self, other: &mut dyn Buffer) -> Result<()> {
        let n = other.remaining();
        let bytes = other.read_byte_array(n)?;
        self.write_from(&bytes)
    }

    /// REPORT-mode UTF-8 decode of the next `n` bytes (spec `readString`;
    /// only UTF-8 is in scope, per Non-goals).
    fn read_string(&mut self, n: usize) -> Result<String> {
        let offset = self.position();
        let bytes = self.read_byte_array(n)?;
        String::from_utf8(bytes).map_err(|_| BufferError::MalformedText { offset })
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_from(s.as_bytes())
    }

    /// Reads up to the next `\n` or `\r\n`; the separator is consumed but
    /// not included in the result (spec `readLine`).
    fn read_line(&mut self) -> Result<String> {
        let chunk_start = self.position();
        let available = self.remaining();
        let mut probe = alloc::vec![0u8; available];
        self.get_exact(chunk_start, &mut probe)?;
        let newline = bulk::index_of_byte(&probe, b'\n');
        let (content_len, consumed) = if newline < 0 {
            (available, available)
        } else {
            let nl = newline as usize;
            if nl > 0 && probe[nl - 1] == b'\r' {
                (nl - 1, nl + 1)
            } else {
                (nl, nl + 1)
            }
        };
        let content = self.read_byte_array(content_len)?;
        self.advance(consumed - content_len)?;
        String::from_utf8(content).map_err(|_| BufferError::MalformedText { offset: chunk_start })
    }

    /// First index (relative to `position`) of `needle`, or `-1` (spec
    /// `indexOf(needle: byte)`).
    fn index_of(&self, needle: u8) -> Result<isize> {
        let remaining = self.remaining();
        let mut probe = alloc::vec![0u8; remaining];
        self.get_exact(self.position(), &mut probe)?;
        Ok(bulk::index_of_byte(&probe, needle))
    }

    /// First index (relative to `position`) where the `n`-byte integer
    /// `value` occurs, encoded in this buffer's current byte order, or `-1`
    /// (spec `indexOf(needle: multi-byte integer)`).
    fn index_of_int(&self, n: u8, value: i64) -> Result<isize> {
        let mut encoded = [0u8; 8];
        self.order().write_int_n(&mut encoded[..n as usize], n, value);
        self.index_of_buffer(&encoded[..n as usize])
    }

    /// First index (relative to `position`) where `needle` occurs, or `-1`;
    /// naive scan with an 8-byte fast compare for candidates (spec
    /// `indexOf(needle: buffer)` / `indexOf(needle: string)`).
    fn index_of_buffer(&self, needle: &[u8]) -> Result<isize> {
        let remaining = self.remaining();
        let mut probe = alloc::vec![0u8; remaining];
        self.get_exact(self.position(), &mut probe)?;
        Ok(bulk::index_of_pattern(&probe, needle))
    }

    /// Repeats `pattern` across the writable chunk at `position`, advancing
    /// `position` by the number of bytes written; a short tail that does not
    /// fit a full `pattern` is left untouched (spec `fill`).
    fn fill(&mut self, pattern: &[u8]) -> Result<usize> {
        let chunk = self.chunk_mut()?;
        let written = bulk::fill(chunk, pattern) * pattern.len();
        self.advance(written)?;
        Ok(written)
    }

    /// XORs the writable chunk at `position` in place with a cyclic 4-byte
    /// `mask`, advancing `position` by the number of bytes masked. The
    /// cycle phase is derived from `position` so consecutive calls continue
    /// the mask correctly even when a prior call stopped mid-cycle (spec
    /// `xorMask`).
    fn xor_mask(&mut self, mask: u32) -> Result<()> {
        let phase = (self.position() % 4) as u8;
        let chunk = self.chunk_mut()?;
        let n = chunk.len();
        bulk::xor_mask_with_phase(chunk, mask, phase);
        self.advance(n)
    }

    /// Copies `src` into the writable chunk at `position` while XOR-masking
    /// it with a cyclic 4-byte `mask`, advancing `position` by `src.len()`
    /// (spec `xorMaskCopy`).
    fn xor_mask_copy(&mut self, src: &[u8], mask: u32) -> Result<()> {
        let phase = (self.position() % 4) as u8;
        let chunk = self.chunk_mut()?;
        if src.len() > chunk.len() {
            return Err(BufferError::Overflow {
                requested: src.len(),
                limit: self.remaining(),
            });
        }
        bulk::xor_mask_copy_with_phase(chunk, src, mask, phase);
        self.advance(src.len())
    }
}

impl Buffer for SparkBuffer {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn position(&self) -> usize {
        self.position
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn flavor(&self) -> BufferFlavor {
        self.flavor
    }

    fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.limit {
            return Err(BufferError::OutOfRange {
                value: pos,
                min: 0,
                max: self.limit,
            });
        }
        self.position = pos;
        Ok(())
    }

    fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit < self.position || limit > self.capacity {
            return Err(BufferError::OutOfRange {
                value: limit,
                min: self.position,
                max: self.capacity,
            });
        }
        self.limit = limit;
        Ok(())
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        self.set_position(self.position + n)
    }

    fn chunk(&self) -> &[u8] {
        self.core.chunk(self.base + self.position, self.base + self.limit)
    }

    fn chunk_mut(&mut self) -> Result<&mut [u8]> {
        if self.read_only {
            return Err(BufferError::Unsupported { capability: "write" });
        }
        self.core.chunk_mut(self.base + self.position, self.base + self.limit)
    }

    fn get_raw(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.core.get_raw(self.base + index, dst)
    }

    fn put_raw(&mut self, index: usize, src: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(BufferError::Unsupported { capability: "write" });
        }
        self.core.put_raw(self.base + index, src)
    }

    fn slice(&self) -> Result<SparkBuffer> {
        // A slice of a `Native` buffer keeps the `Native` flavor so that
        // `raw_base_ptr` continues to resolve through repeated slicing
        // (spec §4.1: "a slice must preserve that access... including
        // across repeated slicing").
        let flavor = if self.flavor == BufferFlavor::Native {
            BufferFlavor::Native
        } else {
            BufferFlavor::Slice
        };
        Ok(SparkBuffer {
            core: self.core.clone(),
            base: self.base + self.position,
            capacity: self.limit - self.position,
            position: 0,
            limit: self.limit - self.position,
            order: self.order,
            read_only: self.read_only,
            flavor,
        })
    }

    fn raw_base_ptr(&self) -> Option<*const u8> {
        if self.flavor != BufferFlavor::Native {
            return None;
        }
        // SAFETY: only offsets by `base`, which is always `<= storage len`.
        self.core
            .raw_base_ptr()
            .map(|p| unsafe { p.add(self.base) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_invariants_hold_through_basic_operations() {
        let mut buf = SparkBuffer::allocate(16);
        assert_eq!(buf.remaining(), 16);
        buf.write_u32(0x1122_3344).expect("write should fit");
        assert_eq!(buf.position(), 4);
        buf.reset_for_read().expect("reset_for_read should succeed");
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 4);
        let v = buf.read_u32().expect("read should succeed");
        assert_eq!(v, 0x1122_3344);
    }

    #[test]
    fn little_endian_round_trip_e1() {
        let mut buf = SparkBuffer::allocate(8);
        buf.set_order(ByteOrder::Little);
        buf.write_u64(0x0102_0304_0506_0708).expect("write");
        buf.reset_for_read().expect("reset");
        let bytes = buf.read_byte_array(8).expect("read bytes");
        assert_eq!(bytes, vec![8, 7, 6, 5, 4, 3, 2, 1]);
        buf.set_position(0).expect("rewind");
        let v = buf.read_u64().expect("read back");
        assert_eq!(v, 0x0102_0304_0506_0708);
    }

    #[test]
    fn slice_is_independent_of_parent_cursor_mutation_e7() {
        let mut buf = SparkBuffer::allocate(8);
        for i in 0..8u8 {
            buf.write_u8(i).unwrap();
        }
        buf.reset_for_read().unwrap();
        let _ = buf.read_u8().unwrap();
        let mut slice = buf.slice().unwrap();
        buf.set_position(0).unwrap();
        assert_eq!(slice.position(), 0);
        assert_eq!(slice.read_u8().unwrap(), 1);
    }

    #[test]
    fn absolute_accessors_do_not_move_position() {
        let mut buf = SparkBuffer::allocate(4);
        buf.write_u32(0xAABB_CCDD).unwrap();
        buf.reset_for_read().unwrap();
        let v = buf.get_u32(0).unwrap();
        assert_eq!(v, 0xAABB_CCDD);
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn read_only_wrap_rejects_writes() {
        let mut buf = SparkBuffer::wrap(vec![1, 2, 3]);
        assert!(buf.write_u8(9).is_err());
        assert_eq!(buf.read_u8().unwrap(), 1);
    }

    #[test]
    fn fragmented_buffer_crosses_chunk_boundary_e3() {
        let a = SparkBuffer::wrap(vec![0x11]);
        let b = SparkBuffer::wrap(vec![0x22, 0x33, 0x44]);
        let mut frag = SparkBuffer::fragment(vec![a, b]);
        frag.set_order(ByteOrder::Big);
        let v = frag.read_u32().unwrap();
        assert_eq!(v, 0x1122_3344);
        assert_eq!(frag.remaining(), 0);
    }

    #[test]
    fn transformed_view_applies_function_lazily() {
        let origin = SparkBuffer::wrap(vec![1, 2, 3]);
        let view = SparkBuffer::transform(origin, Arc::new(|_, b| b.wrapping_add(1)));
        let mut view = view;
        assert_eq!(view.read_u8().unwrap(), 2);
        assert_eq!(view.read_u8().unwrap(), 3);
        assert_eq!(view.read_u8().unwrap(), 4);
    }

    #[test]
    fn xor_mask_involution_on_buffer_e8() {
        let mut buf = SparkBuffer::allocate(1024);
        let written = buf.fill(&[0xAB]).unwrap();
        assert_eq!(written, 1024);
        assert_eq!(buf.position(), 1024);

        let mut original = alloc::vec![0u8; 1024];
        buf.get_exact(0, &mut original).unwrap();

        let mask = 0xDEAD_BEEFu32;
        buf.set_position(0).unwrap();
        buf.xor_mask(mask).unwrap();
        assert_eq!(buf.position(), 1024);
        let mut masked = alloc::vec![0u8; 1024];
        buf.get_exact(0, &mut masked).unwrap();
        assert_ne!(masked, original);

        buf.set_position(0).unwrap();
        buf.xor_mask(mask).unwrap();
        let mut restored = alloc::vec![0u8; 1024];
        buf.get_exact(0, &mut restored).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn fill_leaves_short_tail_untouched() {
        let mut buf = SparkBuffer::allocate(10);
        let written = buf.fill(&[1, 2, 3]).unwrap();
        assert_eq!(written, 9);
        assert_eq!(buf.position(), 9);
        let mut tail = [0xFFu8];
        buf.get_exact(9, &mut tail).unwrap();
        assert_eq!(tail[0], 0);
    }

    #[test]
    fn xor_mask_copy_writes_masked_bytes_and_advances() {
        let mut buf = SparkBuffer::allocate(8);
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        buf.xor_mask_copy(&src, 0xDEAD_BEEF).unwrap();
        assert_eq!(buf.position(), 8);

        let mut written = [0u8; 8];
        buf.get_exact(0, &mut written).unwrap();
        assert_ne!(written, src);

        let mut decoded = written;
        bulk::xor_mask_with_phase(&mut decoded, 0xDEAD_BEEF, 0);
        assert_eq!(decoded, src);
    }

    #[test]
    fn read_line_consumes_separator() {
        let mut buf = SparkBuffer::wrap(b"hello\r\nworld".to_vec());
        assert_eq!(buf.read_line().unwrap(), "hello");
        assert_eq!(buf.read_line().unwrap(), "world");
    }

    #[test]
    fn slicing_a_native_buffer_preserves_raw_base_ptr() {
        let mut parent = SparkBuffer::allocate_native(16);
        let parent_base = parent.raw_base_ptr().unwrap();
        parent.set_position(4).unwrap();
        let mut child = parent.slice().unwrap();
        assert_eq!(child.flavor(), BufferFlavor::Native);
        let child_base = child.raw_base_ptr().unwrap();
        assert_eq!(child_base, unsafe { parent_base.add(4) });

        child.set_position(2).unwrap();
        let grandchild = child.slice().unwrap();
        assert_eq!(grandchild.flavor(), BufferFlavor::Native);
        assert_eq!(grandchild.raw_base_ptr().unwrap(), unsafe {
            parent_base.add(6)
        });
    }

    #[test]
    fn slicing_a_managed_buffer_still_hides_raw_base_ptr() {
        let mut parent = SparkBuffer::allocate(16);
        parent.set_position(4).unwrap();
        let child = parent.slice().unwrap();
        assert_eq!(child.flavor(), BufferFlavor::Slice);
        assert!(child.raw_base_ptr().is_none());
    }

    #[test]
    fn index_of_is_relative_to_position() {
        let mut buf = SparkBuffer::wrap(b"abcabc".to_vec());
        buf.set_position(1).unwrap();
        assert_eq!(buf.index_of(b'c').unwrap(), 1);
        assert_eq!(buf.index_of(b'z').unwrap(), -1);
    }

    #[test]
    fn index_of_int_matches_integer_encoded_in_buffer_order() {
        let mut buf = SparkBuffer::wrap(vec![0u8, 0x11, 0x22, 0x33, 0x44, 0]);
        buf.set_order(ByteOrder::Big);
        assert_eq!(buf.index_of_int(4, 0x1122_3344).unwrap(), 1);
        buf.set_order(ByteOrder::Little);
        assert_eq!(buf.index_of_int(4, 0x1122_3344).unwrap(), -1);
    }

    #[test]
    fn index_of_buffer_finds_needle_pattern() {
        let buf = SparkBuffer::wrap(b"the quick brown fox".to_vec());
        assert_eq!(buf.index_of_buffer(b"brown").unwrap(), 10);
        assert_eq!(buf.index_of_buffer(b"slow").unwrap(), -1);
    }
}
