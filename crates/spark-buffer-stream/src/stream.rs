//! `StreamProcessor`: 一个按追加顺序聚合分片的字节流（spec §3.3, §4.4）。
//!
//! # 设计背景（Why）
//! 网络/编解码栈收到的字节天然是分片到达的——每个分片是一次 I/O 读取或一次
//! 池化缓冲租用。`StreamProcessor` 把这些分片攒成一条逻辑字节序列，允许
//! 调用方在不关心分片边界的前提下 peek/读取/切片，同时保留零拷贝的快路径：
//! 当请求的字节全部落在队首分片内时，直接返回那段存储的切片而不拷贝。
//!
//! # 逻辑解析（How）
//! 每个分片就是一个 `Box<dyn Buffer>`；分片自身的 `position`/`limit`
//! 游标承担了 spec 里"首个未读偏移/末尾偏移"的角色，消费分片只是推进它的
//! `position`。分片耗尽（`remaining() == 0`）后从队首弹出并丢弃——如果它是
//! `PooledBuffer`，丢弃即触发其 `Drop` 把底层缓冲还给池，天然满足"块被完全
//! 消费时释放回源池"的契约，不需要在这里手写释放逻辑。

use std::collections::VecDeque;

use spark_buffer::buf::Buffer;
use spark_buffer::error::{BufferError, Result};
use spark_buffer::order::ByteOrder;
use spark_buffer::SparkBuffer;

/// What `read_buffer`/fast-path slicing hands back: either a zero-copy slice
/// of a chunk's shared storage, or (slow path) a freshly allocated copy.
/// Both cases are plain `SparkBuffer`s — `Buffer::read_bytes`'s default
/// implementation already produces a slice sharing storage with its parent,
/// so the fast and slow paths need no separate wrapper type.
pub type ReadBuffer = SparkBuffer;

/// A fragmented gather stream: an ordered queue of chunks, consumed in
/// append order (spec §3.3, §4.4).
pub struct StreamProcessor {
    chunks: VecDeque<Box<dyn Buffer>>,
    order: ByteOrder,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamProcessor {
    /// A stream with no chunks, assembling multi-byte peeks/reads in
    /// big-endian order (the network-order default; override with
    /// `with_order`/`set_order`).
    pub fn new() -> Self {
        StreamProcessor {
            chunks: VecDeque::new(),
            order: ByteOrder::Big,
        }
    }

    pub fn with_order(order: ByteOrder) -> Self {
        StreamProcessor {
            chunks: VecDeque::new(),
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Enqueues a chunk. An empty buffer (no remaining bytes) is accepted
    /// and silently dropped, matching spec `append`.
    pub fn append(&mut self, buffer: Box<dyn Buffer>) {
        if buffer.has_remaining() {
            self.chunks.push_back(buffer);
        }
    }

    /// Sum of remaining bytes across queued chunks.
    pub fn available(&self) -> usize {
        self.chunks.iter().map(|c| c.remaining()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    fn require(&self, off: usize, n: usize) -> Result<()> {
        let available = self.available();
        if off + n > available {
            return Err(BufferError::Underflow {
                requested: off + n,
                available,
            });
        }
        Ok(())
    }

    /// Copies `n` bytes starting at logical offset `off` without consuming
    /// them, walking chunk boundaries transparently.
    fn peek_bytes(&self, off: usize, n: usize) -> Result<Vec<u8>> {
        self.require(off, n)?;
        let mut out = Vec::with_capacity(n);
        let mut skip = off;
        let mut need = n;
        for chunk in &self.chunks {
            if need == 0 {
                break;
            }
            let rem = chunk.remaining();
            if skip >= rem {
                skip -= rem;
                continue;
            }
            let start = chunk.position() + skip;
            let take = (rem - skip).min(need);
            let mut part = vec![0u8; take];
            chunk.get_exact(start, &mut part)?;
            out.extend_from_slice(&part);
            need -= take;
            skip = 0;
        }
        Ok(out)
    }

    pub fn peek_byte(&self, off: usize) -> Result<u8> {
        Ok(self.peek_bytes(off, 1)?[0])
    }

    pub fn peek_short(&self, off: usize) -> Result<i16> {
        let bytes = self.peek_bytes(off, 2)?;
        Ok(self.order.read_u16(&bytes) as i16)
    }

    pub fn peek_int(&self, off: usize) -> Result<i32> {
        let bytes = self.peek_bytes(off, 4)?;
        Ok(self.order.read_u32(&bytes) as i32)
    }

    pub fn peek_long(&self, off: usize) -> Result<i64> {
        let bytes = self.peek_bytes(off, 8)?;
        Ok(self.order.read_u64(&bytes) as i64)
    }

    /// True iff `available >= prefix.len()` and the next bytes equal
    /// `prefix` (spec `peekMatches`).
    pub fn peek_matches(&self, prefix: &[u8]) -> bool {
        if self.available() < prefix.len() {
            return false;
        }
        match self.peek_bytes(0, prefix.len()) {
            Ok(bytes) => bytes == prefix,
            Err(_) => false,
        }
    }

    /// Advances the logical position by `n`, dropping fully consumed chunks
    /// (which releases pool-tracked chunks back to their origin pool via
    /// `Drop`).
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.require(0, n)?;
        let mut remaining = n;
        while remaining > 0 {
            let front = self.chunks.front_mut().expect("checked by require()");
            let take = front.remaining().min(remaining);
            front.advance(take)?;
            remaining -= take;
            if front.remaining() == 0 {
                self.chunks.pop_front();
            }
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        let v = self.peek_byte(0)? as i8;
        self.skip(1)?;
        Ok(v)
    }

    /// Returns the next byte widened to a non-negative integer (spec
    /// `readUnsignedByte`), as opposed to `read_byte`'s sign-extending form.
    pub fn read_unsigned_byte(&mut self) -> Result<u8> {
        let v = self.peek_byte(0)?;
        self.skip(1)?;
        Ok(v)
    }

    pub fn read_short(&mut self) -> Result<i16> {
        let v = self.peek_short(0)?;
        self.skip(2)?;
        Ok(v)
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let v = self.peek_int(0)?;
        self.skip(4)?;
        Ok(v)
    }

    pub fn read_long(&mut self) -> Result<i64> {
        let v = self.peek_long(0)?;
        self.skip(8)?;
        Ok(v)
    }

    /// Returns `n` bytes as a `ReadBuffer`. Fast path: if the head chunk has
    /// `>= n` bytes remaining, returns a zero-copy slice and advances the
    /// chunk. Slow path: allocates a fresh buffer and copies across chunks
    /// (spec `readBuffer`, zero-copy law).
    pub fn read_buffer(&mut self, n: usize) -> Result<ReadBuffer> {
        self.require(0, n)?;
        let head_has_enough = self
            .chunks
            .front()
            .map(|c| c.remaining() >= n)
            .unwrap_or(n == 0);
        if head_has_enough {
            if n == 0 {
                return Ok(SparkBuffer::allocate(0));
            }
            let front = self.chunks.front_mut().expect("checked above");
            let out = front.read_bytes(n)?;
            if front.remaining() == 0 {
                self.chunks.pop_front();
            }
            return Ok(out);
        }
        let mut out = SparkBuffer::allocate(n);
        let mut remaining = n;
        while remaining > 0 {
            let front = self.chunks.front_mut().expect("checked by require()");
            let take = front.remaining().min(remaining);
            let bytes = front.read_byte_array(take)?;
            out.write_bytes(&bytes)?;
            remaining -= take;
            if front.remaining() == 0 {
                self.chunks.pop_front();
            }
        }
        out.reset_for_read()?;
        Ok(out)
    }

    /// Drops all queued chunks; pool-wrapped chunks release on `Drop`.
    pub fn release(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(bytes: &[u8]) -> Box<dyn Buffer> {
        Box::new(SparkBuffer::wrap(bytes.to_vec()))
    }

    #[test]
    fn cross_chunk_int_read_e3() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[0x11]));
        stream.append(wrap(&[0x22, 0x33, 0x44]));
        assert_eq!(stream.read_int().unwrap(), 0x1122_3344u32 as i32);
        assert_eq!(stream.available(), 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1, 2, 3, 4]));
        let peeked = stream.peek_int(0).unwrap();
        assert_eq!(stream.available(), 4);
        let read = stream.read_int().unwrap();
        assert_eq!(peeked, read);
    }

    #[test]
    fn read_buffer_zero_copy_when_within_head_chunk_law_14() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1, 2, 3, 4, 5]));
        let mut slice = stream.read_buffer(3).unwrap();
        assert_eq!(slice.remaining(), 3);
        assert_eq!(slice.read_byte_array(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(stream.available(), 2);
    }

    #[test]
    fn read_buffer_copies_across_chunks_when_spanning() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1, 2]));
        stream.append(wrap(&[3, 4, 5]));
        let mut merged = stream.read_buffer(4).unwrap();
        assert_eq!(merged.read_byte_array(4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(stream.available(), 1);
    }

    #[test]
    fn skip_drops_fully_consumed_chunks() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1, 2]));
        stream.append(wrap(&[3, 4]));
        stream.skip(3).unwrap();
        assert_eq!(stream.available(), 1);
        assert_eq!(stream.read_byte().unwrap(), 4);
    }

    #[test]
    fn peek_matches_checks_prefix() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(b"HELLO"));
        assert!(stream.peek_matches(b"HEL"));
        assert!(!stream.peek_matches(b"XYZ"));
        assert!(!stream.peek_matches(b"HELLO!!"));
    }

    #[test]
    fn underflow_when_demand_exceeds_available() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1]));
        assert!(stream.read_int().is_err());
    }

    #[test]
    fn empty_append_is_dropped() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[]));
        assert_eq!(stream.available(), 0);
    }

    #[test]
    fn release_drops_all_chunks() {
        let mut stream = StreamProcessor::new();
        stream.append(wrap(&[1, 2, 3]));
        stream.release();
        assert_eq!(stream.available(), 0);
    }
}
