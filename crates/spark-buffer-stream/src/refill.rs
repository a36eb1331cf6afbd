//! Auto-refilling suspending stream (spec §4.5): wraps a `StreamProcessor`
//! with a demand-driven refill callback used by async transports.
//!
//! # 设计背景（Why）
//! `StreamProcessor` 本身是同步、不做 I/O 的；真正从网络/文件拉取更多字节
//! 是一个天然异步的操作。spec §5 把"补给回调"列为核心里唯一的挂起点。把它
//! 建模成一个 `async_trait` 对象（而不是裸 `Fn` 闭包）延续教师仓库在涉及
//! 取消语义的地方——`spark-core::runtime`、`spark-transport-udp` 的异步
//! accept 循环——统一用 trait 对象承载挂起点的做法，而不是到处传 `Fn` 约束。
//!
//! # 取消语义（How）
//! `ensure` 在每次 `refill().await` 之间都不持有对 `StreamProcessor` 内部
//! 状态的部分写入——`append` 只在 `refill` 调用成功返回后才会发生
//! （由具体 `RefillSource` 实现决定何时调用 `sink.append`）。因此在某次
//! `refill().await` 处被取消（Future 被 drop）时，流要么观察到上一次成功
//! 补给后的完整状态，要么完全没有新分片进来——不存在半写入的分片，满足
//! spec "Cancellation ... leaves the stream in a consistent state"。

use spark_buffer::error::{BufferError, Result};

use crate::stream::StreamProcessor;

/// What a `refill` call reports back to `AutoRefillStream::ensure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// At least one chunk was appended (possibly zero bytes' worth, though
    /// callers should avoid spinning on a no-op refill).
    Appended,
    /// The upstream source is exhausted; no further refills will ever
    /// produce more bytes.
    EndOfStream,
}

/// A demand-driven supplier of more chunks for an `AutoRefillStream`.
/// Implementors call `sink.append(...)` zero or more times per invocation.
#[async_trait::async_trait]
pub trait RefillSource: Send {
    async fn refill(&mut self, sink: &mut StreamProcessor) -> Result<RefillOutcome>;
}

/// Wraps a `StreamProcessor` with a `RefillSource`: before any read/peek
/// that needs `K` bytes, refills repeatedly until `available >= K` or the
/// source signals end-of-stream, at which point the operation fails
/// `EndOfStream` (spec §4.5).
pub struct AutoRefillStream<R: RefillSource> {
    stream: StreamProcessor,
    source: R,
    ended: bool,
}

impl<R: RefillSource> AutoRefillStream<R> {
    pub fn new(source: R) -> Self {
        AutoRefillStream {
            stream: StreamProcessor::new(),
            source,
            ended: false,
        }
    }

    pub fn stream(&self) -> &StreamProcessor {
        &self.stream
    }

    /// Ensures at least `demand` bytes are available, invoking `refill`
    /// repeatedly as needed. Fails `EndOfStream` if the source is
    /// exhausted before the demand is met.
    pub async fn ensure(&mut self, demand: usize) -> Result<()> {
        while self.stream.available() < demand {
            if self.ended {
                return Err(BufferError::EndOfStream { demand });
            }
            match self.source.refill(&mut self.stream).await? {
                RefillOutcome::Appended => {}
                RefillOutcome::EndOfStream => {
                    #[cfg(feature = "tracing-logs")]
                    tracing::debug!("spark-buffer-stream: refill source reported end of stream");
                    self.ended = true;
                }
            }
        }
        Ok(())
    }

    pub async fn peek_byte(&mut self, off: usize) -> Result<u8> {
        self.ensure(off + 1).await?;
        self.stream.peek_byte(off)
    }

    pub async fn peek_int(&mut self, off: usize) -> Result<i32> {
        self.ensure(off + 4).await?;
        self.stream.peek_int(off)
    }

    pub async fn read_byte(&mut self) -> Result<i8> {
        self.ensure(1).await?;
        self.stream.read_byte()
    }

    pub async fn read_short(&mut self) -> Result<i16> {
        self.ensure(2).await?;
        self.stream.read_short()
    }

    pub async fn read_int(&mut self) -> Result<i32> {
        self.ensure(4).await?;
        self.stream.read_int()
    }

    pub async fn read_long(&mut self) -> Result<i64> {
        self.ensure(8).await?;
        self.stream.read_long()
    }

    pub async fn read_buffer(&mut self, n: usize) -> Result<crate::stream::ReadBuffer> {
        self.ensure(n).await?;
        self.stream.read_buffer(n)
    }

    pub fn release(&mut self) {
        self.stream.release();
    }
}
