#![cfg_attr(not(feature = "std"), no_std)]

//! `spark-buffer` 提供跨平台零拷贝字节缓冲、批量操作内核与缓冲池。
//!
//! # 模块定位（Why）
//! - `buf` 落地 java.nio.ByteBuffer 式的 position/limit/capacity 游标模型，
//!   覆盖堆内存、原生地址、分片拼接、惰性变换四种存储风格。
//! - `bulk` 提供缓冲比较、搜索、填充、XOR 掩码等 SWAR 热点操作，供 `buf` 的
//!   默认方法与上层编解码器共用。
//! - `pool` 把 `buf::SparkBuffer` 池化，提供单线程与并发两种变体，
//!   统一实现一个 `BufferPool` trait。
//! - `error`/`order` 是贯穿以上三者的公共基础设施：统一错误类型与运行期可
//!   切换的字节序标记。
//!
//! # 命名约定（Consistency）
//! 延续 java.nio.ByteBuffer 的术语（`position`/`limit`/`capacity`/`slice`/
//! `flip` 对应的 `reset_for_read`），避免引入额外前缀，确保调用端体验一致。

extern crate alloc;

pub mod buf;
pub mod bulk;
pub mod error;
pub mod order;
pub mod pool;

pub use buf::{Buffer, BufferFlavor, SparkBuffer};
pub use error::{BufferError, Result};
pub use order::ByteOrder;
pub use pool::{
    AllocationZone, BufferPool, BufferRecycler, LocalBufferPool, PoolOptions, PoolStats,
    PooledBuffer, ReclaimedBuffer, SlabBufferPool, with_buffer, with_pool,
};
